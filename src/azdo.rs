//! # Azure DevOps REST client
//!
//! Blocking client implementing [`VersionControl`] and [`BuildService`] over
//! the Azure DevOps REST API. Only the endpoints the orchestrator needs are
//! wrapped, and every call is made exactly once: retrying is left to whoever
//! reruns the insertion.
//!
//! Authentication uses a personal access token as the basic-auth password.
//! An HTTP 401, 403 or 203 (the service answers 203 with a sign-in page for
//! rejected tokens) becomes [`Error::Authentication`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::config::ServiceTarget;
use crate::error::{Error, Result};
use crate::services::{
    branch_ref, short_branch, Build, BuildDefinition, BuildQuery, BuildService,
    CherryPickOperation, CherryPickRequest, FileSource, OperationStatus, PolicyEvaluation,
    PullRequest, PullRequestDraft, PushRequest, PushResult, QueueBuildRequest, RefUpdate,
    VersionControl,
};

const API_VERSION: &str = "7.0";
const POLICY_API_VERSION: &str = "7.0-preview.1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Artifact resource type for file-share drops.
const FILE_PATH_ARTIFACT: &str = "FilePath";

/// Client bound to one project and repository.
pub struct AzureDevOpsClient {
    client: Client,
    organization: Url,
    project: String,
    repository: String,
    token: String,
    project_id: OnceLock<String>,
    user_id: OnceLock<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefResponse {
    name: String,
    object_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefUpdateResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    custom_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    commits: Vec<CommitRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitRef {
    commit_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestResponse {
    pull_request_id: u64,
    source_ref_name: String,
    target_ref_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    last_merge_source_commit: Option<CommitRef>,
}

impl From<PullRequestResponse> for PullRequest {
    fn from(pr: PullRequestResponse) -> Self {
        PullRequest {
            id: pr.pull_request_id,
            source_branch: short_branch(&pr.source_ref_name).to_string(),
            target_branch: short_branch(&pr.target_ref_name).to_string(),
            title: pr.title,
            url: pr.url,
            source_commit: pr.last_merge_source_commit.map(|c| c.commit_id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CherryPickResponse {
    cherry_pick_id: u64,
    status: String,
    #[serde(default)]
    detailed_status: Option<CherryPickDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CherryPickDetail {
    #[serde(default)]
    failure_message: Option<String>,
    #[serde(default)]
    conflict: bool,
}

impl From<CherryPickResponse> for CherryPickOperation {
    fn from(op: CherryPickResponse) -> Self {
        let detail = op.detailed_status.and_then(|d| {
            d.failure_message
                .or_else(|| d.conflict.then(|| "cherry-pick produced conflicts".to_string()))
        });
        CherryPickOperation {
            id: op.cherry_pick_id,
            status: parse_operation_status(&op.status),
            detail,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyEvaluationResponse {
    evaluation_id: String,
    #[serde(default)]
    status: String,
    configuration: PolicyConfiguration,
}

#[derive(Debug, Deserialize)]
struct PolicyConfiguration {
    #[serde(default)]
    settings: serde_json::Value,
    #[serde(rename = "type", default)]
    policy_type: Option<PolicyType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyType {
    #[serde(default)]
    display_name: Option<String>,
}

impl From<PolicyEvaluationResponse> for PolicyEvaluation {
    fn from(evaluation: PolicyEvaluationResponse) -> Self {
        let display_name = evaluation
            .configuration
            .settings
            .get("displayName")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                evaluation
                    .configuration
                    .policy_type
                    .and_then(|t| t.display_name)
            })
            .unwrap_or_default();
        PolicyEvaluation {
            evaluation_id: evaluation.evaluation_id,
            display_name,
            status: evaluation.status,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildResponse {
    id: u64,
    build_number: String,
    definition: DefinitionRef,
    #[serde(default)]
    source_branch: String,
    #[serde(rename = "_links", default)]
    links: Option<BuildLinks>,
}

#[derive(Debug, Deserialize)]
struct DefinitionRef {
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct BuildLinks {
    #[serde(default)]
    web: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

impl From<BuildResponse> for Build {
    fn from(build: BuildResponse) -> Self {
        Build {
            id: build.id,
            build_number: build.build_number,
            definition_id: build.definition.id,
            source_branch: short_branch(&build.source_branch).to_string(),
            url: build.links.and_then(|l| l.web).map(|w| w.href),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArtifactResponse {
    name: String,
    resource: ArtifactResource,
}

#[derive(Debug, Deserialize)]
struct ArtifactResource {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionData {
    authenticated_user: Identity,
}

#[derive(Debug, Deserialize)]
struct Identity {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefUpdateBody<'a> {
    name: String,
    old_object_id: &'a str,
    new_object_id: &'a str,
}

fn parse_operation_status(status: &str) -> OperationStatus {
    match status.to_ascii_lowercase().as_str() {
        "queued" => OperationStatus::Queued,
        "inprogress" => OperationStatus::InProgress,
        "completed" => OperationStatus::Completed,
        "abandoned" => OperationStatus::Abandoned,
        "failed" => OperationStatus::Failed,
        other => {
            warn!("Unknown operation status '{}', treating as failed", other);
            OperationStatus::Failed
        }
    }
}

/// Path of a file-share artifact, or `None` for any other artifact type.
fn file_share_path(artifact: &ArtifactResponse) -> Option<PathBuf> {
    if artifact.resource.resource_type != FILE_PATH_ARTIFACT {
        return None;
    }
    artifact
        .resource
        .data
        .as_deref()
        .map(|share| PathBuf::from(share).join(&artifact.name))
}

impl AzureDevOpsClient {
    pub fn new(target: &ServiceTarget, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::service("create HTTP client", target.url.as_str(), e.to_string()))?;

        let mut organization = target.url.clone();
        if !organization.path().ends_with('/') {
            let path = format!("{}/", organization.path());
            organization.set_path(&path);
        }

        Ok(Self {
            client,
            organization,
            project: target.project.clone(),
            repository: target.repository.clone(),
            token: token.into(),
            project_id: OnceLock::new(),
            user_id: OnceLock::new(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)], api_version: &str) -> Result<Url> {
        let mut url = self.organization.join(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("api-version", api_version);
        }
        Ok(url)
    }

    fn project_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        self.url(&format!("{}/_apis/{}", self.project, path), query, API_VERSION)
    }

    fn git_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let path = if path.is_empty() {
            format!("git/repositories/{}", self.repository)
        } else {
            format!("git/repositories/{}/{}", self.repository, path)
        };
        self.project_url(&path, query)
    }

    fn send(&self, operation: &str, url: &Url, request: RequestBuilder) -> Result<Response> {
        debug!("{} -> {}", operation, url);
        let response = request
            .basic_auth("", Some(&self.token))
            .send()
            .map_err(|e| Error::service(operation, url.as_str(), e.to_string()))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NON_AUTHORITATIVE_INFORMATION
        ) {
            return Err(Error::Authentication {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Service {
                operation: operation.to_string(),
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: body,
            });
        }
        Ok(response)
    }

    fn json<T: DeserializeOwned>(&self, operation: &str, url: &Url, request: RequestBuilder) -> Result<T> {
        self.send(operation, url, request)?
            .json()
            .map_err(|e| Error::service(operation, url.as_str(), format!("invalid response: {}", e)))
    }

    fn get<T: DeserializeOwned>(&self, operation: &str, url: Url) -> Result<T> {
        self.json(operation, &url, self.client.get(url.clone()))
    }

    /// GET that maps 404 to `None`.
    fn get_optional<T: DeserializeOwned>(&self, operation: &str, url: Url) -> Result<Option<T>> {
        match self.get(operation, url) {
            Ok(value) => Ok(Some(value)),
            Err(Error::Service {
                status: Some(404), ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn project_id(&self) -> Result<String> {
        if let Some(id) = self.project_id.get() {
            return Ok(id.clone());
        }
        let url = self.url(&format!("_apis/projects/{}", self.project), &[], API_VERSION)?;
        let project: Project = self.get("get project", url)?;
        Ok(self.project_id.get_or_init(|| project.id).clone())
    }

    fn user_id(&self) -> Result<String> {
        if let Some(id) = self.user_id.get() {
            return Ok(id.clone());
        }
        let url = self.url("_apis/connectionData", &[], API_VERSION)?;
        let data: ConnectionData = self.get("get connection data", url)?;
        Ok(self.user_id.get_or_init(|| data.authenticated_user.id).clone())
    }

    fn definition_id(&self, name: &str) -> Result<u64> {
        let mut definitions = self.find_definitions(name)?;
        match definitions.len() {
            1 => Ok(definitions.remove(0).id),
            0 => Err(Error::BuildResolution {
                message: format!("no build definition named '{}'", name),
                hint: None,
            }),
            n => Err(Error::BuildResolution {
                message: format!("{} build definitions are named '{}'", n, name),
                hint: Some("Use a unique definition name".to_string()),
            }),
        }
    }

    fn pull_request_draft_body(draft: &PullRequestDraft) -> serde_json::Value {
        json!({
            "sourceRefName": branch_ref(&draft.source_branch),
            "targetRefName": branch_ref(&draft.target_branch),
            "title": draft.title,
            "description": draft.description,
            "isDraft": draft.is_draft,
            "reviewers": draft
                .reviewers
                .iter()
                .map(|id| json!({ "id": id }))
                .collect::<Vec<_>>(),
        })
    }
}

impl FileSource for AzureDevOpsClient {
    fn read_file(&self, path: &str, commit: &str) -> Result<Option<String>> {
        let item_path = format!("/{}", path.trim_start_matches('/'));
        let url = self.git_url(
            "items",
            &[
                ("path", item_path.as_str()),
                ("versionDescriptor.version", commit),
                ("versionDescriptor.versionType", "commit"),
                ("includeContent", "true"),
            ],
        )?;
        let item: Option<ItemResponse> = self.get_optional("read file", url)?;
        Ok(item.map(|i| i.content.unwrap_or_default()))
    }
}

impl VersionControl for AzureDevOpsClient {
    fn verify_access(&self) -> Result<()> {
        let url = self.git_url("", &[])?;
        self.send("verify access", &url, self.client.get(url.clone()))?;
        info!("Authenticated against {}", self.organization);
        Ok(())
    }

    fn get_branch_head(&self, branch: &str) -> Result<Option<String>> {
        let filter = format!("heads/{}", branch);
        let url = self.git_url("refs", &[("filter", filter.as_str())])?;
        let refs: ListResponse<RefResponse> = self.get("get branch", url)?;
        let full = branch_ref(branch);
        Ok(refs
            .value
            .into_iter()
            .find(|r| r.name == full)
            .map(|r| r.object_id))
    }

    fn push(&self, request: &PushRequest) -> Result<PushResult> {
        let url = self.git_url("pushes", &[])?;
        let changes: Vec<_> = request
            .changes
            .iter()
            .map(|change| {
                json!({
                    "changeType": change.change_type.to_string(),
                    "item": { "path": format!("/{}", change.path) },
                    "newContent": { "content": change.new_content, "contentType": "rawtext" },
                })
            })
            .collect();
        let parents: Vec<&str> = if request.parent_commit.is_empty() {
            Vec::new()
        } else {
            vec![request.parent_commit.as_str()]
        };
        let body = json!({
            "refUpdates": [{
                "name": branch_ref(&request.branch),
                "oldObjectId": request.old_object_id,
            }],
            "commits": [{
                "comment": request.message,
                "parents": parents,
                "changes": changes,
            }],
        });

        let response: PushResponse =
            self.json("push", &url, self.client.post(url.clone()).json(&body))?;
        let commit_id = response
            .commits
            .into_iter()
            .last()
            .map(|c| c.commit_id)
            .ok_or_else(|| Error::service("push", url.as_str(), "response contained no commit"))?;
        Ok(PushResult { commit_id })
    }

    fn update_ref(&self, update: &RefUpdate) -> Result<()> {
        let url = self.git_url("refs", &[])?;
        let body = [RefUpdateBody {
            name: branch_ref(&update.branch),
            old_object_id: &update.old_object_id,
            new_object_id: &update.new_object_id,
        }];
        let results: ListResponse<RefUpdateResult> =
            self.json("update ref", &url, self.client.post(url.clone()).json(&body))?;
        match results.value.into_iter().next() {
            Some(result) if result.success => Ok(()),
            Some(result) => Err(Error::service(
                "update ref",
                url.as_str(),
                result
                    .custom_message
                    .unwrap_or_else(|| "ref update rejected".to_string()),
            )),
            None => Err(Error::service("update ref", url.as_str(), "empty response")),
        }
    }

    fn get_pull_request(&self, id: u64) -> Result<PullRequest> {
        let url = self.git_url(&format!("pullrequests/{}", id), &[])?;
        let pr: PullRequestResponse = self.get("get pull request", url)?;
        Ok(pr.into())
    }

    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest> {
        let url = self.git_url("pullrequests", &[])?;
        let body = Self::pull_request_draft_body(draft);
        let pr: PullRequestResponse =
            self.json("create pull request", &url, self.client.post(url.clone()).json(&body))?;
        Ok(pr.into())
    }

    fn update_pull_request(&self, id: u64, draft: &PullRequestDraft) -> Result<PullRequest> {
        let url = self.git_url(&format!("pullrequests/{}", id), &[])?;
        let body = json!({ "title": draft.title, "description": draft.description });
        let pr: PullRequestResponse =
            self.json("update pull request", &url, self.client.patch(url.clone()).json(&body))?;
        Ok(pr.into())
    }

    fn request_cherry_pick(&self, request: &CherryPickRequest) -> Result<CherryPickOperation> {
        let url = self.git_url("cherryPicks", &[])?;
        let body = json!({
            "source": {
                "commitList": request
                    .commits
                    .iter()
                    .map(|c| json!({ "commitId": c }))
                    .collect::<Vec<_>>(),
            },
            "ontoRefName": branch_ref(&request.onto_branch),
            "generatedRefName": branch_ref(&request.generated_branch),
        });
        let op: CherryPickResponse =
            self.json("request cherry-pick", &url, self.client.post(url.clone()).json(&body))?;
        Ok(op.into())
    }

    fn get_cherry_pick(&self, operation_id: u64) -> Result<CherryPickOperation> {
        let url = self.git_url(&format!("cherryPicks/{}", operation_id), &[])?;
        let op: CherryPickResponse = self.get("get cherry-pick", url)?;
        Ok(op.into())
    }

    fn list_policy_evaluations(&self, pull_request: &PullRequest) -> Result<Vec<PolicyEvaluation>> {
        let artifact = format!(
            "vstfs:///CodeReview/CodeReviewId/{}/{}",
            self.project_id()?,
            pull_request.id
        );
        let url = self.url(
            &format!("{}/_apis/policy/evaluations", self.project),
            &[("artifactId", artifact.as_str())],
            POLICY_API_VERSION,
        )?;
        let evaluations: ListResponse<PolicyEvaluationResponse> =
            self.get("list policy evaluations", url)?;
        Ok(evaluations.value.into_iter().map(Into::into).collect())
    }

    fn requeue_policy_evaluation(&self, _pull_request: &PullRequest, evaluation_id: &str) -> Result<()> {
        let url = self.url(
            &format!("{}/_apis/policy/evaluations/{}", self.project, evaluation_id),
            &[],
            POLICY_API_VERSION,
        )?;
        self.send("requeue policy", &url, self.client.patch(url.clone()))?;
        Ok(())
    }

    fn set_auto_complete(&self, pull_request: &PullRequest) -> Result<()> {
        let url = self.git_url(&format!("pullrequests/{}", pull_request.id), &[])?;
        let body = json!({ "autoCompleteSetBy": { "id": self.user_id()? } });
        self.send("set auto-complete", &url, self.client.patch(url.clone()).json(&body))?;
        Ok(())
    }
}

impl BuildService for AzureDevOpsClient {
    fn find_definitions(&self, name: &str) -> Result<Vec<BuildDefinition>> {
        let url = self.project_url("build/definitions", &[("name", name)])?;
        let definitions: ListResponse<DefinitionRef> = self.get("find build definitions", url)?;
        Ok(definitions
            .value
            .into_iter()
            .map(|d| BuildDefinition { id: d.id, name: d.name })
            .collect())
    }

    fn list_builds(&self, query: &BuildQuery) -> Result<Vec<Build>> {
        let definition = query.definition_id.to_string();
        let branch = branch_ref(&query.branch);
        let mut params = vec![
            ("definitions", definition.as_str()),
            ("branchName", branch.as_str()),
            ("queryOrder", "finishTimeDescending"),
        ];
        if query.succeeded_only {
            params.push(("resultFilter", "succeeded"));
            params.push(("statusFilter", "completed"));
        }
        let url = self.project_url("build/builds", &params)?;
        let builds: ListResponse<BuildResponse> = self.get("list builds", url)?;
        Ok(builds.value.into_iter().map(Into::into).collect())
    }

    fn locate_artifact(&self, build: &Build, artifact_name: &str) -> Result<Option<PathBuf>> {
        let url = self.project_url(
            &format!("build/builds/{}/artifacts", build.id),
            &[("artifactName", artifact_name)],
        )?;
        let Some(artifact) = self.get_optional::<ArtifactResponse>("get artifact", url)? else {
            return Ok(None);
        };
        let path = file_share_path(&artifact);
        if path.is_none() {
            warn!(
                "Artifact {} of build {} is a '{}' artifact; only file-share artifacts are supported",
                artifact.name, build.build_number, artifact.resource.resource_type
            );
        }
        Ok(path)
    }

    fn retain_build(&self, build: &Build) -> Result<()> {
        let url = self.project_url(&format!("build/builds/{}", build.id), &[])?;
        let body = json!({ "keepForever": true });
        self.send("retain build", &url, self.client.patch(url.clone()).json(&body))?;
        Ok(())
    }

    fn queue_build(&self, request: &QueueBuildRequest) -> Result<Build> {
        let definition_id = self.definition_id(&request.definition_name)?;
        let url = self.project_url("build/builds", &[])?;
        let parameters: &BTreeMap<String, String> = &request.parameters;
        let body = json!({
            "definition": { "id": definition_id },
            "sourceBranch": branch_ref(&request.source_branch),
            "parameters": serde_json::to_string(parameters)?,
        });
        let build: BuildResponse =
            self.json("queue build", &url, self.client.post(url.clone()).json(&body))?;
        Ok(build.into())
    }
}
