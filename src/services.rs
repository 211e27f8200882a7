//! # External Service Interfaces
//!
//! The insertion engine talks to three collaborators: something that can
//! read files at a commit, a version-control service, and a build service.
//! Each is a trait so the orchestrator never depends on a concrete client:
//! the binary wires in [`crate::azdo::AzureDevOpsClient`], the `plan`
//! command uses [`crate::git::GitCheckout`], and tests use in-memory fakes.
//!
//! Only the calls the engine makes are modelled here; the data types carry
//! the fields the engine reads and nothing more.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::changeset::GitChange;
use crate::error::Result;

/// Object id git uses for "no previous value" in ref updates.
pub const NULL_OBJECT_ID: &str = "0000000000000000000000000000000000000000";

/// Read-only access to repository content at a commit.
pub trait FileSource: Send + Sync {
    /// Returns `Ok(None)` when `path` does not exist at `commit`.
    fn read_file(&self, path: &str, commit: &str) -> Result<Option<String>>;
}

/// Version-control operations the orchestrator drives.
pub trait VersionControl: FileSource {
    /// Fails with [`crate::error::Error::Authentication`] when the
    /// credentials are rejected.
    fn verify_access(&self) -> Result<()>;

    /// Head commit of `branch` (short name, without `refs/heads/`).
    fn get_branch_head(&self, branch: &str) -> Result<Option<String>>;

    /// Create one commit with `changes` on top of `parent_commit` and move
    /// the branch to it.
    fn push(&self, request: &PushRequest) -> Result<PushResult>;

    /// Move a ref without creating a commit.
    fn update_ref(&self, update: &RefUpdate) -> Result<()>;

    fn get_pull_request(&self, id: u64) -> Result<PullRequest>;

    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest>;

    fn update_pull_request(&self, id: u64, draft: &PullRequestDraft) -> Result<PullRequest>;

    /// Ask the service to replay `commits` onto a branch. Completion is
    /// observed through [`VersionControl::get_cherry_pick`].
    fn request_cherry_pick(&self, request: &CherryPickRequest) -> Result<CherryPickOperation>;

    fn get_cherry_pick(&self, operation_id: u64) -> Result<CherryPickOperation>;

    fn list_policy_evaluations(&self, pull_request: &PullRequest)
        -> Result<Vec<PolicyEvaluation>>;

    fn requeue_policy_evaluation(&self, pull_request: &PullRequest, evaluation_id: &str)
        -> Result<()>;

    fn set_auto_complete(&self, pull_request: &PullRequest) -> Result<()>;
}

/// Build-service operations used to find and manage the inserted build.
pub trait BuildService: Send + Sync {
    fn find_definitions(&self, name: &str) -> Result<Vec<BuildDefinition>>;

    /// Builds matching `query`, newest first.
    fn list_builds(&self, query: &BuildQuery) -> Result<Vec<Build>>;

    /// Local or file-share path of the named artifact, `None` if the build
    /// did not publish it.
    fn locate_artifact(&self, build: &Build, artifact_name: &str) -> Result<Option<PathBuf>>;

    /// Mark `build` to be kept indefinitely.
    fn retain_build(&self, build: &Build) -> Result<()>;

    fn queue_build(&self, request: &QueueBuildRequest) -> Result<Build>;
}

/// Full ref name for a short branch name.
pub fn branch_ref(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{}", branch)
    }
}

/// Short branch name for a full ref name.
pub fn short_branch(reference: &str) -> &str {
    reference.strip_prefix("refs/heads/").unwrap_or(reference)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// Short branch name.
    pub branch: String,
    /// [`NULL_OBJECT_ID`] to create the branch.
    pub old_object_id: String,
    pub new_object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Short branch name.
    pub branch: String,
    /// Current head of `branch`, or [`NULL_OBJECT_ID`] to create it.
    pub old_object_id: String,
    pub parent_commit: String,
    pub message: String,
    pub changes: Vec<GitChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub commit_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub id: u64,
    /// Short branch name.
    pub source_branch: String,
    /// Short branch name.
    pub target_branch: String,
    pub title: String,
    pub url: Option<String>,
    /// Head of the source branch as last seen by the service.
    pub source_commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
    pub reviewers: Vec<String>,
    pub is_draft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CherryPickRequest {
    pub commits: Vec<String>,
    /// Branch the commits are replayed onto.
    pub onto_branch: String,
    /// Branch the service creates to hold the result.
    pub generated_branch: String,
}

/// Status of an asynchronous server-side git operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Abandoned,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Abandoned
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CherryPickOperation {
    pub id: u64,
    pub status: OperationStatus,
    /// Service-provided failure detail, if any.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEvaluation {
    pub evaluation_id: String,
    pub display_name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDefinition {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub id: u64,
    pub build_number: String,
    pub definition_id: u64,
    /// Short branch name.
    pub source_branch: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildQuery {
    pub definition_id: u64,
    /// Short branch name.
    pub branch: String,
    /// Only builds whose result is `succeeded`.
    pub succeeded_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBuildRequest {
    pub definition_name: String,
    /// Short branch name.
    pub source_branch: String,
    pub parameters: BTreeMap<String, String>,
}
