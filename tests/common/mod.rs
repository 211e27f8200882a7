//! Shared test utilities for integration and E2E tests.
//!
//! Provides an in-memory fake of the version-control and build services,
//! a sleeper that only records, and fixtures for artifact directories and
//! options files.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let artifacts = ArtifactsFixture::new().with_package("Foo.1.1.0.nupkg");
//!     let service = FakeService::new().with_file(DEFAULT_CONFIG_PATH, &pins(&[("Foo", "1.0.0")]));
//!     // ...
//! }
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use assert_fs::prelude::*;

use insertion_tool::config::{self, ValidatedOptions};
use insertion_tool::error::{Error, Result};
use insertion_tool::filesystem::MemoryFS;
use insertion_tool::polling::Sleeper;
use insertion_tool::services::{
    Build, BuildDefinition, BuildQuery, BuildService, CherryPickOperation, CherryPickRequest,
    FileSource, OperationStatus, PolicyEvaluation, PullRequest, PullRequestDraft, PushRequest,
    PushResult, QueueBuildRequest, RefUpdate, VersionControl,
};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{
        manifest, options, options_yaml, pins, ArtifactsFixture, FakeService, RecordingSleeper,
        BASE_COMMIT, DEFAULT_CONFIG_PATH,
    };
}

/// Head of the target branch in every fake repository.
pub const BASE_COMMIT: &str = "base-commit";

pub const DEFAULT_CONFIG_PATH: &str = ".corext/Configs/default.config";

/// A `<packages>` pin file declaring `packages` in order.
pub fn pins(packages: &[(&str, &str)]) -> String {
    let mut text = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<packages>\n");
    for (id, version) in packages {
        text.push_str(&format!(
            "  <package id=\"{}\" version=\"{}\" />\n",
            id, version
        ));
    }
    text.push_str("</packages>\n");
    text
}

/// A `.vsman` manifest naming `name` with one payload per URL.
pub fn manifest(name: &str, build_version: &str, urls: &[&str]) -> String {
    let payloads: Vec<_> = urls
        .iter()
        .map(|url| serde_json::json!({ "url": url }))
        .collect();
    serde_json::json!({
        "info": { "manifestName": name, "buildVersion": build_version },
        "packages": [{ "payloads": payloads }]
    })
    .to_string()
}

/// Options YAML for an insertion of local artifacts at `artifacts_dir`.
pub fn options_yaml(artifacts_dir: &Path, extra: &str) -> String {
    format!(
        "insertion-name: Roslyn\n\
         component-name: Roslyn\n\
         component-branch: main\n\
         target-branch: main\n\
         artifacts-dir: {}\n\
         build-number: \"20240101.1\"\n\
         {}",
        artifacts_dir.display(),
        extra
    )
}

pub fn options(artifacts_dir: &Path, extra: &str) -> ValidatedOptions {
    let options = config::parse(&options_yaml(artifacts_dir, extra)).unwrap();
    match options.validate() {
        Ok(validated) => validated,
        Err(issues) => panic!("invalid test options: {:?}", issues),
    }
}

/// A temporary arcade-layout artifacts directory.
pub struct ArtifactsFixture {
    temp_dir: assert_fs::TempDir,
}

impl ArtifactsFixture {
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        temp_dir.child("VSSetup/DevDivPackages").create_dir_all().unwrap();
        temp_dir.child("VSSetup/Insertion").create_dir_all().unwrap();
        Self { temp_dir }
    }

    pub fn with_package(self, file_name: &str) -> Self {
        self.temp_dir
            .child(format!("VSSetup/DevDivPackages/{}", file_name))
            .touch()
            .unwrap();
        self
    }

    pub fn with_manifest(self, file_name: &str, content: &str) -> Self {
        self.temp_dir
            .child(format!("VSSetup/Insertion/{}", file_name))
            .write_str(content)
            .unwrap();
        self
    }

    pub fn with_opt_prof(self, file_name: &str, content: &str) -> Self {
        self.temp_dir
            .child(format!("VSSetup/OptProf/{}", file_name))
            .write_str(content)
            .unwrap();
        self
    }

    /// Directory to use as `artifacts-dir`.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn vssetup(&self) -> PathBuf {
        self.temp_dir.path().join("VSSetup")
    }
}

impl Default for ArtifactsFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeper that records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// Everything the fake service knows and every call it received.
#[derive(Default)]
pub struct FakeState {
    pub files: MemoryFS,
    pub reject_credentials: bool,
    pub branches: HashMap<String, String>,
    pub pull_requests: HashMap<u64, PullRequest>,
    pub next_id: u64,

    pub pushes: Vec<PushRequest>,
    pub ref_updates: Vec<RefUpdate>,
    pub created: Vec<PullRequestDraft>,
    pub updated: Vec<(u64, PullRequestDraft)>,

    pub cherry_pick_requests: Vec<CherryPickRequest>,
    /// Statuses returned by successive cherry-pick polls; the last one
    /// repeats once the queue is drained.
    pub cherry_pick_statuses: VecDeque<OperationStatus>,
    pub cherry_pick_polls: usize,

    pub policy_evaluations: Vec<PolicyEvaluation>,
    pub policy_polls: usize,
    pub requeued: Vec<String>,

    pub fail_auto_complete: bool,
    pub auto_completed: Vec<u64>,

    pub definitions: Vec<BuildDefinition>,
    pub builds: Vec<Build>,
    pub artifacts: HashMap<(u64, String), PathBuf>,
    pub queued: Vec<QueueBuildRequest>,
    pub retained: Vec<u64>,
}

/// In-memory version-control and build service.
pub struct FakeService {
    state: Mutex<FakeState>,
}

impl FakeService {
    /// A repository whose `main` branch is at [`BASE_COMMIT`].
    pub fn new() -> Self {
        let mut state = FakeState {
            next_id: 1,
            ..FakeState::default()
        };
        state
            .branches
            .insert("main".to_string(), BASE_COMMIT.to_string());
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.state().files.add_file_string(path, content).unwrap();
        self
    }

    pub fn with_branch(self, branch: &str, head: &str) -> Self {
        self.state()
            .branches
            .insert(branch.to_string(), head.to_string());
        self
    }

    pub fn with_pull_request(self, pr: PullRequest) -> Self {
        self.state().pull_requests.insert(pr.id, pr);
        self
    }

    pub fn with_cherry_pick_statuses(self, statuses: &[OperationStatus]) -> Self {
        self.state().cherry_pick_statuses = statuses.iter().copied().collect();
        self
    }

    pub fn with_policy(self, display_name: &str) -> Self {
        let mut state = self.state();
        let id = state.policy_evaluations.len() + 1;
        state.policy_evaluations.push(PolicyEvaluation {
            evaluation_id: format!("evaluation-{}", id),
            display_name: display_name.to_string(),
            status: "queued".to_string(),
        });
        drop(state);
        self
    }

    pub fn rejecting_credentials(self) -> Self {
        self.state().reject_credentials = true;
        self
    }

    pub fn failing_auto_complete(self) -> Self {
        self.state().fail_auto_complete = true;
        self
    }

    /// Register a build definition with one succeeded build whose
    /// `artifact` lives at `path`.
    pub fn with_build(self, definition: &str, build_number: &str, artifact: &str, path: &Path) -> Self {
        let mut state = self.state();
        let definition_id = state.definitions.len() as u64 + 100;
        state.definitions.push(BuildDefinition {
            id: definition_id,
            name: definition.to_string(),
        });
        let build_id = state.builds.len() as u64 + 1000;
        state.builds.push(Build {
            id: build_id,
            build_number: build_number.to_string(),
            definition_id,
            source_branch: "main".to_string(),
            url: None,
        });
        state
            .artifacts
            .insert((build_id, artifact.to_string()), path.to_path_buf());
        drop(state);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn next_id(state: &mut FakeState) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }
}

impl Default for FakeService {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSource for FakeService {
    fn read_file(&self, path: &str, commit: &str) -> Result<Option<String>> {
        self.state().files.read_file(path, commit)
    }
}

impl VersionControl for FakeService {
    fn verify_access(&self) -> Result<()> {
        if self.state().reject_credentials {
            return Err(Error::Authentication {
                url: "https://fake.test".to_string(),
                message: "HTTP 401".to_string(),
            });
        }
        Ok(())
    }

    fn get_branch_head(&self, branch: &str) -> Result<Option<String>> {
        Ok(self.state().branches.get(branch).cloned())
    }

    fn push(&self, request: &PushRequest) -> Result<PushResult> {
        let mut state = self.state();
        let commit_id = format!("pushed-{}", state.pushes.len() + 1);
        state.pushes.push(request.clone());
        state
            .branches
            .insert(request.branch.clone(), commit_id.clone());
        Ok(PushResult { commit_id })
    }

    fn update_ref(&self, update: &RefUpdate) -> Result<()> {
        let mut state = self.state();
        state.ref_updates.push(update.clone());
        state
            .branches
            .insert(update.branch.clone(), update.new_object_id.clone());
        Ok(())
    }

    fn get_pull_request(&self, id: u64) -> Result<PullRequest> {
        self.state()
            .pull_requests
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Service {
                operation: "get pull request".to_string(),
                url: "https://fake.test".to_string(),
                status: Some(404),
                message: format!("pull request {} not found", id),
            })
    }

    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest> {
        let mut state = self.state();
        let id = Self::next_id(&mut state);
        let pr = PullRequest {
            id,
            source_branch: draft.source_branch.clone(),
            target_branch: draft.target_branch.clone(),
            title: draft.title.clone(),
            url: Some(format!("https://fake.test/pullrequest/{}", id)),
            source_commit: state.branches.get(&draft.source_branch).cloned(),
        };
        state.created.push(draft.clone());
        state.pull_requests.insert(id, pr.clone());
        Ok(pr)
    }

    fn update_pull_request(&self, id: u64, draft: &PullRequestDraft) -> Result<PullRequest> {
        let mut state = self.state();
        state.updated.push((id, draft.clone()));
        let pr = state.pull_requests.get_mut(&id).ok_or_else(|| Error::Service {
            operation: "update pull request".to_string(),
            url: "https://fake.test".to_string(),
            status: Some(404),
            message: format!("pull request {} not found", id),
        })?;
        pr.title = draft.title.clone();
        Ok(pr.clone())
    }

    fn request_cherry_pick(&self, request: &CherryPickRequest) -> Result<CherryPickOperation> {
        let mut state = self.state();
        state.cherry_pick_requests.push(request.clone());
        state
            .branches
            .insert(request.generated_branch.clone(), "cherry-picked".to_string());
        let id = Self::next_id(&mut state);
        Ok(CherryPickOperation {
            id,
            status: OperationStatus::Queued,
            detail: None,
        })
    }

    fn get_cherry_pick(&self, operation_id: u64) -> Result<CherryPickOperation> {
        let mut state = self.state();
        state.cherry_pick_polls += 1;
        let status = if state.cherry_pick_statuses.len() > 1 {
            state.cherry_pick_statuses.pop_front()
        } else {
            state.cherry_pick_statuses.front().copied()
        }
        .unwrap_or(OperationStatus::Completed);
        let detail = (status == OperationStatus::Failed)
            .then(|| "conflict in src/Compilers/Core/Version.cs".to_string());
        Ok(CherryPickOperation {
            id: operation_id,
            status,
            detail,
        })
    }

    fn list_policy_evaluations(&self, _pull_request: &PullRequest) -> Result<Vec<PolicyEvaluation>> {
        let mut state = self.state();
        state.policy_polls += 1;
        Ok(state.policy_evaluations.clone())
    }

    fn requeue_policy_evaluation(&self, _pull_request: &PullRequest, evaluation_id: &str) -> Result<()> {
        self.state().requeued.push(evaluation_id.to_string());
        Ok(())
    }

    fn set_auto_complete(&self, pull_request: &PullRequest) -> Result<()> {
        let mut state = self.state();
        if state.fail_auto_complete {
            return Err(Error::Service {
                operation: "set auto-complete".to_string(),
                url: "https://fake.test".to_string(),
                status: Some(500),
                message: "internal error".to_string(),
            });
        }
        state.auto_completed.push(pull_request.id);
        Ok(())
    }
}

impl BuildService for FakeService {
    fn find_definitions(&self, name: &str) -> Result<Vec<BuildDefinition>> {
        Ok(self
            .state()
            .definitions
            .iter()
            .filter(|d| d.name == name)
            .cloned()
            .collect())
    }

    fn list_builds(&self, query: &BuildQuery) -> Result<Vec<Build>> {
        Ok(self
            .state()
            .builds
            .iter()
            .filter(|b| b.definition_id == query.definition_id && b.source_branch == query.branch)
            .cloned()
            .collect())
    }

    fn locate_artifact(&self, build: &Build, artifact_name: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .state()
            .artifacts
            .get(&(build.id, artifact_name.to_string()))
            .cloned())
    }

    fn retain_build(&self, build: &Build) -> Result<()> {
        self.state().retained.push(build.id);
        Ok(())
    }

    fn queue_build(&self, request: &QueueBuildRequest) -> Result<Build> {
        let mut state = self.state();
        state.queued.push(request.clone());
        let id = Self::next_id(&mut state);
        Ok(Build {
            id,
            build_number: format!("validation-{}", id),
            definition_id: 0,
            source_branch: request.source_branch.clone(),
            url: None,
        })
    }
}
