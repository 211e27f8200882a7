//! Orchestrator for a complete insertion run
//!
//! Drives the phases in order, recording every state transition, and turns
//! the result into an [`InsertionOutcome`]. Fatal errors stop the run where
//! it is; failures of optional effects after the push are logged, collected
//! as warnings and skipped.
//!
//! The cancellation token is checked before each phase starts. A phase that
//! is already running is never interrupted, except that polling loops stop
//! between probes.

use log::{debug, error, info, warn};

use crate::changeset::GitChange;
use crate::config::ValidatedOptions;
use crate::error::{Error, Result};
use crate::polling::{CancellationToken, Sleeper, ThreadSleeper};
use crate::services::{BuildService, FileSource, PullRequest, VersionControl};

use super::reconciliation::{self, Reconciliation};
use super::resolve::{self, ResolvedBuild};
use super::{
    cherry_pick, completion, pull_request, push, validation, InsertionOutcome, InsertionState,
};

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Reads repository files through the version-control service.
struct ServiceFiles<'a>(&'a dyn VersionControl);

impl FileSource for ServiceFiles<'_> {
    fn read_file(&self, path: &str, commit: &str) -> Result<Option<String>> {
        self.0.read_file(path, commit)
    }
}

/// Mutable bookkeeping of one run.
struct Run {
    state: InsertionState,
    changes: Vec<GitChange>,
    warnings: Vec<String>,
    pull_request: Option<PullRequest>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: InsertionState::Start,
            changes: Vec::new(),
            warnings: Vec::new(),
            pull_request: None,
        }
    }

    fn advance(&mut self, next: InsertionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal insertion transition {} -> {}",
            self.state,
            next
        );
        debug!("Insertion state {} -> {}", self.state, next);
        self.state = next;
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Record a failed optional effect as a warning. Cancellation and
    /// rejected credentials still abort the run.
    fn skip_effect(&mut self, effect: &str, err: Error) -> Result<()> {
        match err {
            Error::Cancelled { .. } | Error::Authentication { .. } => Err(err),
            other => {
                self.warn(format!("{} skipped: {}", effect, other));
                Ok(())
            }
        }
    }
}

/// One insertion, wired to its collaborators.
pub struct Insertion<'a> {
    options: &'a ValidatedOptions,
    vcs: &'a dyn VersionControl,
    builds: Option<&'a dyn BuildService>,
    sleeper: &'a dyn Sleeper,
    cancel: CancellationToken,
}

impl<'a> Insertion<'a> {
    /// `builds` may be `None` when the options use local artifacts.
    pub fn new(
        options: &'a ValidatedOptions,
        vcs: &'a dyn VersionControl,
        builds: Option<&'a dyn BuildService>,
    ) -> Self {
        Self {
            options,
            vcs,
            builds,
            sleeper: &THREAD_SLEEPER,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the insertion to completion. Never panics on service failures;
    /// everything is reported through the outcome.
    pub fn run(&self) -> InsertionOutcome {
        let mut run = Run::new();
        let error = match self.execute(&mut run) {
            Ok(()) => None,
            Err(e) => {
                error!("Insertion failed in state {}: {}", run.state, e);
                run.advance(InsertionState::Failure);
                Some(e.to_string())
            }
        };

        let success = run.state.is_success();
        let pull_request_id = match (&run.pull_request, success) {
            (Some(pr), true) => pr.id,
            _ => 0,
        };
        InsertionOutcome {
            success,
            pull_request_id,
            final_state: run.state,
            changes: run.changes,
            warnings: run.warnings,
            error,
            pull_request_url: run.pull_request.and_then(|pr| pr.url),
        }
    }

    fn execute(&self, run: &mut Run) -> Result<()> {
        let options = self.options;

        self.cancel.check("authentication")?;
        self.vcs.verify_access()?;
        run.advance(InsertionState::AuthVerified);

        self.cancel.check("artifact resolution")?;
        let resolved = resolve::execute(&options.source, &options.component_branch, self.builds)?;
        run.advance(InsertionState::ArtifactsResolved);

        self.cancel.check("package reconciliation")?;
        let target = push::prepare(self.vcs, options, &resolved.build_number)?;
        let mut store =
            reconciliation::load_store(options, &ServiceFiles(self.vcs), &target.base_commit)?;
        let mut result = Reconciliation::default();
        reconciliation::packages(options, &resolved.layout, &mut store, &mut result)?;
        run.advance(InsertionState::PackagesReconciled);

        self.cancel.check("component reconciliation")?;
        reconciliation::components(options, &resolved.layout, &mut store, &mut result)?;
        run.advance(InsertionState::ComponentsReconciled);

        reconciliation::changeset(&store, &mut result)?;
        drop(store);
        run.changes = result.changes.clone();
        run.advance(InsertionState::ChangesetBuilt);

        let cherry_picks = &options.publish.cherry_pick;
        if result.changes.is_empty() && cherry_picks.is_empty() {
            info!("Target already matches build {}; nothing to insert", resolved.build_number);
            run.advance(InsertionState::NoOp);
            return Ok(());
        }

        self.cancel.check("push")?;
        let title = options.pull_request_title(&resolved.build_number);
        let head = push::execute(self.vcs, &target, &result.changes, &title)?;
        run.advance(InsertionState::Pushed);

        if !cherry_picks.is_empty() {
            self.cancel.check("cherry-pick")?;
            match cherry_pick::execute(
                self.vcs,
                &target.branch,
                &head,
                cherry_picks,
                &options.cherry_pick_polling,
                self.sleeper,
                &self.cancel,
            ) {
                Ok(_) => run.advance(InsertionState::CherryPicked),
                Err(e) if !e.is_fatal() => {
                    run.warn(format!("Cherry-pick failed, {} left unchanged: {}", target.branch, e))
                }
                Err(e) => return Err(e),
            }
        }

        self.cancel.check("pull request")?;
        let description = pull_request::describe(options, &resolved, &result, cherry_picks);
        let pr = pull_request::execute(
            self.vcs,
            options,
            target.existing_pr.as_ref(),
            &target.branch,
            &title,
            &description,
        )?;
        run.pull_request = Some(pr.clone());
        run.advance(InsertionState::PrReady);

        if self.validate(run, &pr, &target.branch, &resolved)? {
            run.advance(InsertionState::ValidationQueued);
        }

        if options.publish.auto_complete {
            self.cancel.check("auto-complete")?;
            match completion::set_auto_complete(self.vcs, &pr) {
                Ok(()) => run.advance(InsertionState::AutoCompleteSet),
                Err(e) => run.skip_effect("Auto-complete", e)?,
            }
        }

        if options.publish.retain_build {
            match (self.builds, &resolved.build) {
                (Some(builds), Some(build)) => {
                    if let Err(e) = completion::retain_build(builds, build) {
                        run.skip_effect("Build retention", e)?;
                    }
                }
                _ => debug!("Local artifacts; no build to retain"),
            }
        }

        run.advance(InsertionState::Success);
        Ok(())
    }

    /// Queue the validation build and requeue policies. Returns whether
    /// anything was queued.
    fn validate(
        &self,
        run: &mut Run,
        pr: &PullRequest,
        branch: &str,
        resolved: &ResolvedBuild,
    ) -> Result<bool> {
        let publish = &self.options.publish;
        let mut queued = false;

        if let Some(definition) = &publish.validation_build_definition {
            self.cancel.check("validation build")?;
            match self.builds {
                Some(builds) => {
                    match validation::queue_build(builds, definition, branch, &resolved.layout) {
                        Ok(_) => queued = true,
                        Err(e) => run.skip_effect("Validation build", e)?,
                    }
                }
                None => run.warn(format!(
                    "Validation build '{}' not queued: no build service available",
                    definition
                )),
            }
        }

        for name in &publish.validation_policies {
            self.cancel.check("policy requeue")?;
            match validation::requeue_policy(
                self.vcs,
                pr,
                name,
                &self.options.policy_polling,
                self.sleeper,
                &self.cancel,
            ) {
                Ok(()) => queued = true,
                Err(e) => run.skip_effect(&format!("Policy '{}'", name), e)?,
            }
        }

        Ok(queued)
    }
}

/// What an insertion would change, computed without any service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    pub build_number: String,
    pub branch: String,
    pub title: String,
    pub reconciliation: Reconciliation,
}

/// Run the pipeline up to `ChangesetBuilt` against `source` at `commit`.
pub fn plan(
    options: &ValidatedOptions,
    source: &dyn FileSource,
    commit: &str,
    resolved: &ResolvedBuild,
) -> Result<PlanOutcome> {
    let reconciliation = reconciliation::execute(options, source, commit, &resolved.layout)?;
    Ok(PlanOutcome {
        build_number: resolved.build_number.clone(),
        branch: options.insertion_branch(&resolved.build_number),
        title: options.pull_request_title(&resolved.build_number),
        reconciliation,
    })
}
