//! Phases of an insertion run.
//!
//! ## Overview
//!
//! An insertion moves strictly forward through [`InsertionState`]:
//!
//! 1. `AuthVerified` - credentials accepted by the version-control service
//! 2. `ArtifactsResolved` - build and artifact layout located ([`resolve`])
//! 3. `PackagesReconciled` / `ComponentsReconciled` - Config Store updated
//!    ([`reconciliation`])
//! 4. `ChangesetBuilt` - dirty files turned into [`GitChange`]s
//! 5. `Pushed` - insertion branch created or moved ([`push`])
//! 6. `CherryPicked` - optional, extra commits replayed ([`cherry_pick`])
//! 7. `PrReady` - pull request created or updated ([`pull_request`])
//! 8. `ValidationQueued` / `AutoCompleteSet` - optional ([`validation`],
//!    [`completion`])
//!
//! An empty changeset with no cherry-picks ends the run at `NoOp`. Any fatal
//! error ends it at `Failure`; nothing already pushed is rolled back.
//!
//! [`orchestrator`] sequences the phases; [`write`] applies a changeset to a
//! local working tree for `plan --apply`.

use std::fmt;

use crate::changeset::GitChange;

pub mod cherry_pick;
pub mod completion;
pub mod orchestrator;
pub mod pull_request;
pub mod push;
pub mod reconciliation;
pub mod resolve;
pub mod validation;
pub mod write;

pub use orchestrator::{plan, Insertion, PlanOutcome};

/// Where an insertion run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertionState {
    Start,
    AuthVerified,
    ArtifactsResolved,
    PackagesReconciled,
    ComponentsReconciled,
    ChangesetBuilt,
    /// Nothing to insert; terminal success.
    NoOp,
    Pushed,
    CherryPicked,
    PrReady,
    ValidationQueued,
    AutoCompleteSet,
    Success,
    Failure,
}

impl InsertionState {
    /// States reachable in one step. `Failure` is reachable from every
    /// non-terminal state and is not listed.
    fn successors(self) -> &'static [InsertionState] {
        use InsertionState::*;
        match self {
            Start => &[AuthVerified],
            AuthVerified => &[ArtifactsResolved],
            ArtifactsResolved => &[PackagesReconciled],
            PackagesReconciled => &[ComponentsReconciled],
            ComponentsReconciled => &[ChangesetBuilt],
            ChangesetBuilt => &[NoOp, Pushed],
            Pushed => &[CherryPicked, PrReady],
            CherryPicked => &[PrReady],
            PrReady => &[ValidationQueued, AutoCompleteSet, Success],
            ValidationQueued => &[AutoCompleteSet, Success],
            AutoCompleteSet => &[Success],
            NoOp | Success | Failure => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InsertionState::NoOp | InsertionState::Success | InsertionState::Failure
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, InsertionState::NoOp | InsertionState::Success)
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_advance_to(self, next: InsertionState) -> bool {
        if next == InsertionState::Failure {
            return !self.is_terminal();
        }
        self.successors().contains(&next)
    }
}

impl fmt::Display for InsertionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InsertionState::Start => "start",
            InsertionState::AuthVerified => "auth-verified",
            InsertionState::ArtifactsResolved => "artifacts-resolved",
            InsertionState::PackagesReconciled => "packages-reconciled",
            InsertionState::ComponentsReconciled => "components-reconciled",
            InsertionState::ChangesetBuilt => "changeset-built",
            InsertionState::NoOp => "no-op",
            InsertionState::Pushed => "pushed",
            InsertionState::CherryPicked => "cherry-picked",
            InsertionState::PrReady => "pr-ready",
            InsertionState::ValidationQueued => "validation-queued",
            InsertionState::AutoCompleteSet => "auto-complete-set",
            InsertionState::Success => "success",
            InsertionState::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// Report of one insertion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionOutcome {
    pub success: bool,
    /// `0` when no pull request was created or the run failed.
    pub pull_request_id: u64,
    pub final_state: InsertionState,
    pub changes: Vec<GitChange>,
    /// Phase-local failures that did not abort the run.
    pub warnings: Vec<String>,
    /// The fatal error, for failed runs.
    pub error: Option<String>,
    pub pull_request_url: Option<String>,
}

impl InsertionOutcome {
    pub fn is_noop(&self) -> bool {
        self.final_state == InsertionState::NoOp
    }
}
