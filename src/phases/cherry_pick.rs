//! Cherry-pick phase
//!
//! Replays extra commits onto the insertion branch through the service's
//! asynchronous cherry-pick operation:
//!
//! `Requested -> Polling -> {Completed | Failed}`
//!
//! The service writes the result to a generated branch. Only when the
//! operation completes is the insertion branch moved to that result; a
//! failed or abandoned operation leaves the branch where the push put it.

use log::{info, warn};

use crate::error::{Error, Result};
use crate::polling::{poll_until, CancellationToken, Poll, PollPolicy, Sleeper};
use crate::services::{CherryPickRequest, OperationStatus, RefUpdate, VersionControl};

/// Branch the service writes the cherry-pick result to.
pub fn generated_branch(branch: &str) -> String {
    format!("{}-cherry-pick", branch)
}

/// Cherry-pick `commits` onto `branch` (currently at `head`) and move the
/// branch to the result.
///
/// Returns the branch's new head. A failed operation surfaces as
/// [`Error::OperationFailed`], which callers treat as phase-local.
pub fn execute(
    vcs: &dyn VersionControl,
    branch: &str,
    head: &str,
    commits: &[String],
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
) -> Result<String> {
    let generated = generated_branch(branch);
    let request = CherryPickRequest {
        commits: commits.to_vec(),
        onto_branch: branch.to_string(),
        generated_branch: generated.clone(),
    };
    let operation = vcs.request_cherry_pick(&request)?;
    info!(
        "Requested cherry-pick {} of {} commit(s) onto {}",
        operation.id,
        commits.len(),
        branch
    );
    if policy.timeout.is_none() {
        info!("Waiting for cherry-pick {} without a timeout", operation.id);
    }

    let finished = poll_until(
        &format!("cherry-pick {}", operation.id),
        policy,
        sleeper,
        cancel,
        |_| {
            let current = vcs.get_cherry_pick(operation.id)?;
            Ok(if current.status.is_terminal() {
                Poll::Ready(current)
            } else {
                Poll::Pending
            })
        },
    )?;

    if finished.status != OperationStatus::Completed {
        return Err(Error::OperationFailed {
            operation: format!("cherry-pick {}", finished.id),
            message: finished
                .detail
                .unwrap_or_else(|| format!("ended with status {:?}", finished.status)),
        });
    }

    let Some(new_head) = vcs.get_branch_head(&generated)? else {
        warn!(
            "Cherry-pick {} completed but {} does not exist",
            finished.id, generated
        );
        return Err(Error::OperationFailed {
            operation: format!("cherry-pick {}", finished.id),
            message: format!("generated branch {} is missing", generated),
        });
    };

    vcs.update_ref(&RefUpdate {
        branch: branch.to_string(),
        old_object_id: head.to_string(),
        new_object_id: new_head.clone(),
    })?;
    info!("Moved {} to cherry-pick result {}", branch, new_head);
    Ok(new_head)
}
