//! Push phase
//!
//! Decides which branch the insertion lands on and which commit it builds
//! on, then pushes the changeset there as a single commit.
//!
//! | Situation | Branch | Parent commit |
//! |---|---|---|
//! | new insertion | `{prefix}/{name}-{branch}-{build}` | target head |
//! | `existing-pr` | the PR's source branch | that branch's head |
//! | `existing-pr` + `overwrite-pr` | the PR's source branch | target head |

use log::info;

use crate::changeset::GitChange;
use crate::config::ValidatedOptions;
use crate::error::{Error, Result};
use crate::services::{PullRequest, PushRequest, RefUpdate, VersionControl, NULL_OBJECT_ID};

/// Where and on top of what the insertion is pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub branch: String,
    /// Commit the Config Store is loaded from and the push builds on.
    pub base_commit: String,
    /// Current head of `branch`, or [`NULL_OBJECT_ID`] if it does not exist.
    pub old_object_id: String,
    pub existing_pr: Option<PullRequest>,
}

fn required_head(vcs: &dyn VersionControl, branch: &str) -> Result<String> {
    vcs.get_branch_head(branch)?
        .ok_or_else(|| Error::BranchNotFound {
            branch: branch.to_string(),
        })
}

/// Work out the branch and base commit for this run.
pub fn prepare(
    vcs: &dyn VersionControl,
    options: &ValidatedOptions,
    build_number: &str,
) -> Result<PushTarget> {
    if let Some(id) = options.publish.existing_pr {
        let pr = vcs.get_pull_request(id)?;
        info!("Updating existing pull request {} on {}", pr.id, pr.source_branch);
        let head = required_head(vcs, &pr.source_branch)?;
        let base_commit = if options.publish.overwrite_pr {
            required_head(vcs, &options.target_branch)?
        } else {
            head.clone()
        };
        return Ok(PushTarget {
            branch: pr.source_branch.clone(),
            base_commit,
            old_object_id: head,
            existing_pr: Some(pr),
        });
    }

    let branch = options.insertion_branch(build_number);
    let base_commit = required_head(vcs, &options.target_branch)?;
    let old_object_id = vcs
        .get_branch_head(&branch)?
        .unwrap_or_else(|| NULL_OBJECT_ID.to_string());
    Ok(PushTarget {
        branch,
        base_commit,
        old_object_id,
        existing_pr: None,
    })
}

/// Push `changes` onto the target branch. Returns the branch's new head.
///
/// With no changes (a cherry-pick only run) the branch is just pointed at
/// the base commit.
pub fn execute(
    vcs: &dyn VersionControl,
    target: &PushTarget,
    changes: &[GitChange],
    message: &str,
) -> Result<String> {
    if changes.is_empty() {
        if target.old_object_id != target.base_commit {
            vcs.update_ref(&RefUpdate {
                branch: target.branch.clone(),
                old_object_id: target.old_object_id.clone(),
                new_object_id: target.base_commit.clone(),
            })?;
        }
        info!("Branch {} is at {}", target.branch, target.base_commit);
        return Ok(target.base_commit.clone());
    }

    let result = vcs.push(&PushRequest {
        branch: target.branch.clone(),
        old_object_id: target.old_object_id.clone(),
        parent_commit: target.base_commit.clone(),
        message: message.to_string(),
        changes: changes.to_vec(),
    })?;
    info!(
        "Pushed {} change(s) to {} as {}",
        changes.len(),
        target.branch,
        result.commit_id
    );
    Ok(result.commit_id)
}
