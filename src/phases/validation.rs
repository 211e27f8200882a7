//! Validation phase
//!
//! Two optional ways to get an insertion PR validated:
//!
//! - queue `validation-build-definition` against the insertion branch, with
//!   the build's opt-prof properties as parameters;
//! - requeue the PR policies named in `validation-policies`. A policy
//!   evaluation only appears some time after the PR is created, so each one
//!   is polled for under `policy-timeout-secs`:
//!   `Requested -> Polling -> {Found and requeued | Timeout}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ini::Ini;
use log::{debug, info};

use crate::artifacts::ArtifactLayout;
use crate::error::{Error, Result};
use crate::polling::{poll_until, CancellationToken, Poll, PollPolicy, Sleeper};
use crate::services::{Build, BuildService, PullRequest, QueueBuildRequest, VersionControl};

/// Read one opt-prof property file into `parameters`.
///
/// Keys outside any section are used as-is, sectioned keys become
/// `Section.Key`. Later files override earlier ones.
fn read_properties(path: &Path, parameters: &mut BTreeMap<String, String>) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let ini = Ini::load_from_str(&text).map_err(|e| Error::ArtifactLayout {
        path: path.to_path_buf(),
        message: format!("invalid property file: {}", e),
    })?;

    for (section, properties) in ini.iter() {
        for (key, value) in properties.iter() {
            let name = match section {
                Some(section) => format!("{}.{}", section, key),
                None => key.to_string(),
            };
            parameters.insert(name, value.to_string());
        }
    }
    Ok(())
}

/// Parameters collected from every opt-prof property file of the build.
pub fn opt_prof_parameters(layout: &ArtifactLayout) -> Result<BTreeMap<String, String>> {
    let mut parameters = BTreeMap::new();
    for file in layout.opt_prof_property_files()? {
        debug!("Reading opt-prof properties from {}", file.display());
        read_properties(&file, &mut parameters)?;
    }
    Ok(parameters)
}

/// Queue the validation build for `branch`.
pub fn queue_build(
    builds: &dyn BuildService,
    definition: &str,
    branch: &str,
    layout: &ArtifactLayout,
) -> Result<Build> {
    let parameters = opt_prof_parameters(layout)?;
    let build = builds.queue_build(&QueueBuildRequest {
        definition_name: definition.to_string(),
        source_branch: branch.to_string(),
        parameters,
    })?;
    info!(
        "Queued validation build {} of '{}' for {}",
        build.build_number, definition, branch
    );
    Ok(build)
}

/// Wait for the policy named `name` to be evaluated on `pull_request`, then
/// requeue it. Fails with [`Error::Timeout`] if it never shows up.
pub fn requeue_policy(
    vcs: &dyn VersionControl,
    pull_request: &PullRequest,
    name: &str,
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
) -> Result<()> {
    let evaluation = poll_until(
        &format!("policy '{}'", name),
        policy,
        sleeper,
        cancel,
        |_| {
            let found = vcs
                .list_policy_evaluations(pull_request)?
                .into_iter()
                .find(|e| e.display_name.eq_ignore_ascii_case(name));
            Ok(match found {
                Some(evaluation) => Poll::Ready(evaluation),
                None => Poll::Pending,
            })
        },
    )?;

    vcs.requeue_policy_evaluation(pull_request, &evaluation.evaluation_id)?;
    info!(
        "Requeued policy '{}' ({}) on pull request {}",
        evaluation.display_name, evaluation.evaluation_id, pull_request.id
    );
    Ok(())
}
