//! Completion phase: auto-complete and build retention.
//!
//! Both run after the pull request exists, so neither can fail the run.

use log::info;

use crate::error::Result;
use crate::services::{Build, BuildService, PullRequest, VersionControl};

pub fn set_auto_complete(vcs: &dyn VersionControl, pull_request: &PullRequest) -> Result<()> {
    vcs.set_auto_complete(pull_request)?;
    info!("Auto-complete set on pull request {}", pull_request.id);
    Ok(())
}

pub fn retain_build(builds: &dyn BuildService, build: &Build) -> Result<()> {
    builds.retain_build(build)?;
    info!("Build {} retained indefinitely", build.build_number);
    Ok(())
}
