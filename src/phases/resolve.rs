//! Artifact resolution phase
//!
//! Finds the build to insert and the directory holding its artifacts. With
//! a local `artifacts-dir` the build service is never consulted.

use std::path::Path;

use log::{debug, info};

use crate::artifacts::ArtifactLayout;
use crate::config::BuildSource;
use crate::error::{Error, Result};
use crate::services::{Build, BuildQuery, BuildService};
use crate::version::BuildVersion;

/// The build being inserted and where its artifacts are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBuild {
    /// `None` for local artifacts.
    pub build: Option<Build>,
    pub build_number: String,
    pub layout: ArtifactLayout,
}

/// Resolve `source` into a build and artifact layout.
///
/// `branch` selects the latest succeeded build when no build number is set.
pub fn execute(
    source: &BuildSource,
    branch: &str,
    builds: Option<&dyn BuildService>,
) -> Result<ResolvedBuild> {
    match source {
        BuildSource::Local {
            artifacts_dir,
            build_number,
        } => {
            info!("Using local artifacts from {}", artifacts_dir.display());
            Ok(ResolvedBuild {
                build: None,
                build_number: build_number.clone(),
                layout: ArtifactLayout::detect(artifacts_dir)?,
            })
        }
        BuildSource::Service {
            definition,
            build_number,
            artifact_names,
        } => {
            let builds = builds.ok_or_else(|| Error::BuildResolution {
                message: "no build service is available".to_string(),
                hint: Some("Set artifacts-dir to insert local artifacts".to_string()),
            })?;
            resolve_from_service(
                builds,
                definition,
                branch,
                build_number.as_deref(),
                artifact_names,
            )
        }
    }
}

/// Pick the single definition named `name`.
fn find_definition(builds: &dyn BuildService, name: &str) -> Result<u64> {
    let definitions = builds.find_definitions(name)?;
    match definitions.as_slice() {
        [definition] => Ok(definition.id),
        [] => Err(Error::BuildResolution {
            message: format!("no build definition named '{}'", name),
            hint: None,
        }),
        many => Err(Error::BuildResolution {
            message: format!(
                "{} build definitions are named '{}' (ids {})",
                many.len(),
                name,
                many.iter()
                    .map(|d| d.id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            hint: Some("Build definition names must be unique".to_string()),
        }),
    }
}

/// The newest build by build number, falling back to service order for
/// numbers that are not `build.revision`.
fn newest(builds: Vec<Build>) -> Option<Build> {
    let by_version = builds
        .iter()
        .filter_map(|b| {
            b.build_number
                .parse::<BuildVersion>()
                .ok()
                .map(|v| (v, b))
        })
        .max_by_key(|(v, _)| *v)
        .map(|(_, b)| b.clone());
    by_version.or_else(|| builds.into_iter().next())
}

fn resolve_from_service(
    builds: &dyn BuildService,
    definition_name: &str,
    branch: &str,
    build_number: Option<&str>,
    artifact_names: &[String],
) -> Result<ResolvedBuild> {
    let definition_id = find_definition(builds, definition_name)?;
    debug!("Build definition '{}' has id {}", definition_name, definition_id);

    let candidates = builds.list_builds(&BuildQuery {
        definition_id,
        branch: branch.to_string(),
        succeeded_only: build_number.is_none(),
    })?;

    let build = match build_number {
        Some(number) => candidates
            .into_iter()
            .find(|b| b.build_number == number)
            .ok_or_else(|| Error::BuildResolution {
                message: format!("build {} of '{}' not found", number, definition_name),
                hint: None,
            })?,
        None => newest(candidates).ok_or_else(|| Error::BuildResolution {
            message: format!("'{}' has no succeeded builds", definition_name),
            hint: Some("Set build-number to insert a specific build".to_string()),
        })?,
    };
    info!("Inserting build {} (id {})", build.build_number, build.id);

    for name in artifact_names {
        match builds.locate_artifact(&build, name)? {
            Some(path) => {
                info!("Using artifact {} at {}", name, path.display());
                let layout = ArtifactLayout::detect(&path)?;
                return Ok(ResolvedBuild {
                    build_number: build.build_number.clone(),
                    build: Some(build),
                    layout,
                });
            }
            None => debug!("Build {} has no artifact {}", build.build_number, name),
        }
    }

    Err(Error::BuildResolution {
        message: format!(
            "build {} published none of the artifacts {:?}",
            build.build_number, artifact_names
        ),
        hint: None,
    })
}

/// Resolve a layout for a local directory. Used by `plan`.
pub fn local(dir: &Path, build_number: &str) -> Result<ResolvedBuild> {
    execute(
        &BuildSource::Local {
            artifacts_dir: dir.to_path_buf(),
            build_number: build_number.to_string(),
        },
        "",
        None,
    )
}
