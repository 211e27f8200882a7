//! Component reconciliation
//!
//! Each `.vsman` manifest a build produces describes one component. The
//! manifest's first payload whose URL carries a drop separator (`;`) tells
//! us where the build dropped it; that location replaces the one recorded
//! in the target's components graph.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::store::{Component, ConfigStore};

const DROP_SEPARATOR: char = ';';

#[derive(Debug, Deserialize)]
struct Manifest {
    info: ManifestInfo,
    #[serde(default)]
    packages: Vec<ManifestPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestInfo {
    manifest_name: String,
    #[serde(default)]
    build_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    #[serde(default)]
    payloads: Vec<ManifestPayload>,
}

#[derive(Debug, Deserialize)]
struct ManifestPayload {
    #[serde(default)]
    url: Option<String>,
}

/// Result of scanning a set of manifests.
#[derive(Debug, Default)]
pub struct ManifestScan {
    /// One candidate per usable manifest, in discovery order.
    pub components: Vec<Component>,
    /// Payload URLs rejected for lacking a drop separator.
    pub skipped_urls: usize,
}

/// Parse `text` into the component it describes.
///
/// Returns `Ok(None)` when no payload URL carries a drop separator.
/// `skipped` is bumped once per URL rejected along the way.
pub fn parse_manifest(
    path: &Path,
    text: &str,
    skipped: &AtomicUsize,
) -> Result<Option<Component>> {
    let manifest: Manifest = serde_json::from_str(text).map_err(|e| Error::ComponentsJson {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let urls = manifest
        .packages
        .iter()
        .flat_map(|package| package.payloads.iter())
        .filter_map(|payload| payload.url.as_deref());

    for url in urls {
        match url.split_once(DROP_SEPARATOR) {
            Some((drop, _)) => {
                let uri = format!("{}{}{}", drop, DROP_SEPARATOR, file_name);
                return Ok(Some(Component::new(
                    manifest.info.manifest_name,
                    file_name,
                    uri,
                    manifest.info.build_version,
                )));
            }
            None => {
                debug!("Payload URL '{}' in {} has no drop separator", url, path.display());
                skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    warn!(
        "Skipping manifest {}: no payload URL contains a '{}' drop separator",
        path.display(),
        DROP_SEPARATOR
    );
    Ok(None)
}

/// Read and parse every manifest in parallel.
///
/// Any unreadable or malformed manifest fails the scan.
pub fn scan_manifests(files: &[PathBuf]) -> Result<ManifestScan> {
    let skipped = AtomicUsize::new(0);

    let parsed = files
        .par_iter()
        .map(|file| {
            let text = fs::read_to_string(file).map_err(|e| Error::Filesystem {
                message: format!("Failed to read manifest '{}': {}", file.display(), e),
            })?;
            parse_manifest(file, &text, &skipped)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ManifestScan {
        components: parsed.into_iter().flatten().collect(),
        skipped_urls: skipped.into_inner(),
    })
}

/// Outcome of a component pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentReport {
    pub updated: Vec<String>,
    /// Manifests whose component is not declared in the target.
    pub not_present: Vec<String>,
    pub skipped_urls: usize,
    pub needs_save: bool,
}

/// Merge `candidates` into the store's components graph.
///
/// Only components the target already declares are touched.
pub fn reconcile_components(
    candidates: Vec<Component>,
    store: &mut ConfigStore,
) -> ComponentReport {
    let mut report = ComponentReport::default();

    if !store.has_components() {
        if !candidates.is_empty() {
            warn!(
                "Build produced {} component manifest(s) but the target has no components file",
                candidates.len()
            );
        }
        report.not_present = candidates.into_iter().map(|c| c.name).collect();
        return report;
    }

    for candidate in candidates {
        if store.try_get_component_by_name(&candidate.name).is_none() {
            info!(
                "Component {} is not declared in the target repository; skipping",
                candidate.name
            );
            report.not_present.push(candidate.name);
            continue;
        }
        if store.update_component(&candidate) {
            info!("Updating component {} to {}", candidate.name, candidate.uri);
            report.updated.push(candidate.name);
            report.needs_save = true;
        }
    }

    report
}

/// Scan `files` and reconcile the result in one go.
pub fn reconcile_manifest_files(
    files: &[PathBuf],
    store: &mut ConfigStore,
) -> Result<ComponentReport> {
    info!("Scanning {} component manifest(s)", files.len());
    let scan = scan_manifests(files)?;
    if scan.skipped_urls > 0 {
        warn!(
            "Skipped {} payload URL(s) without a drop separator",
            scan.skipped_urls
        );
    }
    let mut report = reconcile_components(scan.components, store);
    report.skipped_urls = scan.skipped_urls;
    Ok(report)
}
