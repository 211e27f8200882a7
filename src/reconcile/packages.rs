//! Package reconciliation
//!
//! Walks the package artifacts a build produced and moves the matching pins
//! forward. Pins only ever move forward: a lower version than the one pinned
//! is dropped, unless the package is primary, in which case the whole run
//! stops (inserting an older compiler than the one already in the product is
//! never what anyone meant).
//!
//! Packages without a pin are left alone. New pins are never created.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use log::{debug, info, warn};
use semver::Version;

use crate::artifacts::find_package_files;
use crate::error::{Error, Result};
use crate::store::ConfigStore;
use crate::version::{parse_package_version, PackageInfo};

/// What to do with a pin given the inserted version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDecision {
    /// The inserted version is newer; move the pin.
    Update,
    /// Same version already pinned.
    Unchanged,
    /// The inserted version is older and the regression is tolerated.
    IgnoreDowngrade,
}

/// Decide how a pin at `previous` reacts to `new`.
///
/// Fails only for a primary package regressing without
/// `skip_version_validation`.
pub fn decide(
    package: &str,
    new: &Version,
    previous: &Version,
    is_primary: bool,
    skip_version_validation: bool,
) -> Result<PinDecision> {
    match new.cmp(previous) {
        std::cmp::Ordering::Greater => Ok(PinDecision::Update),
        std::cmp::Ordering::Equal => Ok(PinDecision::Unchanged),
        std::cmp::Ordering::Less if is_primary && !skip_version_validation => {
            Err(Error::OutdatedPackage {
                package: package.to_string(),
                previous: previous.to_string(),
                new: new.to_string(),
            })
        }
        std::cmp::Ordering::Less => Ok(PinDecision::IgnoreDowngrade),
    }
}

/// Inputs that shape how packages are reconciled.
#[derive(Debug, Clone, Default)]
pub struct PackageRules {
    /// Handled by [`reconcile_toolset`], never by the general pass.
    pub toolset_package: String,
    pub ignore: Vec<Pattern>,
    pub primary: Vec<String>,
    pub skip_version_validation: bool,
}

impl PackageRules {
    fn is_ignored(&self, package: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::default()
        };
        self.ignore
            .iter()
            .any(|pattern| pattern.matches_with(package, options))
    }

    fn is_primary(&self, package: &str) -> bool {
        self.primary
            .iter()
            .any(|primary| primary.eq_ignore_ascii_case(package))
    }

    fn is_toolset(&self, package: &str) -> bool {
        !self.toolset_package.is_empty() && self.toolset_package.eq_ignore_ascii_case(package)
    }
}

/// A pin that moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUpdate {
    pub package: String,
    pub previous: String,
    pub new: String,
}

/// Outcome of a package pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageReport {
    pub updated: Vec<PackageUpdate>,
    pub unchanged: Vec<String>,
    pub downgrades_ignored: Vec<String>,
    /// Packages with no pin in the target repository.
    pub not_pinned: Vec<String>,
    pub ignored: Vec<String>,
    /// Files or pins whose versions could not be parsed.
    pub unparsable: Vec<String>,
}

impl PackageReport {
    pub fn has_updates(&self) -> bool {
        !self.updated.is_empty()
    }
}

/// Reconcile every package artifact under `packages_dir`.
pub fn reconcile_packages(
    packages_dir: &Path,
    store: &mut ConfigStore,
    rules: &PackageRules,
) -> Result<PackageReport> {
    let files = find_package_files(packages_dir)?;
    info!(
        "Reconciling {} package(s) from {}",
        files.len(),
        packages_dir.display()
    );
    reconcile_package_files(&files, store, rules)
}

/// Reconcile an explicit list of package artifacts.
pub fn reconcile_package_files(
    files: &[PathBuf],
    store: &mut ConfigStore,
    rules: &PackageRules,
) -> Result<PackageReport> {
    let mut report = PackageReport::default();

    for file in files {
        let package = match PackageInfo::from_path(file) {
            Ok(package) => package,
            Err(e) => {
                warn!("Skipping {}: {}", file.display(), e);
                report.unparsable.push(file.display().to_string());
                continue;
            }
        };

        if rules.is_toolset(&package.library_name) {
            debug!("Skipping toolset package {}", package.library_name);
            continue;
        }
        if rules.is_ignored(&package.library_name) {
            debug!("Ignoring package {}", package.library_name);
            report.ignored.push(package.library_name);
            continue;
        }

        let is_primary = rules.is_primary(&package.library_name);
        apply(
            package.with_primary(is_primary),
            store,
            rules.skip_version_validation,
            &mut report,
        )?;
    }

    Ok(report)
}

/// Reconcile the toolset package on its own. The toolset is always primary.
///
/// Returns an empty report when the build did not produce the toolset.
pub fn reconcile_toolset(
    files: &[PathBuf],
    store: &mut ConfigStore,
    rules: &PackageRules,
) -> Result<PackageReport> {
    let mut report = PackageReport::default();

    let toolset = files
        .iter()
        .filter_map(|file| PackageInfo::from_path(file).ok())
        .find(|package| rules.is_toolset(&package.library_name));

    match toolset {
        Some(package) => apply(
            package.with_primary(true),
            store,
            rules.skip_version_validation,
            &mut report,
        )?,
        None => warn!(
            "Toolset package {} was not produced by this build",
            rules.toolset_package
        ),
    }

    Ok(report)
}

/// Decide every pin of `package` on its own before writing any of them, so
/// a regressing primary pin aborts without a half-applied update.
fn apply(
    package: PackageInfo,
    store: &mut ConfigStore,
    skip_version_validation: bool,
    report: &mut PackageReport,
) -> Result<()> {
    let pins = store.pins(&package.library_name);
    if pins.is_empty() {
        info!(
            "{} is not pinned in the target repository; adding new packages is not supported",
            package.library_name
        );
        report.not_pinned.push(package.library_name);
        return Ok(());
    }

    let mut decisions = Vec::with_capacity(pins.len());
    for (source, pinned) in pins {
        let previous = match parse_package_version(&pinned) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(
                    "Pinned version '{}' of {} in {} is not a valid version: {}",
                    pinned, package.library_name, source, e
                );
                continue;
            }
        };
        let decision = decide(
            &package.library_name,
            &package.version,
            &previous,
            package.is_primary,
            skip_version_validation,
        )?;
        decisions.push((source, pinned, decision));
    }
    if decisions.is_empty() {
        report.unparsable.push(package.library_name);
        return Ok(());
    }

    let new = package.version.to_string();
    let mut updated_from = None;
    let mut kept = false;
    for (source, pinned, decision) in decisions {
        match decision {
            PinDecision::Update => {
                info!(
                    "Updating {} in {} from {} to {}",
                    package.library_name, source, pinned, new
                );
                store.set_pin_version(source, &package.library_name, &new);
                if updated_from.is_none() {
                    updated_from = Some(pinned);
                }
            }
            PinDecision::Unchanged => {
                debug!("{} is already at {} in {}", package.library_name, pinned, source);
            }
            PinDecision::IgnoreDowngrade => {
                warn!(
                    "Not downgrading {} in {} from {} to {}",
                    package.library_name, source, pinned, new
                );
                kept = true;
            }
        }
    }

    if kept {
        report.downgrades_ignored.push(package.library_name.clone());
    }
    match updated_from {
        Some(previous) => report.updated.push(PackageUpdate {
            package: package.library_name,
            previous,
            new,
        }),
        None if !kept => report.unchanged.push(package.library_name),
        None => {}
    }
    Ok(())
}
