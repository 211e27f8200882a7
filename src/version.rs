//! # Build and Package Versions
//!
//! Two version notions meet during an insertion:
//!
//! - **`BuildVersion`**: the `(build, revision)` pair a build service stamps
//!   on every build, written `20160314.1` or `20160314-1`. It orders
//!   lexicographically on `(build, revision)`.
//! - **`PackageInfo`**: what a package artifact's file name says about the
//!   package it contains. The grammar is
//!   `[Prefix.]LibraryName.Major.Minor.Patch[-label]`; everything before the
//!   first numeric token that starts a valid version is the package id.
//!
//! Pinned package versions in the target repository are compared as
//! semantic versions. NuGet tolerates `1.0` style versions, so
//! [`parse_package_version`] pads missing minor/patch components before
//! handing the string to `semver`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use semver::Version;

use crate::error::{Error, Result};

/// Package file extension recognised by the reconciler.
pub const PACKAGE_EXTENSION: &str = ".nupkg";

const SYMBOLS_SUFFIX: &str = ".symbols.nupkg";

/// Package file stem grammar: `<id>.<major>.<minor>[.<patch>][-label][+meta]`.
const PACKAGE_FILE_PATTERN: &str =
    r"^(?P<id>.+?)\.(?P<version>\d+(?:\.\d+){1,2}(?:-[0-9A-Za-z.\-]+)?(?:\+[0-9A-Za-z.\-]+)?)$";

/// A build service build number, ordered on `(build, revision)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildVersion {
    pub build: u32,
    pub revision: u32,
}

impl BuildVersion {
    pub fn new(build: u32, revision: u32) -> Self {
        Self { build, revision }
    }
}

impl FromStr for BuildVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidVersion {
            value: s.to_string(),
            message: message.to_string(),
        };

        let (build, revision) = s
            .trim()
            .split_once(|c| c == '.' || c == '-')
            .ok_or_else(|| invalid("expected NNNNNNNN.N or NNNNNNNN-N"))?;

        let build = build
            .parse::<u32>()
            .map_err(|_| invalid("build component is not a number"))?;
        let revision = revision
            .parse::<u32>()
            .map_err(|_| invalid("revision component is not a number"))?;

        Ok(Self { build, revision })
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.build, self.revision)
    }
}

/// Parse a pinned or produced package version.
///
/// `1` and `1.2` are accepted and padded to `1.0.0` / `1.2.0`; four-part
/// assembly-style versions are rejected.
pub fn parse_package_version(value: &str) -> Result<Version> {
    let value = value.trim();
    let suffix_at = value.find(['-', '+']).unwrap_or(value.len());
    let (core, suffix) = value.split_at(suffix_at);

    let parts = core.split('.').count();
    let normalized = match parts {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        3 => value.to_string(),
        _ => {
            return Err(Error::InvalidVersion {
                value: value.to_string(),
                message: format!("expected at most three numeric components, found {}", parts),
            })
        }
    };

    Ok(Version::parse(&normalized)?)
}

/// Identity and version of a package artifact, derived from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// The artifact's file stem, e.g. `VS.Tools.Roslyn.4.1.0-beta`.
    pub package_name: String,
    /// The non-numeric prefix of the file stem: the package id that pins
    /// refer to, e.g. `VS.Tools.Roslyn`.
    pub library_name: String,
    pub version: Version,
    /// Whether a regression of this package aborts the run.
    pub is_primary: bool,
}

impl PackageInfo {
    /// Parse a package file name such as `Foo.Bar.1.2.3-beta.nupkg`.
    ///
    /// The `.nupkg` extension is optional. Returns an error when no version
    /// suffix can be found.
    pub fn parse(file_name: &str) -> Result<Self> {
        let stem = file_name
            .strip_suffix(PACKAGE_EXTENSION)
            .unwrap_or(file_name);

        let pattern = Regex::new(PACKAGE_FILE_PATTERN)?;
        let captures = pattern.captures(stem).ok_or_else(|| Error::InvalidVersion {
            value: file_name.to_string(),
            message: "package file name has no version suffix".to_string(),
        })?;

        let version = parse_package_version(&captures["version"])?;

        Ok(Self {
            package_name: stem.to_string(),
            library_name: captures["id"].to_string(),
            version,
            is_primary: false,
        })
    }

    /// Parse the file name component of `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidVersion {
                value: path.display().to_string(),
                message: "path has no UTF-8 file name".to_string(),
            })?;
        Self::parse(file_name)
    }

    /// Mark the package as primary (regressions become fatal).
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }
}

/// Whether `path` names a package artifact the reconciler should consider.
///
/// Symbol packages ship alongside the real ones and are never pinned.
pub fn is_package_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(PACKAGE_EXTENSION) && !lower.ends_with(SYMBOLS_SUFFIX)
        })
        .unwrap_or(false)
}
