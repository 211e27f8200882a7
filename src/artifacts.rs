//! # Artifact Resolution
//!
//! A build publishes its insertion artifacts in one of two directory
//! layouts. [`ArtifactLayout::detect`] decides which one a directory uses;
//! everything downstream only asks the layout where things are.
//!
//! ## Arcade layout
//!
//! Detected when the directory is named `VSSetup` or contains a `VSSetup`
//! directory (which then becomes the root):
//!
//! ```text
//! VSSetup/
//!   DevDivPackages/**/*.nupkg
//!   Insertion/**/*.vsman
//!   OptProf/**/*.props
//! ```
//!
//! ## Legacy layout
//!
//! Any directory with a `DevDivPackages` child:
//!
//! ```text
//! <drop>/
//!   DevDivPackages/**/*.nupkg
//!   OptProf/**/*.props
//!   **/*.vsman            (anywhere in the drop)
//! ```

use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::version::is_package_file;

const ARCADE_ROOT: &str = "VSSetup";
const PACKAGES_DIR: &str = "DevDivPackages";
const INSERTION_DIR: &str = "Insertion";
const OPT_PROF_DIR: &str = "OptProf";

const MANIFEST_EXTENSION: &str = "vsman";
const OPT_PROF_EXTENSION: &str = "props";

/// Directory conventions of a build's published insertion artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLayout {
    Arcade { root: PathBuf },
    Legacy { root: PathBuf },
}

impl ArtifactLayout {
    /// Inspect `dir` and pick the layout it follows.
    pub fn detect(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::ArtifactLayout {
                path: dir.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        let is_arcade_root = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(ARCADE_ROOT));
        if is_arcade_root {
            debug!("{} is an arcade artifact root", dir.display());
            return Ok(ArtifactLayout::Arcade {
                root: dir.to_path_buf(),
            });
        }

        let nested = dir.join(ARCADE_ROOT);
        if nested.is_dir() {
            debug!("{} contains an arcade artifact root", dir.display());
            return Ok(ArtifactLayout::Arcade { root: nested });
        }

        if dir.join(PACKAGES_DIR).is_dir() {
            debug!("{} is a legacy artifact drop", dir.display());
            return Ok(ArtifactLayout::Legacy {
                root: dir.to_path_buf(),
            });
        }

        Err(Error::ArtifactLayout {
            path: dir.to_path_buf(),
            message: format!(
                "expected a '{}' directory or a '{}' subdirectory",
                ARCADE_ROOT, PACKAGES_DIR
            ),
        })
    }

    pub fn root(&self) -> &Path {
        match self {
            ArtifactLayout::Arcade { root } | ArtifactLayout::Legacy { root } => root,
        }
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root().join(PACKAGES_DIR)
    }

    /// Directory searched for component manifests.
    pub fn manifests_dir(&self) -> PathBuf {
        match self {
            ArtifactLayout::Arcade { root } => root.join(INSERTION_DIR),
            ArtifactLayout::Legacy { root } => root.clone(),
        }
    }

    pub fn opt_prof_dir(&self) -> PathBuf {
        self.root().join(OPT_PROF_DIR)
    }

    /// Every package artifact, sorted by path.
    pub fn package_files(&self) -> Result<Vec<PathBuf>> {
        find_package_files(&self.packages_dir())
    }

    /// Every component manifest, sorted by path.
    pub fn manifest_files(&self) -> Result<Vec<PathBuf>> {
        files_under(&self.manifests_dir(), |p| has_extension(p, MANIFEST_EXTENSION))
    }

    /// Every opt-prof property file, sorted by path.
    pub fn opt_prof_property_files(&self) -> Result<Vec<PathBuf>> {
        files_under(&self.opt_prof_dir(), |p| has_extension(p, OPT_PROF_EXTENSION))
    }
}

/// Package artifacts anywhere under `dir`, sorted by path.
pub fn find_package_files(dir: &Path) -> Result<Vec<PathBuf>> {
    files_under(dir, is_package_file)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Files under `dir` accepted by `filter`. A missing `dir` yields nothing.
fn files_under(dir: &Path, filter: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Filesystem {
            message: format!("Failed to scan '{}': {}", dir.display(), e),
        })?;
        if entry.file_type().is_file() && filter(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
