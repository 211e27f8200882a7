//! In-memory repository snapshots
//!
//! `MemoryFS` holds the content of a repository at one or more commits. It
//! backs the `plan` command's working-tree mode and every test that needs a
//! target repository without a service behind it.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path::normalize_repo_path;
use crate::services::FileSource;

/// Files stored under the wildcard commit are visible at every commit.
const ANY_COMMIT: &str = "*";

/// A file's content at a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub content: String,
}

impl File {
    pub fn from_string(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

/// In-memory repository content keyed by `(commit, path)`
#[derive(Debug, Clone, Default)]
pub struct MemoryFS {
    files: BTreeMap<(String, String), File>,
}

impl MemoryFS {
    /// Create a new empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file visible at every commit
    pub fn add_file_string(&mut self, path: &str, content: &str) -> Result<()> {
        self.add_file_at(ANY_COMMIT, path, content)
    }

    /// Add a file visible only at `commit`
    pub fn add_file_at(&mut self, commit: &str, path: &str, content: &str) -> Result<()> {
        let path = normalize_repo_path(path);
        if path.is_empty() {
            return Err(Error::Filesystem {
                message: "Cannot add a file with an empty path".to_string(),
            });
        }
        self.files
            .insert((commit.to_string(), path), File::from_string(content));
        Ok(())
    }

    /// Get a file by path at `commit`, falling back to files visible at
    /// every commit
    pub fn get_file(&self, path: &str, commit: &str) -> Option<&File> {
        let path = normalize_repo_path(path);
        self.files
            .get(&(commit.to_string(), path.clone()))
            .or_else(|| self.files.get(&(ANY_COMMIT.to_string(), path)))
    }

    /// Check if a file exists at `commit`
    pub fn exists(&self, path: &str, commit: &str) -> bool {
        self.get_file(path, commit).is_some()
    }

    /// Get the number of stored files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Load every UTF-8 file under `root` as visible at every commit.
    ///
    /// `.git` directories are skipped; files that are not valid UTF-8 are
    /// ignored since nothing the store reads is binary.
    pub fn load_dir(root: &Path) -> Result<Self> {
        let mut fs = Self::new();
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry.map_err(|e| Error::Filesystem {
                message: format!("Failed to walk '{}': {}", root.display(), e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                fs.add_file_string(&relative.to_string_lossy(), &content)?;
            }
        }
        Ok(fs)
    }
}

impl FileSource for MemoryFS {
    fn read_file(&self, path: &str, commit: &str) -> Result<Option<String>> {
        Ok(self.get_file(path, commit).map(|f| f.content.clone()))
    }
}
