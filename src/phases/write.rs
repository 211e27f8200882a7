//! Writing a changeset to disk
//!
//! `plan --apply` writes the computed changes into a local working tree
//! instead of pushing them. Content is written exactly as it would be
//! pushed, with `\n` line endings.

use std::fs;
use std::path::Path;

use log::debug;

use crate::changeset::GitChange;
use crate::error::{Error, Result};
use crate::path::normalize_repo_path;

/// Write every change under `root`, creating parent directories as needed.
pub fn execute(changes: &[GitChange], root: &Path) -> Result<()> {
    for change in changes {
        let relative = normalize_repo_path(&change.path);
        let escapes = change.path.split(['/', '\\']).any(|segment| segment == "..");
        if relative.is_empty() || escapes {
            return Err(Error::Filesystem {
                message: format!("Refusing to write outside the working tree: '{}'", change.path),
            });
        }
        let full_path = root.join(&relative);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
                message: format!("Failed to create directory '{}': {}", parent.display(), e),
            })?;
        }

        fs::write(&full_path, &change.new_content).map_err(|e| Error::Filesystem {
            message: format!("Failed to write file '{}': {}", full_path.display(), e),
        })?;
        debug!("Wrote {}", full_path.display());
    }
    Ok(())
}
