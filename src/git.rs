//! Local git checkout access
//!
//! [`GitCheckout`] reads files at a commit straight out of a local clone with
//! the system `git` binary, so `plan` can reconcile against exactly the
//! snapshot an insertion would see without talking to any service.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::debug;

use crate::error::{Error, Result};
use crate::services::FileSource;

/// A local clone of the target repository.
#[derive(Debug, Clone)]
pub struct GitCheckout {
    repo: PathBuf,
}

impl GitCheckout {
    /// Open the clone at `repo`. Fails if it is not inside a git work tree.
    pub fn open(repo: impl Into<PathBuf>) -> Result<Self> {
        let checkout = Self { repo: repo.into() };
        checkout.run(&["rev-parse", "--git-dir"])?;
        Ok(checkout)
    }

    pub fn path(&self) -> &Path {
        &self.repo
    }

    /// Resolve `rev` (branch, tag, `HEAD`, ...) to a full commit id.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self.run(&["rev-parse", "--verify", &spec])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn command(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|e| Error::GitCommand {
                command: args.join(" "),
                repo: self.repo.clone(),
                stderr: e.to_string(),
            })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = self.command(args)?;
        if !output.status.success() {
            return Err(Error::GitCommand {
                command: args.join(" "),
                repo: self.repo.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl FileSource for GitCheckout {
    fn read_file(&self, path: &str, commit: &str) -> Result<Option<String>> {
        let object = format!("{}:{}", commit, path);

        // `cat-file -e` separates "no such path" from real failures.
        let exists = self.command(&["cat-file", "-e", &object])?;
        if !exists.status.success() {
            debug!("{} does not exist at {}", path, commit);
            return Ok(None);
        }

        let output = self.run(&["show", &object])?;
        String::from_utf8(output.stdout)
            .map(Some)
            .map_err(|e| Error::FileLoad {
                path: path.to_string(),
                commit: commit.to_string(),
                message: format!("not valid UTF-8: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args([
                "-c",
                "user.name=Insertion Test",
                "-c",
                "user.email=insertion@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn repo_with_commit() -> TempDir {
        let temp = TempDir::new().unwrap();
        git(temp.path(), &["init", "-q"]);
        fs::create_dir_all(temp.path().join("cfg")).unwrap();
        fs::write(temp.path().join("cfg/default.config"), "<packages />\n").unwrap();
        git(temp.path(), &["add", "."]);
        git(temp.path(), &["commit", "-q", "-m", "init"]);
        temp
    }

    #[test]
    fn test_read_file_at_commit() {
        if !git_available() {
            return;
        }
        let temp = repo_with_commit();
        let checkout = GitCheckout::open(temp.path()).unwrap();
        let head = checkout.rev_parse("HEAD").unwrap();
        assert_eq!(head.len(), 40);

        // Working tree edits are invisible at the commit.
        fs::write(temp.path().join("cfg/default.config"), "changed").unwrap();
        assert_eq!(
            checkout.read_file("cfg/default.config", &head).unwrap(),
            Some("<packages />\n".to_string())
        );
        assert_eq!(checkout.read_file("cfg/missing.json", &head).unwrap(), None);
    }

    #[test]
    fn test_open_outside_repository_fails() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let err = GitCheckout::open(temp.path()).unwrap_err();
        assert!(matches!(err, Error::GitCommand { .. }));
    }

    #[test]
    fn test_rev_parse_unknown_revision_fails() {
        if !git_available() {
            return;
        }
        let temp = repo_with_commit();
        let checkout = GitCheckout::open(temp.path()).unwrap();
        assert!(checkout.rev_parse("no-such-branch").is_err());
    }
}
