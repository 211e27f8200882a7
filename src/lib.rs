//! # Insertion Tool Library
//!
//! This library moves the outputs of a component build into a downstream
//! product repository. It reads a build's artifacts, updates the package
//! version pins and component manifest entries the product repository
//! declares, and publishes the result as a single commit on an insertion
//! branch with a pull request against the target branch. It backs the
//! `insertion-tool` command-line tool.
//!
//! ## Quick Example
//!
//! ```
//! use insertion_tool::filesystem::MemoryFS;
//! use insertion_tool::store::{ConfigStore, StorePaths};
//! use insertion_tool::version::PackageInfo;
//!
//! let mut repo = MemoryFS::new();
//! repo.add_file_string(
//!     ".corext/Configs/default.config",
//!     "<packages>\n  <package id=\"Foo\" version=\"1.0.0\" />\n</packages>\n",
//! )
//! .unwrap();
//!
//! let paths = StorePaths {
//!     config_path: ".corext/Configs/default.config".to_string(),
//!     legacy_props_path: None,
//!     components_paths: Vec::new(),
//! };
//! let mut store = ConfigStore::load(&repo, "HEAD", &paths).unwrap();
//! let package = PackageInfo::parse("Foo.1.1.0.nupkg").unwrap();
//! assert!(store.update_package_version(&package));
//!
//! let changes = store.save_config().unwrap();
//! assert_eq!(changes.len(), 1);
//! assert!(changes[0].new_content.contains("version=\"1.1.0\""));
//! ```
//!
//! ## Core Concepts
//!
//! - **Options (`config`)**: the `.insertion.yaml` schema and its
//!   validation into an immutable [`config::ValidatedOptions`].
//! - **Config Store (`store`)**: the product repository's pin files and
//!   components files, loaded at one commit, edited in memory and flushed
//!   into a changeset.
//! - **Reconcilers (`reconcile`)**: decide which pins and component entries
//!   a build changes.
//! - **Services (`services`, `azdo`, `git`)**: traits for reading files,
//!   driving version control and querying builds, with an Azure DevOps
//!   client and a local git reader behind them.
//! - **Phases (`phases`)**: the insertion state machine and the steps it
//!   runs, from authentication through the pull request and its follow-ups.
//!
//! ## Execution Flow
//!
//! [`phases::Insertion::run`] verifies access, resolves the build and its
//! artifact layout, loads the store at the target head, reconciles packages
//! and components, and builds the changeset. An empty changeset ends the run
//! as a no-op. Otherwise the changes are pushed as one commit, requested
//! cherry-picks are applied, and the pull request is created or updated.
//! Validation, auto-complete and build retention follow; their failures are
//! reported as warnings.

pub mod artifacts;
pub mod azdo;
pub mod changeset;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod git;
pub mod output;
pub mod path;
pub mod phases;
pub mod polling;
pub mod reconcile;
pub mod services;
pub mod store;
pub mod version;

#[cfg(test)]
mod version_proptest;
