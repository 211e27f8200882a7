//! # Error Handling
//!
//! This module defines the centralized error type for the insertion tool. It
//! uses `thiserror` to build a single `Error` enum covering every failure the
//! library can report, each variant carrying enough context (paths, commits,
//! package ids, URLs) to make the logged message actionable on its own.
//!
//! ## Key Components
//!
//! - **`Error`**: every failure the library can produce.
//! - **`Result<T>`**: alias for `std::result::Result<T, Error>`.
//!
//! ## Fatal vs. phase-local failures
//!
//! Most variants abort an insertion run. The orchestrator catches the few
//! that only affect a downstream effect (a cherry-pick that failed, a build
//! policy that never showed up, an auto-complete request that was refused)
//! and turns them into warnings; [`Error::is_fatal`] is the single place that
//! classification lives.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for insertion operations
#[derive(Error, Debug)]
pub enum Error {
    /// The insertion options file could not be parsed.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// The options parsed but failed validation. Every issue found is listed.
    #[error("Invalid insertion options:\n  - {}", issues.join("\n  - "))]
    InvalidOptions { issues: Vec<String> },

    /// A dependency-pin XML document could not be parsed or serialized.
    #[error("XML error in {path}: {message}")]
    Xml { path: String, message: String },

    /// A components JSON document could not be parsed.
    #[error("JSON error in {path}: {message}")]
    ComponentsJson { path: String, message: String },

    /// A file required while loading the target repository could not be read.
    #[error("Failed to load {path} at {commit}: {message}")]
    FileLoad {
        path: String,
        commit: String,
        message: String,
    },

    /// A primary package's new version is lower than the pinned one.
    #[error("Outdated package {package}: pinned version {previous} is newer than inserted version {new}")]
    OutdatedPackage {
        package: String,
        previous: String,
        new: String,
    },

    /// A package or build version string did not follow the expected grammar.
    #[error("Invalid version '{value}': {message}")]
    InvalidVersion { value: String, message: String },

    /// The build to insert could not be located.
    #[error("Build resolution error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    BuildResolution {
        message: String,
        hint: Option<String>,
    },

    /// The artifact directory matched neither known layout.
    #[error("Unrecognised artifact layout at {}: {message}", path.display())]
    ArtifactLayout { path: PathBuf, message: String },

    /// The service rejected the supplied credentials.
    #[error("Authentication failed for {url}: {message}")]
    Authentication { url: String, message: String },

    /// A call to an external service failed.
    #[error("Service call failed: {operation} ({url}){}: {message}", status.map(|s| format!(" [HTTP {}]", s)).unwrap_or_default())]
    Service {
        operation: String,
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// A branch the run depends on does not exist.
    #[error("Branch '{branch}' does not exist in the target repository")]
    BranchNotFound { branch: String },

    /// An asynchronous server-side operation reported a terminal failure.
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// A bounded wait expired before the awaited condition held.
    #[error("Timed out after {}s waiting for {what}", waited.as_secs())]
    Timeout { what: String, waited: Duration },

    /// The run was cancelled before the named phase started.
    #[error("Insertion cancelled before {phase}")]
    Cancelled { phase: String },

    /// Writing a change into a local working tree failed.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// A local `git` invocation failed.
    #[error("Git command failed in {}: {command} - {stderr}", repo.display())]
    GitCommand {
        command: String,
        repo: PathBuf,
        stderr: String,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),
}

impl Error {
    /// Whether this error must abort the run.
    ///
    /// Cherry-pick failures and policy timeouts only cancel the effect that
    /// depended on them; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::OperationFailed { .. } | Error::Timeout { .. })
    }

    pub(crate) fn service(
        operation: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Service {
            operation: operation.into(),
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config_parse_with_hint() {
        let error = Error::ConfigParse {
            message: "missing field `target-branch`".to_string(),
            hint: Some("Add 'target-branch:' to .insertion.yaml".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("Configuration parsing error"));
        assert!(display.contains("missing field"));
        assert!(display.contains("hint:"));
    }

    #[test]
    fn test_error_display_invalid_options_lists_every_issue() {
        let error = Error::InvalidOptions {
            issues: vec![
                "insertion-name must not be empty".to_string(),
                "poll-interval-secs must be positive".to_string(),
            ],
        };
        let display = format!("{}", error);
        assert!(display.contains("insertion-name"));
        assert!(display.contains("poll-interval-secs"));
    }

    #[test]
    fn test_error_display_outdated_package() {
        let error = Error::OutdatedPackage {
            package: "VS.Tools.Roslyn".to_string(),
            previous: "4.2.0".to_string(),
            new: "4.1.0".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("VS.Tools.Roslyn"));
        assert!(display.contains("4.2.0"));
        assert!(display.contains("4.1.0"));
    }

    #[test]
    fn test_error_display_service_with_status() {
        let error = Error::Service {
            operation: "create push".to_string(),
            url: "https://dev.azure.com/org".to_string(),
            status: Some(409),
            message: "ref was updated".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("[HTTP 409]"));
        assert!(display.contains("create push"));
    }

    #[test]
    fn test_error_display_timeout() {
        let error = Error::Timeout {
            what: "build policy 'CloudBuild'".to_string(),
            waited: Duration::from_secs(30),
        };
        assert!(format!("{}", error).contains("30s"));
    }

    #[test]
    fn test_phase_local_errors_are_not_fatal() {
        let failed = Error::OperationFailed {
            operation: "cherry-pick".to_string(),
            message: "conflicts".to_string(),
        };
        let timeout = Error::Timeout {
            what: "policy".to_string(),
            waited: Duration::from_secs(30),
        };
        assert!(!failed.is_fatal());
        assert!(!timeout.is_fatal());
        assert!(Error::Cancelled {
            phase: "push".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: [unclosed").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(format!("{}", error).contains("YAML parsing error"));
    }
}
