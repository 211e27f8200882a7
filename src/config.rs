//! # Insertion Options
//!
//! This module defines the `.insertion.yaml` options file and turns it into
//! the single validated value the orchestrator runs from.
//!
//! ## Key Components
//!
//! - **`InsertionOptions`**: the file as written, every key kebab-case, most
//!   keys optional with a default.
//! - **`ValidatedOptions`**: the checked form. Glob patterns are compiled,
//!   intervals are `Duration`s and the build source is resolved into
//!   [`BuildSource`]. Nothing downstream re-validates.
//! - **`ValidationIssue`**: one problem found by [`InsertionOptions::validate`].
//!   Validation collects every issue instead of stopping at the first.
//!
//! ## Example
//!
//! ```yaml
//! insertion-name: Roslyn
//! component-name: Roslyn
//! component-branch: main
//! target-branch: main
//! build-definition: dotnet-roslyn CI
//! primary-packages: [Microsoft.Net.Compilers]
//! ignore-packages: ["*.Test*"]
//! service-url: https://dev.azure.com/org
//! project: DevDiv
//! repository: VS
//! ```
//!
//! The access token is not part of the options; the CLI reads it from the
//! environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::path::sanitize_ref_segment;
use crate::polling::PollPolicy;
use crate::reconcile::PackageRules;
use crate::store::StorePaths;

/// Default options file name.
pub const DEFAULT_OPTIONS_FILE: &str = ".insertion.yaml";

fn default_true() -> bool {
    true
}

fn default_artifact_names() -> Vec<String> {
    vec!["VSSetup".to_string()]
}

fn default_config_path() -> String {
    ".corext/Configs/default.config".to_string()
}

fn default_legacy_props_path() -> Option<String> {
    Some("build/Packages.props".to_string())
}

fn default_components_paths() -> Vec<String> {
    vec![".corext/Configs/components.json".to_string()]
}

fn default_toolset_package() -> String {
    "VS.Tools.Roslyn".to_string()
}

fn default_branch_prefix() -> String {
    "insertions".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_policy_timeout_secs() -> u64 {
    30
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_poll_interval_secs() -> u64 {
    60
}

/// The options file as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InsertionOptions {
    /// Short name used in the insertion branch.
    pub insertion_name: String,
    /// Display name used in the pull request title.
    pub component_name: String,
    /// Branch the inserted build was produced from.
    pub component_branch: String,
    /// Branch of the target repository the PR merges into.
    pub target_branch: String,

    #[serde(default)]
    pub build_definition: Option<String>,
    /// Insert this build instead of the latest succeeded one.
    #[serde(default)]
    pub build_number: Option<String>,
    /// Use a local artifacts directory instead of asking the build service.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
    /// Build artifacts tried in order; the first one published wins.
    #[serde(default = "default_artifact_names")]
    pub artifact_names: Vec<String>,

    #[serde(default = "default_config_path")]
    pub config_path: String,
    #[serde(default = "default_legacy_props_path")]
    pub legacy_props_path: Option<String>,
    #[serde(default = "default_components_paths")]
    pub components_paths: Vec<String>,

    #[serde(default = "default_true")]
    pub insert_packages: bool,
    #[serde(default = "default_true")]
    pub insert_components: bool,
    #[serde(default)]
    pub insert_toolset: bool,
    #[serde(default = "default_toolset_package")]
    pub toolset_package: String,
    #[serde(default)]
    pub primary_packages: Vec<String>,
    /// Glob patterns matched case-insensitively against package ids.
    #[serde(default)]
    pub ignore_packages: Vec<String>,
    #[serde(default)]
    pub skip_version_validation: bool,

    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default)]
    pub title_prefix: String,
    #[serde(default)]
    pub title_suffix: String,
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub existing_pr: Option<u64>,
    #[serde(default)]
    pub overwrite_pr: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub auto_complete: bool,
    #[serde(default)]
    pub retain_build: bool,
    /// Commits replayed onto the insertion branch after the push.
    #[serde(default)]
    pub cherry_pick: Vec<String>,
    /// Display names of PR policies to requeue.
    #[serde(default)]
    pub validation_policies: Vec<String>,
    #[serde(default)]
    pub validation_build_definition: Option<String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Absent means wait for the cherry-pick indefinitely.
    #[serde(default)]
    pub cherry_pick_timeout_secs: Option<u64>,
    #[serde(default = "default_policy_timeout_secs")]
    pub policy_timeout_secs: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_poll_interval_secs")]
    pub max_poll_interval_secs: u64,

    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

/// One problem found while validating options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Where the build to insert comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSource {
    /// Look the build up through the build service.
    Service {
        definition: String,
        build_number: Option<String>,
        artifact_names: Vec<String>,
    },
    /// Artifacts already on disk.
    Local {
        artifacts_dir: PathBuf,
        build_number: String,
    },
}

/// Service coordinates of the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub url: Url,
    pub project: String,
    pub repository: String,
}

/// Options that shape the publish phases.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishOptions {
    pub branch_prefix: String,
    pub title_prefix: String,
    pub title_suffix: String,
    pub reviewers: Vec<String>,
    pub existing_pr: Option<u64>,
    pub overwrite_pr: bool,
    pub draft: bool,
    pub auto_complete: bool,
    pub retain_build: bool,
    pub cherry_pick: Vec<String>,
    pub validation_policies: Vec<String>,
    pub validation_build_definition: Option<String>,
}

/// Options the orchestrator accepts. Only [`InsertionOptions::validate`]
/// builds one.
#[derive(Debug, Clone)]
pub struct ValidatedOptions {
    pub insertion_name: String,
    pub component_name: String,
    pub component_branch: String,
    pub target_branch: String,
    pub source: BuildSource,
    pub store_paths: StorePaths,
    pub insert_packages: bool,
    pub insert_components: bool,
    pub insert_toolset: bool,
    pub package_rules: PackageRules,
    pub publish: PublishOptions,
    pub cherry_pick_polling: PollPolicy,
    pub policy_polling: PollPolicy,
    pub service: Option<ServiceTarget>,
}

impl ValidatedOptions {
    /// Name of the branch an insertion of `build_number` is pushed to.
    ///
    /// `/` in the component branch becomes `-` so the name stays one level
    /// below the prefix.
    pub fn insertion_branch(&self, build_number: &str) -> String {
        format!(
            "{}/{}-{}-{}",
            self.publish.branch_prefix,
            self.insertion_name,
            sanitize_ref_segment(&self.component_branch),
            build_number
        )
    }

    pub fn pull_request_title(&self, build_number: &str) -> String {
        format!(
            "{}{} '{}/{}' Insertion into {}{}",
            self.publish.title_prefix,
            self.component_name,
            self.component_branch,
            build_number,
            self.target_branch,
            self.publish.title_suffix
        )
    }
}

impl InsertionOptions {
    /// Check every option and build the validated form.
    ///
    /// All issues are reported together.
    pub fn validate(&self) -> std::result::Result<ValidatedOptions, Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        let required = [
            ("insertion-name", &self.insertion_name),
            ("component-name", &self.component_name),
            ("component-branch", &self.component_branch),
            ("target-branch", &self.target_branch),
            ("config-path", &self.config_path),
            ("branch-prefix", &self.branch_prefix),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                issues.push(ValidationIssue::new(field, "must not be empty"));
            }
        }
        if self.insert_toolset && self.toolset_package.trim().is_empty() {
            issues.push(ValidationIssue::new(
                "toolset-package",
                "must be set when insert-toolset is enabled",
            ));
        }

        let source = match (&self.artifacts_dir, &self.build_definition) {
            (Some(dir), _) => Some(BuildSource::Local {
                artifacts_dir: dir.clone(),
                build_number: self
                    .build_number
                    .clone()
                    .unwrap_or_else(|| "local".to_string()),
            }),
            (None, Some(definition)) if !definition.trim().is_empty() => {
                if self.artifact_names.is_empty() {
                    issues.push(ValidationIssue::new(
                        "artifact-names",
                        "at least one artifact name is required",
                    ));
                }
                Some(BuildSource::Service {
                    definition: definition.clone(),
                    build_number: self.build_number.clone(),
                    artifact_names: self.artifact_names.clone(),
                })
            }
            _ => {
                issues.push(ValidationIssue::new(
                    "build-definition",
                    "either build-definition or artifacts-dir is required",
                ));
                None
            }
        };

        let mut ignore = Vec::new();
        for pattern in &self.ignore_packages {
            match Pattern::new(pattern) {
                Ok(compiled) => ignore.push(compiled),
                Err(e) => issues.push(ValidationIssue::new(
                    "ignore-packages",
                    format!("invalid glob '{}': {}", pattern, e),
                )),
            }
        }

        if self.poll_interval_secs == 0 {
            issues.push(ValidationIssue::new("poll-interval-secs", "must be positive"));
        }
        if self.policy_timeout_secs == 0 {
            issues.push(ValidationIssue::new("policy-timeout-secs", "must be positive"));
        }
        if self.cherry_pick_timeout_secs == Some(0) {
            issues.push(ValidationIssue::new(
                "cherry-pick-timeout-secs",
                "must be positive; omit it to wait indefinitely",
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            issues.push(ValidationIssue::new("backoff-factor", "must be at least 1.0"));
        }
        if self.max_poll_interval_secs < self.poll_interval_secs {
            issues.push(ValidationIssue::new(
                "max-poll-interval-secs",
                "must not be lower than poll-interval-secs",
            ));
        }

        if self.existing_pr.is_some() && self.overwrite_pr && !self.cherry_pick.is_empty() {
            issues.push(ValidationIssue::new(
                "cherry-pick",
                "cannot be combined with overwrite-pr on an existing-pr",
            ));
        }
        if self.overwrite_pr && self.existing_pr.is_none() {
            issues.push(ValidationIssue::new(
                "overwrite-pr",
                "only applies together with existing-pr",
            ));
        }

        let service = self.validate_service(&mut issues);

        let Some(source) = source else {
            return Err(issues);
        };
        if !issues.is_empty() {
            return Err(issues);
        }

        let interval = Duration::from_secs(self.poll_interval_secs);
        let max_interval = Duration::from_secs(self.max_poll_interval_secs);
        let base = PollPolicy::fixed(interval).with_backoff(self.backoff_factor, max_interval);

        Ok(ValidatedOptions {
            insertion_name: self.insertion_name.clone(),
            component_name: self.component_name.clone(),
            component_branch: self.component_branch.clone(),
            target_branch: self.target_branch.clone(),
            source,
            store_paths: StorePaths {
                config_path: self.config_path.clone(),
                legacy_props_path: self
                    .legacy_props_path
                    .clone()
                    .filter(|p| !p.trim().is_empty()),
                components_paths: self.components_paths.clone(),
            },
            insert_packages: self.insert_packages,
            insert_components: self.insert_components,
            insert_toolset: self.insert_toolset,
            package_rules: PackageRules {
                toolset_package: self.toolset_package.clone(),
                ignore,
                primary: self.primary_packages.clone(),
                skip_version_validation: self.skip_version_validation,
            },
            publish: PublishOptions {
                branch_prefix: self.branch_prefix.clone(),
                title_prefix: self.title_prefix.clone(),
                title_suffix: self.title_suffix.clone(),
                reviewers: self.reviewers.clone(),
                existing_pr: self.existing_pr,
                overwrite_pr: self.overwrite_pr,
                draft: self.draft,
                auto_complete: self.auto_complete,
                retain_build: self.retain_build,
                cherry_pick: self.cherry_pick.clone(),
                validation_policies: self.validation_policies.clone(),
                validation_build_definition: self.validation_build_definition.clone(),
            },
            cherry_pick_polling: base
                .clone()
                .with_timeout(self.cherry_pick_timeout_secs.map(Duration::from_secs)),
            policy_polling: base
                .with_timeout(Some(Duration::from_secs(self.policy_timeout_secs))),
            service,
        })
    }

    fn validate_service(&self, issues: &mut Vec<ValidationIssue>) -> Option<ServiceTarget> {
        let url = self.service_url.as_deref()?;
        let url = match Url::parse(url) {
            Ok(url) => Some(url),
            Err(e) => {
                issues.push(ValidationIssue::new(
                    "service-url",
                    format!("'{}' is not a valid URL: {}", url, e),
                ));
                None
            }
        };

        let mut field = |name: &'static str, value: &Option<String>| {
            match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                Some(v) => Some(v.to_string()),
                None => {
                    issues.push(ValidationIssue::new(name, "is required with service-url"));
                    None
                }
            }
        };
        let project = field("project", &self.project);
        let repository = field("repository", &self.repository);

        Some(ServiceTarget {
            url: url?,
            project: project?,
            repository: repository?,
        })
    }
}

/// Parse options from YAML text.
pub fn parse(yaml_content: &str) -> Result<InsertionOptions> {
    serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: hint_for(&e.to_string()),
    })
}

/// Parse options from a file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<InsertionOptions> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse and validate in one step, folding issues into
/// [`Error::InvalidOptions`].
pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<ValidatedOptions> {
    from_file(path)?.validate().map_err(|issues| Error::InvalidOptions {
        issues: issues.iter().map(ToString::to_string).collect(),
    })
}

fn hint_for(message: &str) -> Option<String> {
    if message.contains("missing field") {
        Some(format!(
            "{} needs insertion-name, component-name, component-branch and target-branch",
            DEFAULT_OPTIONS_FILE
        ))
    } else if message.contains("unknown field") {
        Some("Option keys are kebab-case, e.g. 'target-branch'".to_string())
    } else {
        None
    }
}
