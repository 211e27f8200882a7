//! # Output Configuration
//!
//! Controls how the CLI decorates what it prints: status markers, colored
//! state names and the summary of an insertion outcome.
//!
//! Color is decided once per process from the `--color` flag and the
//! environment:
//! - `--color=always|never` wins over everything else
//! - `NO_COLOR` (any value) or `CLICOLOR=0` disable color
//! - `CLICOLOR_FORCE=1` enables color even when stdout is not a terminal
//! - `TERM=dumb` disables color
//!
//! Without color, markers fall back to bracketed plain text such as `[OK]`
//! so that logs captured by a build agent stay readable.

use std::env;

use console::style;

use crate::phases::{InsertionOutcome, InsertionState};

/// Output configuration for the CLI.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emoji markers are used.
    pub use_color: bool,
}

impl OutputConfig {
    /// Build the configuration from the `--color` flag value (`always`,
    /// `never` or `auto`) and the environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        console::set_colors_enabled(use_color);
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// `emoji_str` when color is on, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// A final state name, green for success and red for failure.
pub fn state_label(config: &OutputConfig, state: InsertionState) -> String {
    let name = state.to_string();
    if !config.use_color {
        return name;
    }
    if state.is_success() {
        style(name).green().bold().to_string()
    } else if state == InsertionState::Failure {
        style(name).red().bold().to_string()
    } else {
        style(name).yellow().to_string()
    }
}

/// Human-readable lines describing an insertion outcome.
pub fn outcome_lines(config: &OutputConfig, outcome: &InsertionOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    let marker = if outcome.success {
        emoji(config, "✅", "[OK]")
    } else {
        emoji(config, "❌", "[ERR]")
    };
    lines.push(format!(
        "{} Insertion finished: {}",
        marker,
        state_label(config, outcome.final_state)
    ));

    if outcome.is_noop() {
        lines.push("   Target already up to date, no pull request created".to_string());
    } else if outcome.pull_request_id != 0 {
        match &outcome.pull_request_url {
            Some(url) => lines.push(format!(
                "   Pull request {}: {}",
                outcome.pull_request_id, url
            )),
            None => lines.push(format!("   Pull request {}", outcome.pull_request_id)),
        }
    }

    if !outcome.changes.is_empty() {
        lines.push(format!("   {} file(s) changed:", outcome.changes.len()));
        for change in &outcome.changes {
            lines.push(format!("     {} {}", change.change_type, change.path));
        }
    }

    for warning in &outcome.warnings {
        lines.push(format!("{} {}", emoji(config, "⚠️", "[WARN]"), warning));
    }
    if let Some(error) = &outcome.error {
        lines.push(format!("{} {}", emoji(config, "❌", "[ERR]"), error));
    }
    lines
}
