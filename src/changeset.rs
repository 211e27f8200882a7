//! # Changeset Builder
//!
//! Turns "original text vs. regenerated text" into the list of edits handed
//! to the version-control service:
//!
//! - nothing to compare (either side absent) means no change;
//! - texts that only differ in line breaks are the same file;
//! - real edits are emitted with `\n` line endings.
//!
//! [`build_change`] is pure, so store round trips can be tested for
//! idempotence without any service in the loop.

use std::fmt;

/// Kind of modification a [`GitChange`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Edit,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Edit => write!(f, "edit"),
        }
    }
}

/// One file modification, ready for the push API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitChange {
    /// Repository-relative, `/`-separated path.
    pub path: String,
    pub change_type: ChangeType,
    /// Full new content with `\n` line endings.
    pub new_content: String,
}

/// Compare `original` and `new` and produce an edit if they differ in more
/// than line endings.
pub fn build_change(path: &str, original: Option<&str>, new: Option<&str>) -> Option<GitChange> {
    let (original, new) = match (original, new) {
        (Some(original), Some(new)) => (original, new),
        _ => return None,
    };

    if strip_newlines(original).eq(strip_newlines(new)) {
        return None;
    }

    Some(GitChange {
        path: path.to_string(),
        change_type: ChangeType::Edit,
        new_content: normalize_line_endings(new),
    })
}

/// Convert `\r\n` and lone `\r` to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn strip_newlines(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().filter(|c| *c != '\r' && *c != '\n')
}
