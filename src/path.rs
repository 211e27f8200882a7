//! Repository path utilities
//!
//! Paths inside the target repository are always handled as `/`-separated,
//! root-relative strings, because that is what the version-control service
//! reads and writes. Components files written on Windows may still use `\`
//! in their `Imports` lists, so everything passes through
//! [`normalize_repo_path`] first.

/// Normalize a repository path: `\` becomes `/`, leading separators and
/// `.` segments are dropped and `..` segments are folded.
///
/// A `..` that would climb above the repository root is discarded.
pub fn normalize_repo_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Resolve `relative` against the directory containing `base_file`.
pub fn resolve_relative(base_file: &str, relative: &str) -> String {
    let base = normalize_repo_path(base_file);
    let dir = match base.rfind('/') {
        Some(idx) => &base[..idx],
        None => "",
    };
    if dir.is_empty() {
        normalize_repo_path(relative)
    } else {
        normalize_repo_path(&format!("{}/{}", dir, relative))
    }
}

/// Make a value usable as a single git ref segment.
///
/// Characters git forbids in ref names (and `/`, which would nest the ref)
/// become `-`; whitespace becomes `_`.
pub fn sanitize_ref_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '[' | '^' | '~' => '-',
            c if c.is_whitespace() => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .replace("..", "-")
}
