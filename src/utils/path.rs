//! Helpers for absolute, `/`-separated node paths.

use crate::TreeError;

pub const SEPARATOR: char = '/';

/// Checks that `path` is absolute, has no empty segments and no trailing
/// separator (the root `/` itself is valid).
pub fn validate_path(path: &str) -> std::result::Result<(), TreeError> {
    if !path.starts_with(SEPARATOR) {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    if path.len() == 1 {
        return Ok(());
    }
    if path[1..].split(SEPARATOR).any(|seg| seg.is_empty()) {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Joins a child name under `parent`.
pub fn join(
    parent: &str,
    child: &str,
) -> String {
    if parent.ends_with(SEPARATOR) {
        format!("{parent}{child}")
    } else {
        format!("{parent}{SEPARATOR}{child}")
    }
}

/// Last segment of `path`; empty for the root.
pub fn short_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or_default()
}

/// Every prefix of `path` from the top, ending with `path` itself.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`; the root yields nothing.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut current = String::new();
    let mut out = Vec::new();
    for seg in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        current.push(SEPARATOR);
        current.push_str(seg);
        out.push(current.clone());
    }
    out
}
