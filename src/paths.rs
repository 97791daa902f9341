//! Path normalization shared by every volume entry point.
//!
//! Paths handed to a storage client are slash separated, relative to the
//! store root and never contain `.`, `..` or empty segments. The root itself
//! is the empty string.

use crate::error::PathError;
use regex::Regex;
use std::sync::OnceLock;

fn funky_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\p{C}").expect("static regex"))
}

/// Canonicalizes `path`, collapsing `.` and `..` segments.
///
/// Fails when the path contains unprintable characters or when a `..` would
/// climb above the root.
pub fn normalize(path: &str) -> Result<String, PathError> {
    let path = path.replace('\\', "/");

    if funky_chars().is_match(&path) {
        return Err(PathError::Corrupted(path));
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(PathError::OutsideRoot(path.clone()));
                }
            }
            _ => parts.push(part),
        }
    }

    Ok(parts.join("/"))
}

/// Parent of a normalized path. Top-level entries and the root map to `""`.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn join(dir: &str, name: &str) -> Result<String, PathError> {
    normalize(&format!("{}/{}", dir, name))
}

/// True when `path` is `parent` or lies below it.
pub fn is_within(path: &str, parent: &str) -> bool {
    parent.is_empty()
        || path == parent
        || (path.starts_with(parent) && path[parent.len()..].starts_with('/'))
}
