//! Path resolution.
//!
//! Paths in the store are single-slash separated and rooted at `/`. Raw
//! input from callers is tolerant: repeated separators collapse, a trailing
//! separator is dropped, and empty input means the root.

use serde::{Deserialize, Serialize};

/// The root path.
pub const ROOT: &str = "/";

/// Display name of the root breadcrumb.
const ROOT_NAME: &str = "root";

/// Suffix carried by stored secret files.
pub const FILE_SUFFIX: &str = ".gpg";

/// One breadcrumb of a resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    /// Component name (`root` for the root segment).
    pub name: String,
    /// Cumulative canonical path up to and including this component.
    pub path: String,
}

/// Resolve a raw path into ordered breadcrumb segments.
///
/// The first segment is always the root. `resolve("a//b/")` yields
/// `/`, `/a`, `/a/b`.
pub fn resolve(raw: &str) -> Vec<PathSegment> {
    let mut segments = vec![PathSegment {
        name: ROOT_NAME.to_string(),
        path: ROOT.to_string(),
    }];

    let mut cumulative = String::new();
    for component in components(raw) {
        cumulative.push('/');
        cumulative.push_str(component);
        segments.push(PathSegment {
            name: component.to_string(),
            path: cumulative.clone(),
        });
    }

    segments
}

/// Canonical form of a raw path.
pub fn canonicalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    for component in components(raw) {
        out.push('/');
        out.push_str(component);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Join a directory and a relative name, canonicalizing the result.
pub fn join(dir: &str, name: &str) -> String {
    canonicalize(&format!("{}/{}", dir, name))
}

/// Parent directory. The root is its own parent.
pub fn parent(path: &str) -> String {
    let canonical = canonicalize(path);
    match canonical.rfind('/') {
        Some(0) | None => ROOT.to_string(),
        Some(idx) => canonical[..idx].to_string(),
    }
}

/// Last component of a path, empty for the root.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Name shown for a file: its base name without the `.gpg` suffix.
pub fn display_name(path: &str) -> &str {
    let name = file_name(path);
    name.strip_suffix(FILE_SUFFIX).unwrap_or(name)
}

/// Whether `path` is `dir` itself or lies beneath it.
pub fn is_within(path: &str, dir: &str) -> bool {
    let path = canonicalize(path);
    let dir = canonicalize(dir);
    if dir == ROOT {
        return true;
    }
    path == dir || path.strip_prefix(&dir).is_some_and(|rest| rest.starts_with('/'))
}

fn components(raw: &str) -> impl Iterator<Item = &str> {
    raw.split('/').filter(|c| !c.is_empty())
}
