//! Scope arithmetic.
//!
//! A scope is a directory with its own access list. The root is always a
//! scope. A directory's effective scope is the deepest scope at or above it;
//! a file's scope is the effective scope of its parent directory.

use crate::path::{canonicalize, is_within, parent, ROOT};

/// Deepest scope at or above `dir`.
pub fn effective_scope<'a, I>(scopes: I, dir: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let dir = canonicalize(dir);
    let mut best = ROOT.to_string();
    for scope in scopes {
        let scope = canonicalize(scope);
        if is_within(&dir, &scope) && scope.len() > best.len() {
            best = scope;
        }
    }
    best
}

/// Scope governing the file at `file`.
pub fn file_scope<'a, I>(scopes: I, file: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    effective_scope(scopes, &parent(file))
}

/// Files beneath `dir` that share `dir`'s effective scope.
///
/// This is the set that must be re-encrypted when an access list is
/// committed at `dir`. Files inside deeper scopes are excluded. Order
/// follows `files`.
pub fn change_set<'a, S, F>(scopes: S, files: F, dir: &str) -> Vec<String>
where
    S: IntoIterator<Item = &'a str>,
    F: IntoIterator<Item = &'a str>,
{
    let scopes: Vec<&str> = scopes.into_iter().collect();
    let dir = canonicalize(dir);
    let target = effective_scope(scopes.iter().copied(), &dir);

    files
        .into_iter()
        .filter(|f| is_within(f, &dir))
        .filter(|f| file_scope(scopes.iter().copied(), f) == target)
        .map(canonicalize)
        .collect()
}
