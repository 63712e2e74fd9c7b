//! Tree rules shared by the store implementations.
//!
//! Both [`MemoryStore`](crate::MemoryStore) and
//! [`SqliteStore`](crate::SqliteStore) load the file paths and scopes they
//! need into a [`Layout`] and let it answer listing and validation
//! questions, so the two backends cannot drift apart.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use passvault_core::{
    canonicalize, change_set, effective_scope, file_name, is_within, join, parent, AccessControlList,
    KeyId, PathNode, FILE_SUFFIX, ROOT,
};
use passvault_crypto::CryptoEngine;

use crate::error::{Result, StoreError};
use crate::traits::{DirEntry, PermUpdate};

/// File paths and scopes of a store at one point in time.
#[derive(Debug, Clone, Default)]
pub(crate) struct Layout {
    pub files: BTreeSet<String>,
    pub scopes: BTreeMap<String, Vec<KeyId>>,
}

impl Layout {
    fn scope_paths(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Stored files that hold secrets. Other files are never re-encrypted.
    fn secret_files(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(String::as_str)
            .filter(|f| f.ends_with(FILE_SUFFIX))
    }

    /// Whether `path` names a directory.
    pub fn is_dir(&self, path: &str) -> bool {
        path == ROOT
            || self.scopes.contains_key(path)
            || self
                .files
                .iter()
                .any(|f| f != path && is_within(f, path))
    }

    /// Recipients of the effective scope at `dir`.
    pub fn access_at(&self, dir: &str) -> Vec<KeyId> {
        let scope = effective_scope(self.scope_paths(), dir);
        self.scopes.get(&scope).cloned().unwrap_or_default()
    }

    /// Immediate children of `dir`: `.gpg` files and subdirectories.
    pub fn list(&self, dir: &str) -> Result<DirEntry> {
        if !self.is_dir(dir) {
            return Err(StoreError::NotFound(dir.to_string()));
        }

        let mut dirs = BTreeSet::new();
        let mut files = BTreeSet::new();
        for file in self.files.iter().filter(|f| f.as_str() != dir && is_within(f, dir)) {
            let rest = if dir == ROOT { &file[1..] } else { &file[dir.len() + 1..] };
            match rest.split_once('/') {
                Some((child, _)) => {
                    dirs.insert(join(dir, child));
                }
                None if rest.ends_with(FILE_SUFFIX) => {
                    files.insert(file.clone());
                }
                None => {}
            }
        }

        let children = dirs
            .into_iter()
            .map(|d| PathNode::dir(d, Vec::new()))
            .chain(files.into_iter().map(PathNode::file))
            .collect();

        Ok(DirEntry {
            node: PathNode::dir(dir, children),
            recipients: self.access_at(dir),
        })
    }

    /// The access list a permission query at `dir` returns.
    pub fn acl(&self, dir: &str) -> Result<AccessControlList> {
        if !self.is_dir(dir) {
            return Err(StoreError::NotFound(dir.to_string()));
        }
        let changes = change_set(self.scope_paths(), self.secret_files(), dir);
        AccessControlList::new(dir, self.access_at(dir), changes)
            .map_err(|e| StoreError::InvalidData(e.to_string()))
    }

    /// Check a write of a single file.
    pub fn check_put(&self, path: &str, contents: &[u8]) -> Result<()> {
        if path == ROOT || file_name(path).is_empty() {
            return Err(StoreError::Rejected("cannot write the root".into()));
        }
        if self.is_dir(path) {
            return Err(StoreError::conflict(path, "a directory exists at this path"));
        }

        let mut ancestor = parent(path);
        while ancestor != ROOT {
            if self.files.contains(&ancestor) {
                return Err(StoreError::conflict(path, format!("{} is a file", ancestor)));
            }
            ancestor = parent(&ancestor);
        }

        CryptoEngine::new()
            .recipients_of(contents)
            .map_err(|e| StoreError::Rejected(format!("contents are not a message: {}", e)))?;
        Ok(())
    }

    /// Check a permission commit against the current state.
    ///
    /// Returns the canonical scope path on success.
    pub fn check_commit(&self, update: &PermUpdate) -> Result<String> {
        let scope = canonicalize(&update.scope);
        if !self.is_dir(&scope) {
            return Err(StoreError::NotFound(scope));
        }

        let unique: HashSet<&KeyId> = update.access.iter().collect();
        if unique.len() != update.access.len() {
            return Err(StoreError::Rejected("duplicate recipient".into()));
        }
        if update.access.is_empty() && scope == ROOT {
            return Err(StoreError::Rejected("root access list cannot be empty".into()));
        }
        if update.access.is_empty() && !update.files.is_empty() {
            return Err(StoreError::Rejected(
                "files cannot be encrypted to an empty access list".into(),
            ));
        }

        let expected: BTreeSet<String> =
            change_set(self.scope_paths(), self.secret_files(), &scope)
                .into_iter()
                .collect();
        let submitted: BTreeSet<String> = update.files.keys().map(|p| canonicalize(p)).collect();
        if expected != submitted {
            return Err(StoreError::conflict(
                &scope,
                format!(
                    "change set moved: expected {} files, got {}",
                    expected.len(),
                    submitted.len()
                ),
            ));
        }

        let wanted: HashSet<KeyId> = update.access.iter().copied().collect();
        let engine = CryptoEngine::new();
        for (path, contents) in &update.files {
            let recipients: HashSet<KeyId> = engine
                .recipients_of(contents)
                .map_err(|e| StoreError::Rejected(format!("{} is not a message: {}", path, e)))?
                .into_iter()
                .collect();
            if recipients != wanted {
                return Err(StoreError::Rejected(format!(
                    "{} is not encrypted to the new access list",
                    path
                )));
            }
        }

        Ok(scope)
    }

    /// Drop scopes whose directory no longer exists.
    ///
    /// Returns the removed scope paths.
    pub fn prune_scopes(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .scopes
            .keys()
            .filter(|s| s.as_str() != ROOT && !self.files.iter().any(|f| is_within(f, s)))
            .cloned()
            .collect();
        for scope in &stale {
            self.scopes.remove(scope);
        }
        stale
    }
}

pub(crate) fn encode_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::InvalidData(e.to_string()))
}
