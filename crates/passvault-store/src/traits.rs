//! Store trait: the abstract interface to the remote secret store.
//!
//! One method per resource verb. The vault engine never talks to a store any
//! other way, so an HTTP client, the in-memory reference and the SQLite
//! store are interchangeable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use passvault_core::{AccessControlList, EncryptedFile, KeyId, PathNode, PublicKeyRecord};

use crate::error::{Result, StoreError};

/// A directory as returned by `GET /pass/{path}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// The directory and its immediate children.
    pub node: PathNode,
    /// Recipients of the directory's effective scope.
    pub recipients: Vec<KeyId>,
}

/// Result of `GET /pass/{path}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassEntry {
    File(EncryptedFile),
    Dir(DirEntry),
}

impl PassEntry {
    pub fn path(&self) -> &str {
        match self {
            PassEntry::File(file) => &file.path,
            PassEntry::Dir(dir) => &dir.node.path,
        }
    }

    /// Recipients of the file, or of the directory's scope.
    pub fn recipients(&self) -> &[KeyId] {
        match self {
            PassEntry::File(file) => &file.recipients,
            PassEntry::Dir(dir) => &dir.recipients,
        }
    }
}

/// Body of `POST /passPerm/{path}`: a new access list and the re-encrypted
/// change set, applied all or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermUpdate {
    /// Directory the access list is committed at.
    pub scope: String,
    /// New recipients.
    pub access: Vec<KeyId>,
    /// Re-encrypted file contents by path. Keys must equal the current change
    /// set of `scope`.
    pub files: BTreeMap<String, Vec<u8>>,
}

/// A commit recorded by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Commit message.
    pub message: String,
    /// Paths written or removed.
    pub paths: Vec<String>,
}

/// The store contract.
///
/// # Design Notes
///
/// - **Implicit directories**: a directory exists while it holds a file or
///   an access list. The root always exists.
/// - **Atomic permission commits**: [`commit_perm`](Self::commit_perm)
///   writes the access list and every file of the change set, or nothing.
/// - **Stale commits are refused**: if the change set moved since the client
///   read it, the commit fails with [`StoreError::Conflict`].
#[async_trait]
pub trait PassStore: Send + Sync {
    /// `GET /pass/{path}`.
    async fn get_pass(&self, path: &str) -> Result<PassEntry>;

    /// `PUT /pass/{path}`. `contents` must be a serialized message.
    async fn put_pass(&self, path: &str, contents: &[u8], message: &str) -> Result<()>;

    /// `DELETE /pass/{path}`. Directories left empty disappear.
    async fn delete_pass(&self, path: &str) -> Result<()>;

    /// `GET /passPerm/{path}`.
    async fn get_perm(&self, path: &str) -> Result<AccessControlList>;

    /// `POST /passPerm/{path}`.
    async fn commit_perm(&self, update: &PermUpdate) -> Result<()>;

    /// `GET /publicKey?ids=...`. Unknown ids are absent from the result.
    async fn get_public_keys(&self, ids: &[KeyId]) -> Result<HashMap<KeyId, PublicKeyRecord>>;

    /// Every registered public key, ordered by id.
    async fn list_public_keys(&self) -> Result<Vec<PublicKeyRecord>>;

    /// Register a public key. Re-registering the same id replaces it.
    async fn add_public_key(&self, record: &PublicKeyRecord) -> Result<()>;
}

#[async_trait]
impl<S: PassStore + ?Sized> PassStore for Arc<S> {
    async fn get_pass(&self, path: &str) -> Result<PassEntry> {
        (**self).get_pass(path).await
    }

    async fn put_pass(&self, path: &str, contents: &[u8], message: &str) -> Result<()> {
        (**self).put_pass(path, contents, message).await
    }

    async fn delete_pass(&self, path: &str) -> Result<()> {
        (**self).delete_pass(path).await
    }

    async fn get_perm(&self, path: &str) -> Result<AccessControlList> {
        (**self).get_perm(path).await
    }

    async fn commit_perm(&self, update: &PermUpdate) -> Result<()> {
        (**self).commit_perm(update).await
    }

    async fn get_public_keys(&self, ids: &[KeyId]) -> Result<HashMap<KeyId, PublicKeyRecord>> {
        (**self).get_public_keys(ids).await
    }

    async fn list_public_keys(&self) -> Result<Vec<PublicKeyRecord>> {
        (**self).list_public_keys().await
    }

    async fn add_public_key(&self, record: &PublicKeyRecord) -> Result<()> {
        (**self).add_public_key(record).await
    }
}

/// Extension trait for common store patterns.
pub trait PassStoreExt: PassStore {
    /// Fetch a path that must be a file.
    fn get_file(&self, path: &str) -> impl std::future::Future<Output = Result<EncryptedFile>> + Send;

    /// Fetch a path that must be a directory.
    fn get_dir(&self, path: &str) -> impl std::future::Future<Output = Result<DirEntry>> + Send;
}

impl<S: PassStore + ?Sized> PassStoreExt for S {
    async fn get_file(&self, path: &str) -> Result<EncryptedFile> {
        match self.get_pass(path).await? {
            PassEntry::File(file) => Ok(file),
            PassEntry::Dir(dir) => Err(StoreError::InvalidData(format!(
                "{} is a directory",
                dir.node.path
            ))),
        }
    }

    async fn get_dir(&self, path: &str) -> Result<DirEntry> {
        match self.get_pass(path).await? {
            PassEntry::Dir(dir) => Ok(dir),
            PassEntry::File(file) => Err(StoreError::InvalidData(format!(
                "{} is a file",
                file.path
            ))),
        }
    }
}
