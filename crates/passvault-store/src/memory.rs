//! In-memory implementation of the PassStore trait.
//!
//! This is the reference store for tests. It follows the same rules as
//! SQLite but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use passvault_core::{canonicalize, AccessControlList, EncryptedFile, KeyId, PublicKeyRecord};
use passvault_crypto::{parse_public_key, CryptoEngine};

use crate::error::{Result, StoreError};
use crate::layout::Layout;
use crate::traits::{Commit, PassEntry, PassStore, PermUpdate};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// lock is never held across an await.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// File paths and scopes.
    layout: Layout,

    /// File contents by path.
    contents: HashMap<String, Vec<u8>>,

    /// Registered public keys.
    keys: BTreeMap<KeyId, PublicKeyRecord>,

    /// Commit history, oldest first.
    commits: Vec<Commit>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit history, oldest first.
    pub fn commits(&self) -> Vec<Commit> {
        self.read().commits.clone()
    }

    /// Every stored file with its contents, ordered by path.
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.read()
            .contents
            .iter()
            .map(|(path, bytes)| (path.clone(), bytes.clone()))
            .collect()
    }

    /// Every scope with its access list, ordered by path.
    pub fn scopes(&self) -> BTreeMap<String, Vec<KeyId>> {
        self.read().layout.scopes.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PassStore for MemoryStore {
    async fn get_pass(&self, path: &str) -> Result<PassEntry> {
        let path = canonicalize(path);
        let inner = self.read();

        match inner.contents.get(&path) {
            Some(bytes) => {
                let recipients = CryptoEngine::new()
                    .recipients_of(bytes)
                    .map_err(|e| StoreError::InvalidData(format!("{}: {}", path, e)))?;
                Ok(PassEntry::File(EncryptedFile {
                    path,
                    ciphertext: bytes.clone(),
                    recipients,
                }))
            }
            None => inner.layout.list(&path).map(PassEntry::Dir),
        }
    }

    async fn put_pass(&self, path: &str, contents: &[u8], message: &str) -> Result<()> {
        let path = canonicalize(path);
        let mut inner = self.write();

        inner.layout.check_put(&path, contents)?;
        inner.layout.files.insert(path.clone());
        inner.contents.insert(path.clone(), contents.to_vec());
        inner.commits.push(Commit {
            message: message.to_string(),
            paths: vec![path],
        });
        Ok(())
    }

    async fn delete_pass(&self, path: &str) -> Result<()> {
        let path = canonicalize(path);
        let mut inner = self.write();

        if inner.contents.remove(&path).is_none() {
            return Err(StoreError::NotFound(path));
        }
        inner.layout.files.remove(&path);
        inner.layout.prune_scopes();
        inner.commits.push(Commit {
            message: format!("removed {}", path),
            paths: vec![path],
        });
        Ok(())
    }

    async fn get_perm(&self, path: &str) -> Result<AccessControlList> {
        self.read().layout.acl(&canonicalize(path))
    }

    async fn commit_perm(&self, update: &PermUpdate) -> Result<()> {
        let mut inner = self.write();

        let scope = inner.layout.check_commit(update)?;
        let mut paths = Vec::with_capacity(update.files.len());
        for (path, bytes) in &update.files {
            let path = canonicalize(path);
            inner.contents.insert(path.clone(), bytes.clone());
            paths.push(path);
        }
        inner.layout.scopes.insert(scope.clone(), update.access.clone());
        inner.commits.push(Commit {
            message: format!("updated access list of {}", scope),
            paths,
        });
        Ok(())
    }

    async fn get_public_keys(&self, ids: &[KeyId]) -> Result<HashMap<KeyId, PublicKeyRecord>> {
        let inner = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.keys.get(id).map(|record| (*id, record.clone())))
            .collect())
    }

    async fn list_public_keys(&self) -> Result<Vec<PublicKeyRecord>> {
        Ok(self.read().keys.values().cloned().collect())
    }

    async fn add_public_key(&self, record: &PublicKeyRecord) -> Result<()> {
        parse_public_key(record).map_err(|e| StoreError::Rejected(e.to_string()))?;
        self.write().keys.insert(record.id, record.clone());
        Ok(())
    }
}
