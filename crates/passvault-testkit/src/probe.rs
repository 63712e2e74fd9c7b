//! A store wrapper that counts calls and injects failures.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use passvault_core::{canonicalize, AccessControlList, KeyId, PublicKeyRecord};
use passvault_crypto::Message;
use passvault_store::{PassEntry, PassStore, PermUpdate, Result, StoreError};

/// Calls made through a [`ProbeStore`], per verb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_pass: usize,
    pub put_pass: usize,
    pub delete_pass: usize,
    pub get_perm: usize,
    pub commit_perm: usize,
    pub get_public_keys: usize,
    pub list_public_keys: usize,
    pub add_public_key: usize,
}

impl CallCounts {
    /// Calls that can change the store.
    pub fn writes(&self) -> usize {
        self.put_pass + self.delete_pass + self.commit_perm + self.add_public_key
    }
}

#[derive(Default)]
struct Faults {
    fail_fetch: HashSet<String>,
    corrupt_fetch: HashSet<String>,
    fail_commit: bool,
}

/// Wraps a store, counting every call and failing on request.
pub struct ProbeStore<S> {
    inner: S,
    counts: Mutex<CallCounts>,
    faults: Mutex<Faults>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: PassStore> ProbeStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counts: Mutex::new(CallCounts::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn counts(&self) -> CallCounts {
        lock(&self.counts).clone()
    }

    pub fn reset_counts(&self) {
        *lock(&self.counts) = CallCounts::default();
    }

    /// Make `GET` of `path` fail.
    pub fn fail_fetch(&self, path: &str) {
        lock(&self.faults).fail_fetch.insert(canonicalize(path));
    }

    /// Make `GET` of `path` return a ciphertext whose body was tampered with.
    pub fn corrupt_fetch(&self, path: &str) {
        lock(&self.faults).corrupt_fetch.insert(canonicalize(path));
    }

    /// Make every permission commit fail.
    pub fn fail_commit(&self) {
        lock(&self.faults).fail_commit = true;
    }

    /// Remove every injected failure.
    pub fn heal(&self) {
        *lock(&self.faults) = Faults::default();
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts)) {
        bump(&mut lock(&self.counts));
    }
}

fn tamper(ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut message =
        Message::from_bytes(ciphertext).map_err(|e| StoreError::InvalidData(e.to_string()))?;
    if let Some(byte) = message.ciphertext.first_mut() {
        *byte ^= 0x01;
    }
    message
        .to_bytes()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl<S: PassStore> PassStore for ProbeStore<S> {
    async fn get_pass(&self, path: &str) -> Result<PassEntry> {
        self.count(|c| c.get_pass += 1);
        let canonical = canonicalize(path);
        let (fail, corrupt) = {
            let faults = lock(&self.faults);
            (
                faults.fail_fetch.contains(&canonical),
                faults.corrupt_fetch.contains(&canonical),
            )
        };
        if fail {
            return Err(StoreError::Rejected(format!("injected failure fetching {}", canonical)));
        }

        let mut entry = self.inner.get_pass(path).await?;
        if corrupt {
            if let PassEntry::File(file) = &mut entry {
                file.ciphertext = tamper(&file.ciphertext)?;
            }
        }
        Ok(entry)
    }

    async fn put_pass(&self, path: &str, contents: &[u8], message: &str) -> Result<()> {
        self.count(|c| c.put_pass += 1);
        self.inner.put_pass(path, contents, message).await
    }

    async fn delete_pass(&self, path: &str) -> Result<()> {
        self.count(|c| c.delete_pass += 1);
        self.inner.delete_pass(path).await
    }

    async fn get_perm(&self, path: &str) -> Result<AccessControlList> {
        self.count(|c| c.get_perm += 1);
        self.inner.get_perm(path).await
    }

    async fn commit_perm(&self, update: &PermUpdate) -> Result<()> {
        self.count(|c| c.commit_perm += 1);
        let fail = lock(&self.faults).fail_commit;
        if fail {
            return Err(StoreError::Rejected("injected commit failure".into()));
        }
        self.inner.commit_perm(update).await
    }

    async fn get_public_keys(&self, ids: &[KeyId]) -> Result<HashMap<KeyId, PublicKeyRecord>> {
        self.count(|c| c.get_public_keys += 1);
        self.inner.get_public_keys(ids).await
    }

    async fn list_public_keys(&self) -> Result<Vec<PublicKeyRecord>> {
        self.count(|c| c.list_public_keys += 1);
        self.inner.list_public_keys().await
    }

    async fn add_public_key(&self, record: &PublicKeyRecord) -> Result<()> {
        self.count(|c| c.add_public_key += 1);
        self.inner.add_public_key(record).await
    }
}
