//! Two-phase permission commits over a backend without transactions.
//!
//! Some backends (a plain object store, a remote directory) can only write
//! one object at a time. [`StagedStore`] gives them the same all-or-nothing
//! contract as [`SqliteStore`](crate::SqliteStore):
//!
//! 1. **Snapshot** every object the commit will touch.
//! 2. **Stage** the re-encrypted files, one write each.
//! 3. **Flip** the scope's access list.
//!
//! If any write fails, the snapshots are written back in reverse order and
//! the original error is returned.
//!
//! Readers share a lock with the writers, so a half-applied commit is never
//! visible through the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use passvault_core::{canonicalize, AccessControlList, EncryptedFile, KeyId, PublicKeyRecord};
use passvault_crypto::{parse_public_key, CryptoEngine};

use crate::error::{Result, StoreError};
use crate::layout::{decode_cbor, encode_cbor, Layout};
use crate::traits::{PassEntry, PassStore, PermUpdate};

/// Address of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKey {
    /// File contents at a path.
    File(String),
    /// CBOR access list of a scope.
    Scope(String),
    /// CBOR public key record.
    PublicKey(KeyId),
}

/// Which family of objects to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Scope,
    PublicKey,
}

impl ObjectKey {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectKey::File(_) => ObjectKind::File,
            ObjectKey::Scope(_) => ObjectKind::Scope,
            ObjectKey::PublicKey(_) => ObjectKind::PublicKey,
        }
    }
}

/// A backend that reads and writes single objects.
#[async_trait]
pub trait StagingBackend: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &ObjectKey, value: &[u8]) -> Result<()>;

    /// Removing an absent object is not an error.
    async fn remove(&self, key: &ObjectKey) -> Result<()>;

    async fn keys(&self, kind: ObjectKind) -> Result<Vec<ObjectKey>>;
}

/// [`PassStore`] over a [`StagingBackend`].
pub struct StagedStore<B> {
    backend: B,
    /// Readers share, mutations are exclusive.
    lock: RwLock<()>,
}

impl<B: StagingBackend> StagedStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            lock: RwLock::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn load_layout(&self) -> Result<Layout> {
        let mut layout = Layout::default();
        for key in self.backend.keys(ObjectKind::File).await? {
            if let ObjectKey::File(path) = key {
                layout.files.insert(path);
            }
        }
        for key in self.backend.keys(ObjectKind::Scope).await? {
            if let Some(bytes) = self.backend.get(&key).await? {
                if let ObjectKey::Scope(path) = key {
                    layout.scopes.insert(path, decode_cbor(&bytes)?);
                }
            }
        }
        Ok(layout)
    }

    /// Write `writes` in order, restoring `snapshot` on the first failure.
    async fn apply(
        &self,
        writes: &[(ObjectKey, Vec<u8>)],
        snapshot: &HashMap<ObjectKey, Option<Vec<u8>>>,
    ) -> Result<()> {
        let mut applied: Vec<&ObjectKey> = Vec::with_capacity(writes.len());

        for (key, value) in writes {
            if let Err(err) = self.backend.put(key, value).await {
                warn!(?key, error = %err, applied = applied.len(), "staged write failed, rolling back");
                self.rollback(&applied, snapshot).await;
                return Err(err);
            }
            applied.push(key);
        }
        Ok(())
    }

    async fn rollback(&self, applied: &[&ObjectKey], snapshot: &HashMap<ObjectKey, Option<Vec<u8>>>) {
        for key in applied.iter().rev() {
            let restored = match snapshot.get(*key) {
                Some(Some(previous)) => self.backend.put(key, previous).await,
                _ => self.backend.remove(key).await,
            };
            if let Err(err) = restored {
                warn!(?key, error = %err, "rollback write failed");
            }
        }
    }
}

#[async_trait]
impl<B: StagingBackend> PassStore for StagedStore<B> {
    async fn get_pass(&self, path: &str) -> Result<PassEntry> {
        let path = canonicalize(path);
        let _guard = self.lock.read().await;
        match self.backend.get(&ObjectKey::File(path.clone())).await? {
            Some(bytes) => {
                let recipients = CryptoEngine::new()
                    .recipients_of(&bytes)
                    .map_err(|e| StoreError::InvalidData(format!("{}: {}", path, e)))?;
                Ok(PassEntry::File(EncryptedFile {
                    path,
                    ciphertext: bytes,
                    recipients,
                }))
            }
            None => self.load_layout().await?.list(&path).map(PassEntry::Dir),
        }
    }

    async fn put_pass(&self, path: &str, contents: &[u8], _message: &str) -> Result<()> {
        let path = canonicalize(path);
        let _guard = self.lock.write().await;

        self.load_layout().await?.check_put(&path, contents)?;
        self.backend.put(&ObjectKey::File(path), contents).await
    }

    async fn delete_pass(&self, path: &str) -> Result<()> {
        let path = canonicalize(path);
        let _guard = self.lock.write().await;

        let key = ObjectKey::File(path.clone());
        if self.backend.get(&key).await?.is_none() {
            return Err(StoreError::NotFound(path));
        }
        self.backend.remove(&key).await?;

        let mut layout = self.load_layout().await?;
        for scope in layout.prune_scopes() {
            self.backend.remove(&ObjectKey::Scope(scope)).await?;
        }
        Ok(())
    }

    async fn get_perm(&self, path: &str) -> Result<AccessControlList> {
        let _guard = self.lock.read().await;
        self.load_layout().await?.acl(&canonicalize(path))
    }

    async fn commit_perm(&self, update: &PermUpdate) -> Result<()> {
        let _guard = self.lock.write().await;
        let scope = self.load_layout().await?.check_commit(update)?;

        let mut writes: Vec<(ObjectKey, Vec<u8>)> = update
            .files
            .iter()
            .map(|(path, bytes)| (ObjectKey::File(canonicalize(path)), bytes.clone()))
            .collect();
        // the access list flips last
        writes.push((ObjectKey::Scope(scope.clone()), encode_cbor(&update.access)?));

        let mut snapshot = HashMap::with_capacity(writes.len());
        for (key, _) in &writes {
            snapshot.insert(key.clone(), self.backend.get(key).await?);
        }

        self.apply(&writes, &snapshot).await?;
        debug!(scope = %scope, files = update.files.len(), "staged commit flipped");
        Ok(())
    }

    async fn get_public_keys(&self, ids: &[KeyId]) -> Result<HashMap<KeyId, PublicKeyRecord>> {
        let _guard = self.lock.read().await;
        let mut found = HashMap::new();
        for id in ids {
            if let Some(bytes) = self.backend.get(&ObjectKey::PublicKey(*id)).await? {
                found.insert(*id, decode_cbor(&bytes)?);
            }
        }
        Ok(found)
    }

    async fn list_public_keys(&self) -> Result<Vec<PublicKeyRecord>> {
        let _guard = self.lock.read().await;
        let mut keys = self.backend.keys(ObjectKind::PublicKey).await?;
        keys.sort();

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.backend.get(&key).await? {
                records.push(decode_cbor(&bytes)?);
            }
        }
        Ok(records)
    }

    async fn add_public_key(&self, record: &PublicKeyRecord) -> Result<()> {
        parse_public_key(record).map_err(|e| StoreError::Rejected(e.to_string()))?;
        let _guard = self.lock.write().await;
        self.backend
            .put(&ObjectKey::PublicKey(record.id), &encode_cbor(record)?)
            .await
    }
}

/// In-memory [`StagingBackend`] with write fault injection.
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<ObjectKey, Vec<u8>>>,
    /// Number of writes to let through before failing one, if armed.
    fail_after: Mutex<Option<usize>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the write that comes after `n` more successful ones. Fires once.
    pub fn fail_after_writes(&self, n: usize) {
        *self.fail_after.lock().unwrap_or_else(PoisonError::into_inner) = Some(n);
    }

    /// Copy of every stored object.
    pub fn objects(&self) -> BTreeMap<ObjectKey, Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_fault(&self) -> Result<()> {
        let mut armed = self.fail_after.lock().unwrap_or_else(PoisonError::into_inner);
        match *armed {
            Some(0) => {
                *armed = None;
                Err(StoreError::Rejected("injected write failure".into()))
            }
            Some(n) => {
                *armed = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StagingBackend for MemoryBackend {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &ObjectKey, value: &[u8]) -> Result<()> {
        self.check_fault()?;
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &ObjectKey) -> Result<()> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn keys(&self, kind: ObjectKind) -> Result<Vec<ObjectKey>> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|k| k.kind() == kind)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Notify;

    use passvault_core::ROOT;
    use passvault_crypto::{KdfParams, KeyPair};

    fn key() -> KeyPair {
        KeyPair::generate("pw", &KdfParams::insecure_fast(), None).unwrap()
    }

    fn sealed_for(keys: &[&KeyPair]) -> Vec<u8> {
        let engine = CryptoEngine::new();
        let records: Vec<_> = keys.iter().map(|k| k.public.clone()).collect();
        engine
            .serialize(&engine.encrypt_for(b"secret", &records).unwrap())
            .unwrap()
    }

    async fn seeded(owner: &KeyPair, files: &[&str]) -> StagedStore<MemoryBackend> {
        let store = StagedStore::new(MemoryBackend::new());
        store.add_public_key(&owner.public).await.unwrap();
        store
            .commit_perm(&PermUpdate {
                scope: ROOT.into(),
                access: vec![owner.public.id],
                files: BTreeMap::new(),
            })
            .await
            .unwrap();
        for path in files {
            store.put_pass(path, &sealed_for(&[owner]), "add").await.unwrap();
        }
        store
    }

    fn full_update(files: &[&str], keys: &[&KeyPair]) -> PermUpdate {
        PermUpdate {
            scope: ROOT.into(),
            access: keys.iter().map(|k| k.public.id).collect(),
            files: files
                .iter()
                .map(|p| (p.to_string(), sealed_for(keys)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_commit_applies_everything() {
        let owner = key();
        let friend = key();
        let files = ["/a.gpg", "/b.gpg", "/c.gpg"];
        let store = seeded(&owner, &files).await;

        store
            .commit_perm(&full_update(&files, &[&owner, &friend]))
            .await
            .unwrap();

        let acl = store.get_perm(ROOT).await.unwrap();
        assert_eq!(acl.access, vec![owner.public.id, friend.public.id]);
        for path in files {
            let entry = store.get_pass(path).await.unwrap();
            assert_eq!(entry.recipients(), &[owner.public.id, friend.public.id]);
        }
    }

    #[tokio::test]
    async fn test_failed_stage_restores_every_object() {
        let owner = key();
        let friend = key();
        let files = ["/a.gpg", "/b.gpg", "/c.gpg"];
        let store = seeded(&owner, &files).await;
        let before = store.backend().objects();

        // two files land, the third write fails
        store.backend().fail_after_writes(2);
        let err = store
            .commit_perm(&full_update(&files, &[&owner, &friend]))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(store.backend().objects(), before);
    }

    #[tokio::test]
    async fn test_failed_flip_restores_files() {
        let owner = key();
        let friend = key();
        let files = ["/a.gpg", "/b.gpg"];
        let store = seeded(&owner, &files).await;
        let before = store.backend().objects();

        // both files land, the access list flip fails
        store.backend().fail_after_writes(2);
        assert!(store
            .commit_perm(&full_update(&files, &[&owner, &friend]))
            .await
            .is_err());

        assert_eq!(store.backend().objects(), before);
        assert_eq!(store.get_perm(ROOT).await.unwrap().access, vec![owner.public.id]);
    }

    #[tokio::test]
    async fn test_new_scope_removed_on_rollback() {
        let owner = key();
        let friend = key();
        let store = seeded(&owner, &["/team/a.gpg"]).await;
        let before = store.backend().objects();

        store.backend().fail_after_writes(1);
        let update = PermUpdate {
            scope: "/team".into(),
            access: vec![owner.public.id, friend.public.id],
            files: [("/team/a.gpg".to_string(), sealed_for(&[&owner, &friend]))].into(),
        };
        assert!(store.commit_perm(&update).await.is_err());

        assert_eq!(store.backend().objects(), before);
        assert!(!before.contains_key(&ObjectKey::Scope("/team".into())));
    }

    /// Parks the write of one object until released.
    struct Gated {
        inner: MemoryBackend,
        gate: ObjectKey,
        armed: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    impl Gated {
        fn new(gate: ObjectKey) -> Self {
            Self {
                inner: MemoryBackend::new(),
                gate,
                armed: AtomicBool::new(false),
                parked: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl StagingBackend for Gated {
        async fn get(&self, key: &ObjectKey) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &ObjectKey, value: &[u8]) -> Result<()> {
            if *key == self.gate && self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &ObjectKey) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn keys(&self, kind: ObjectKind) -> Result<Vec<ObjectKey>> {
            self.inner.keys(kind).await
        }
    }

    #[tokio::test]
    async fn test_reader_waits_out_commit_in_flight() {
        let owner = key();
        let friend = key();
        let store = Arc::new(StagedStore::new(Gated::new(ObjectKey::Scope(ROOT.into()))));
        store.add_public_key(&owner.public).await.unwrap();
        store
            .commit_perm(&PermUpdate {
                scope: ROOT.into(),
                access: vec![owner.public.id],
                files: BTreeMap::new(),
            })
            .await
            .unwrap();
        store.put_pass("/a.gpg", &sealed_for(&[&owner]), "add").await.unwrap();

        store.backend().armed.store(true, Ordering::SeqCst);
        let writer = tokio::spawn({
            let store = Arc::clone(&store);
            let update = full_update(&["/a.gpg"], &[&owner, &friend]);
            async move { store.commit_perm(&update).await }
        });
        store.backend().parked.notified().await;

        // the file is staged, the access list has not flipped
        let reader = tokio::spawn({
            let store = Arc::clone(&store);
            async move {
                let file = store.get_pass("/a.gpg").await?;
                let acl = store.get_perm(ROOT).await?;
                Ok::<_, StoreError>((file.recipients().to_vec(), acl.access))
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        store.backend().release.notify_one();
        writer.await.unwrap().unwrap();

        let (recipients, access) = reader.await.unwrap().unwrap();
        assert_eq!(recipients, access);
        assert_eq!(access, vec![owner.public.id, friend.public.id]);
    }
}
