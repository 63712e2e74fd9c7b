//! A store reached through the HTTP wire encoding.
//!
//! [`WireStore`] plays both sides of the connection: every request is turned
//! into its resource path and JSON body, decoded again on the serving side,
//! answered by the inner store, and the answer travels back as JSON. Running
//! the engine over it checks that nothing depends on state the wire does not
//! carry.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::trace;

use passvault_core::{canonicalize, AccessControlList, KeyId, PublicKeyRecord};

use crate::error::Result;
use crate::traits::{PassEntry, PassStore, PermUpdate};
use crate::wire::{
    decode_resource_path, encode_resource_path, from_json, parse_public_key_query,
    public_key_query, public_keys_body, public_keys_from_body, to_json, PassBody, PermBody,
    PermCommitBody, PublicKeyBody, PutBody,
};

/// [`PassStore`] that serializes every call as it would go over HTTP.
pub struct WireStore<S> {
    inner: S,
}

impl<S: PassStore> WireStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Server side of a resource path.
    fn serve_path(&self, path: &str) -> Result<String> {
        let resource = encode_resource_path(path);
        trace!(%resource, "request");
        decode_resource_path(&resource)
    }
}

#[async_trait]
impl<S: PassStore> PassStore for WireStore<S> {
    async fn get_pass(&self, path: &str) -> Result<PassEntry> {
        let served = self.serve_path(path)?;
        let entry = self.inner.get_pass(&served).await?;
        let json = to_json(&PassBody::from(&entry))?;

        Ok(from_json::<PassBody>(&json)?.into_entry(&canonicalize(path)))
    }

    async fn put_pass(&self, path: &str, contents: &[u8], message: &str) -> Result<()> {
        let json = to_json(&PutBody {
            contents: contents.to_vec(),
            message: message.to_string(),
        })?;

        let served = self.serve_path(path)?;
        let body: PutBody = from_json(&json)?;
        self.inner.put_pass(&served, &body.contents, &body.message).await
    }

    async fn delete_pass(&self, path: &str) -> Result<()> {
        let served = self.serve_path(path)?;
        self.inner.delete_pass(&served).await
    }

    async fn get_perm(&self, path: &str) -> Result<AccessControlList> {
        let served = self.serve_path(path)?;
        let acl = self.inner.get_perm(&served).await?;
        let json = to_json(&PermBody::from(&acl))?;

        from_json::<PermBody>(&json)?.into_acl(&canonicalize(path))
    }

    async fn commit_perm(&self, update: &PermUpdate) -> Result<()> {
        let json = to_json(&PermCommitBody::from(update))?;

        let served = self.serve_path(&update.scope)?;
        let body: PermCommitBody = from_json(&json)?;
        self.inner.commit_perm(&body.into_update(&served)).await
    }

    async fn get_public_keys(&self, ids: &[KeyId]) -> Result<HashMap<KeyId, PublicKeyRecord>> {
        let query = public_key_query(ids);
        let found = self
            .inner
            .get_public_keys(&parse_public_key_query(&query)?)
            .await?;
        let json = to_json(&public_keys_body(&found))?;

        let body: BTreeMap<KeyId, PublicKeyBody> = from_json(&json)?;
        Ok(public_keys_from_body(body))
    }

    // Key listing and registration have no resource of their own.

    async fn list_public_keys(&self) -> Result<Vec<PublicKeyRecord>> {
        self.inner.list_public_keys().await
    }

    async fn add_public_key(&self, record: &PublicKeyRecord) -> Result<()> {
        self.inner.add_public_key(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::PassStoreExt;
    use passvault_core::{UserRef, ROOT};
    use passvault_crypto::{CryptoEngine, KdfParams, KeyPair};

    fn sealed_for(pair: &KeyPair) -> Vec<u8> {
        let engine = CryptoEngine::new();
        engine
            .serialize(&engine.encrypt_for(b"secret", &[pair.public.clone()]).unwrap())
            .unwrap()
    }

    async fn seeded(pair: &KeyPair) -> WireStore<MemoryStore> {
        let store = WireStore::new(MemoryStore::new());
        store.add_public_key(&pair.public).await.unwrap();
        store
            .commit_perm(&PermUpdate {
                scope: ROOT.into(),
                access: vec![pair.public.id],
                files: BTreeMap::new(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_paths_with_escapes_reach_the_same_file() {
        let pair = KeyPair::generate("pw", &KdfParams::insecure_fast(), None).unwrap();
        let store = seeded(&pair).await;

        store
            .put_pass("/my site/what?.gpg", &sealed_for(&pair), "add")
            .await
            .unwrap();

        let file = store.get_file("/my site/what?.gpg").await.unwrap();
        assert_eq!(file.recipients, vec![pair.public.id]);
        assert_eq!(store.inner().files().len(), 1);

        let dir = store.get_dir("/my site").await.unwrap();
        assert_eq!(dir.node.children[0].path, "/my site/what?.gpg");
    }

    #[tokio::test]
    async fn test_root_perm_and_commit_over_the_wire() {
        let pair = KeyPair::generate("pw", &KdfParams::insecure_fast(), None).unwrap();
        let store = seeded(&pair).await;
        store.put_pass("/a.gpg", &sealed_for(&pair), "add").await.unwrap();

        let acl = store.get_perm(ROOT).await.unwrap();
        assert_eq!(acl.path, ROOT);
        assert_eq!(acl.access, vec![pair.public.id]);
        assert_eq!(acl.change_set, vec!["/a.gpg".to_string()]);

        let stale = PermUpdate {
            scope: ROOT.into(),
            access: vec![pair.public.id],
            files: BTreeMap::new(),
        };
        assert!(store.commit_perm(&stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_key_lookup_drops_owner_and_unknown_ids() {
        let owner = UserRef {
            id: "u1".into(),
            name: "Ada".into(),
        };
        let pair = KeyPair::generate("pw", &KdfParams::insecure_fast(), Some(owner)).unwrap();
        let store = seeded(&pair).await;
        let unknown = KeyId::from_bytes([9; 8]);

        let found = store
            .get_public_keys(&[pair.public.id, unknown])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        let record = &found[&pair.public.id];
        assert_eq!(record.armored, pair.public.armored);
        assert_eq!(record.owner, None);
    }
}
