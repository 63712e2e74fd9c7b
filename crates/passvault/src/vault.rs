//! The Vault: the operations a client performs against a store.
//!
//! Every operation takes the caller's [`Session`] explicitly. Operations
//! that may unlock a key or change the permission key take it `&mut`.

use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use passvault_core::{
    canonicalize, parent, KeyId, PathNode, PathSegment, PublicKeyRecord, UserRef, ROOT,
};
use passvault_crypto::{CryptoEngine, KeyPair};
use passvault_store::{PassEntry, PassStore, PassStoreExt};

use crate::acl::{AccessListEditor, AclDelta};
use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::reencrypt::{resolve_keys, ReencryptOutcome, ReencryptionCoordinator};
use crate::session::Session;
use crate::unlock::{PassphrasePrompt, PermissionKeyUnlocker};

/// What [`Vault::browse`] shows for one path.
#[derive(Debug, Clone)]
pub struct PathView {
    pub breadcrumbs: Vec<PathSegment>,
    pub entry: PassEntry,
    /// Recipients of the file, or of the directory's scope.
    pub recipients: Vec<KeyId>,
    /// First recipient the session holds a private key for.
    pub permission_key: Option<KeyId>,
}

impl PathView {
    pub fn is_dir(&self) -> bool {
        matches!(self.entry, PassEntry::Dir(_))
    }

    /// Subdirectories, when viewing a directory.
    pub fn dirs(&self) -> Vec<&PathNode> {
        self.children().filter(|c| c.is_dir()).collect()
    }

    /// Files, when viewing a directory.
    pub fn files(&self) -> Vec<&PathNode> {
        self.children().filter(|c| !c.is_dir()).collect()
    }

    fn children(&self) -> impl Iterator<Item = &PathNode> {
        let children: &[PathNode] = match &self.entry {
            PassEntry::Dir(dir) => &dir.node.children,
            PassEntry::File(_) => &[],
        };
        children.iter()
    }
}

/// Result of a permission edit.
#[derive(Debug, Clone)]
pub struct PermissionChange {
    pub delta: AclDelta,
    /// `None` when the edit was a no-op and nothing was written.
    pub outcome: Option<ReencryptOutcome>,
}

/// A registered public key as offered in a recipient picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOption {
    pub id: KeyId,
    pub label: String,
}

/// The client facade.
pub struct Vault<S> {
    store: S,
    engine: CryptoEngine,
    editor: AccessListEditor,
    config: VaultConfig,
}

impl<S: PassStore> Vault<S> {
    /// Create a vault with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, VaultConfig::default())
    }

    pub fn with_config(store: S, config: VaultConfig) -> Self {
        Self {
            store,
            engine: CryptoEngine::new(),
            editor: AccessListEditor::new(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Navigate to `raw` and fetch what is there.
    ///
    /// The session only moves once the fetch succeeds.
    #[instrument(skip(self, session))]
    pub async fn browse(&self, session: &mut Session, raw: &str) -> Result<PathView> {
        let path = canonicalize(raw);
        let entry = self.store.get_pass(&path).await?;

        let breadcrumbs = session.set_location(&path).to_vec();
        let recipients = entry.recipients().to_vec();
        let permission_key = session.select_permission_key(&recipients);

        Ok(PathView {
            breadcrumbs,
            entry,
            recipients,
            permission_key,
        })
    }

    /// Encrypt `secret` to `recipients` and store it as `dir/name.gpg`.
    ///
    /// With no `recipients` the file is encrypted to the access list that
    /// governs `dir`. Explicit recipients are used as given; if they leave
    /// out a recipient of that access list, re-encrypting the scope later
    /// fails for whoever cannot open this file.
    ///
    /// Returns the new file's path.
    #[instrument(skip(self, secret, recipients))]
    pub async fn add_file(
        &self,
        dir: &str,
        name: &str,
        secret: &[u8],
        recipients: &[KeyId],
    ) -> Result<String> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(VaultError::Validation(format!("invalid file name {:?}", name)));
        }

        let path = self.config.file_path(dir, name);
        let records = if recipients.is_empty() {
            let access = self.inherited_access(dir).await?;
            resolve_keys(&self.store, &access).await?
        } else {
            resolve_keys(&self.store, recipients).await?
        };
        let contents = self.seal(secret, &records)?;
        self.store
            .put_pass(&path, &contents, &self.config.add_file_message)
            .await?;

        info!(path = %path, recipients = records.len(), "file added");
        Ok(path)
    }

    /// Replace the secret at `path`, encrypted to its directory's recipients.
    #[instrument(skip(self, secret))]
    pub async fn edit_file(&self, path: &str, secret: &[u8]) -> Result<()> {
        if secret.is_empty() {
            return Err(VaultError::Validation("secret cannot be empty".into()));
        }

        let acl = self.store.get_perm(&parent(path)).await?;
        let records = resolve_keys(&self.store, &acl.access).await?;
        let contents = self.seal(secret, &records)?;
        self.store
            .put_pass(path, &contents, &self.config.edit_message(path))
            .await?;

        info!(path, "file edited");
        Ok(())
    }

    /// Decrypt the file at `path` with the session's permission key.
    #[instrument(skip(self, session, prompt))]
    pub async fn decrypt_file(
        &self,
        session: &mut Session,
        path: &str,
        prompt: &dyn PassphrasePrompt,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let file = self.store.get_file(path).await?;
        let key_id = session
            .held_key(&file.recipients)
            .ok_or_else(|| VaultError::NotAuthorized(file.path.clone()))?;
        let handle = session
            .key_mut(&key_id)
            .ok_or_else(|| VaultError::NotAuthorized(file.path.clone()))?;
        let key = PermissionKeyUnlocker::new(prompt).ensure_unlocked(handle)?;

        let message = self
            .engine
            .deserialize(&file.ciphertext)
            .map_err(VaultError::Decryption)?;
        let plaintext = Zeroizing::new(
            self.engine
                .decrypt_with(&message, key.handle())
                .map_err(VaultError::Decryption)?,
        );

        session.select_permission_key(&file.recipients);
        Ok(plaintext)
    }

    /// Delete the file at `path`.
    ///
    /// Directories left empty disappear with it, so this returns the nearest
    /// ancestor that still exists and moves the session there.
    #[instrument(skip(self, session))]
    pub async fn delete_file(&self, session: &mut Session, path: &str) -> Result<String> {
        self.store.delete_pass(path).await?;

        let mut dir = parent(path);
        loop {
            match self.store.get_pass(&dir).await {
                Ok(_) => break,
                Err(e) if e.is_not_found() && dir != ROOT => {
                    debug!(dir = %dir, "directory removed with its last file");
                    dir = parent(&dir);
                }
                Err(e) => return Err(e.into()),
            }
        }

        session.set_location(&dir);
        info!(path, landing = %dir, "file deleted");
        Ok(dir)
    }

    /// Add `id` to the recipients of `dir` and re-encrypt its files.
    ///
    /// Adding a present recipient writes nothing.
    #[instrument(skip(self, session, prompt))]
    pub async fn add_permission(
        &self,
        session: &mut Session,
        dir: &str,
        id: KeyId,
        prompt: &dyn PassphrasePrompt,
    ) -> Result<PermissionChange> {
        let acl = self.store.get_perm(dir).await?;
        let delta = self.editor.add_recipient(&acl, id);
        if delta.is_noop() {
            debug!(scope = %delta.scope, key = %id, "already a recipient");
            return Ok(PermissionChange {
                delta,
                outcome: None,
            });
        }
        self.apply(session, delta, prompt).await
    }

    /// Remove `id` from the recipients of `dir` and re-encrypt its files.
    #[instrument(skip(self, session, prompt))]
    pub async fn remove_permission(
        &self,
        session: &mut Session,
        dir: &str,
        id: KeyId,
        prompt: &dyn PassphrasePrompt,
    ) -> Result<PermissionChange> {
        let acl = self.store.get_perm(dir).await?;
        let delta = self.editor.remove_recipient(&acl, id)?;
        self.apply(session, delta, prompt).await
    }

    async fn apply(
        &self,
        session: &mut Session,
        delta: AclDelta,
        prompt: &dyn PassphrasePrompt,
    ) -> Result<PermissionChange> {
        let key_id = session
            .held_key(&delta.previous)
            .ok_or_else(|| VaultError::NotAuthorized(delta.scope.clone()))?;
        let handle = session
            .key_mut(&key_id)
            .ok_or_else(|| VaultError::NotAuthorized(delta.scope.clone()))?;
        let key = PermissionKeyUnlocker::new(prompt).ensure_unlocked(handle)?;
        self.editor.authorize(&delta, &key)?;

        let outcome = ReencryptionCoordinator::new(&self.store)
            .with_refresh(self.config.refresh_after_commit)
            .reencrypt(&delta.scope, &delta.access, &key, &delta.change_set)
            .await?;

        Ok(PermissionChange {
            delta,
            outcome: Some(outcome),
        })
    }

    /// Every registered public key, labelled for display.
    pub async fn available_public_keys(&self) -> Result<Vec<KeyOption>> {
        let records = self.store.list_public_keys().await?;
        Ok(records
            .iter()
            .map(|record| KeyOption {
                id: record.id,
                label: record.label(),
            })
            .collect())
    }

    /// Generate a key, register its public half and add the private half
    /// to the session.
    #[instrument(skip(self, session, passphrase))]
    pub async fn create_key(
        &self,
        session: &mut Session,
        passphrase: &str,
        owner: Option<UserRef>,
    ) -> Result<PublicKeyRecord> {
        let pair =
            KeyPair::generate(passphrase, &self.config.kdf, owner).map_err(VaultError::Encryption)?;
        self.store.add_public_key(&pair.public).await?;

        info!(key = %pair.public.id, "key registered");
        session.add_key(pair.private);
        Ok(pair.public)
    }

    /// Access list of the nearest existing directory at or above `dir`.
    async fn inherited_access(&self, dir: &str) -> Result<Vec<KeyId>> {
        let mut dir = canonicalize(dir);
        loop {
            match self.store.get_perm(&dir).await {
                Ok(acl) => return Ok(acl.access),
                Err(e) if e.is_not_found() && dir != ROOT => dir = parent(&dir),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn seal(&self, secret: &[u8], records: &[PublicKeyRecord]) -> Result<Vec<u8>> {
        let message = self
            .engine
            .encrypt_for(secret, records)
            .map_err(VaultError::Encryption)?;
        self.engine.serialize(&message).map_err(VaultError::Encryption)
    }
}
