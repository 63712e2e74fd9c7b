//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use passvault::{PassphrasePrompt, Session, VaultConfig};
use passvault_core::{KeyId, PublicKeyRecord, UserRef, ROOT};
use passvault_crypto::{CryptoEngine, KdfParams, KeyPair, PrivateKeyHandle};
use passvault_store::{PassStore, PermUpdate};
use zeroize::Zeroizing;

/// A named user with a deterministic key.
///
/// The key is derived from the name, so `Identity::new("alice")` always has
/// the same key id. Its passphrase is `"<name> passphrase"`.
pub struct Identity {
    pub user: UserRef,
    pub passphrase: String,
    pub public: PublicKeyRecord,
    armored_private: String,
}

impl Identity {
    pub fn new(name: &str) -> Self {
        let seed = *blake3::hash(name.as_bytes()).as_bytes();
        let user = UserRef {
            id: name.to_lowercase(),
            name: name.to_string(),
        };
        let passphrase = format!("{} passphrase", name);
        let pair = KeyPair::from_seed(seed, &passphrase, &KdfParams::insecure_fast(), Some(user.clone()))
            .expect("fixture key generation");
        let armored_private = pair.private.to_armored().expect("fixture key armor");

        Self {
            user,
            passphrase,
            public: pair.public,
            armored_private,
        }
    }

    pub fn id(&self) -> KeyId {
        self.public.id
    }

    /// A fresh locked handle for this identity's private key.
    pub fn private_key(&self) -> PrivateKeyHandle {
        PrivateKeyHandle::from_armored(&self.armored_private).expect("fixture key parse")
    }

    /// A session holding this identity's locked key.
    pub fn session(&self) -> Session {
        let mut session = Session::for_user(self.user.clone());
        session.add_key(self.private_key());
        session
    }

    /// A prompt that answers with the right passphrase.
    pub fn prompt(&self) -> FixturePrompt {
        FixturePrompt::answering(&self.passphrase)
    }
}

/// Create identities for multi-party tests.
pub fn identities(names: &[&str]) -> Vec<Identity> {
    names.iter().map(|name| Identity::new(name)).collect()
}

/// A passphrase prompt that counts how often it is asked.
pub struct FixturePrompt {
    answer: Option<String>,
    calls: AtomicUsize,
}

impl FixturePrompt {
    pub fn answering(passphrase: &str) -> Self {
        Self {
            answer: Some(passphrase.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A prompt the user always dismisses.
    pub fn declining() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PassphrasePrompt for FixturePrompt {
    fn passphrase(&self, _id: &KeyId) -> Option<Zeroizing<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map(Zeroizing::new)
    }
}

/// Vault configuration with cheap key sealing.
pub fn fast_config() -> VaultConfig {
    VaultConfig {
        kdf: KdfParams::insecure_fast(),
        ..VaultConfig::default()
    }
}

/// Seed a store.
///
/// Registers every identity's public key, gives `owner` the root scope,
/// and writes each `(path, secret)` encrypted to `owner`.
pub async fn seed_store<S: PassStore + ?Sized>(
    store: &S,
    owner: &Identity,
    others: &[&Identity],
    files: &[(&str, &str)],
) {
    store.add_public_key(&owner.public).await.expect("register owner");
    for other in others {
        store.add_public_key(&other.public).await.expect("register identity");
    }

    store
        .commit_perm(&PermUpdate {
            scope: ROOT.to_string(),
            access: vec![owner.id()],
            files: BTreeMap::new(),
        })
        .await
        .expect("root access list");

    let engine = CryptoEngine::new();
    for (path, secret) in files {
        let message = engine
            .encrypt_for(secret.as_bytes(), std::slice::from_ref(&owner.public))
            .expect("encrypt fixture");
        let bytes = engine.serialize(&message).expect("serialize fixture");
        store.put_pass(path, &bytes, "seed").await.expect("write fixture");
    }
}
