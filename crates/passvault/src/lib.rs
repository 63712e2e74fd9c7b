//! # passvault
//!
//! Client engine for an encrypted, hierarchical secret store.
//!
//! ## Overview
//!
//! Files are stored as ciphertext under a directory tree. Each directory
//! subtree is governed by an access list of recipient keys, and every file
//! in the subtree is encrypted to exactly those recipients. This crate keeps
//! the two consistent:
//!
//! - **Sessions**: the user's private keys and current location
//! - **Unlocking**: a private key is unlocked once, on first use
//! - **Access lists**: adding or removing a recipient yields an [`AclDelta`]
//! - **Re-encryption**: a delta is applied by re-encrypting the scope's whole
//!   change set and committing it with the new access list in one request
//!
//! ## Usage
//!
//! ```rust,no_run
//! use passvault::{Session, Vault};
//! use passvault::store::SqliteStore;
//! use zeroize::Zeroizing;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let vault = Vault::new(SqliteStore::open("vault.db")?);
//!     let mut session = Session::new();
//!
//!     let me = vault.create_key(&mut session, "correct horse", None).await?;
//!     let colleague = "0123456789ABCDEF".parse()?;
//!
//!     let prompt = |_: &passvault::KeyId| Some(Zeroizing::new("correct horse".to_string()));
//!     let path = vault.add_file("/team", "wifi", b"s3cret", &[me.id]).await?;
//!
//!     // Re-encrypts everything under /team for both keys.
//!     vault.add_permission(&mut session, "/team", colleague, &prompt).await?;
//!
//!     let secret = vault.decrypt_file(&mut session, &path, &prompt).await?;
//!     assert_eq!(secret.as_slice(), b"s3cret");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `passvault::core` - Paths, key ids, access lists
//! - `passvault::crypto` - Messages and private keys
//! - `passvault::store` - The store trait and its implementations

pub mod acl;
pub mod config;
pub mod error;
pub mod reencrypt;
pub mod session;
pub mod unlock;
pub mod vault;

// Re-export component crates
pub use passvault_core as core;
pub use passvault_crypto as crypto;
pub use passvault_store as store;

// Re-export main types for convenience
pub use acl::{AccessListEditor, AclDelta};
pub use config::VaultConfig;
pub use error::{Result, UnlockError, VaultError};
pub use reencrypt::{
    ReencryptError, ReencryptOutcome, ReencryptionCoordinator, RefreshedScope, TransactionReport,
    TransactionState,
};
pub use session::Session;
pub use unlock::{prompt_text, PassphrasePrompt, PermissionKeyUnlocker, UnlockedKey};
pub use vault::{KeyOption, PathView, PermissionChange, Vault};

// Re-export commonly used core types
pub use passvault_core::{AccessControlList, EncryptedFile, KeyId, PathSegment, PublicKeyRecord, UserRef};
pub use passvault_crypto::{KdfParams, KeyState, PrivateKeyHandle};
