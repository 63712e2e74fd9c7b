//! Error types for the vault engine.

use passvault_core::{CoreError, KeyId};
use passvault_crypto::CryptoError;
use passvault_store::StoreError;
use thiserror::Error;

/// Why a private key could not be unlocked.
#[derive(Debug, Error)]
pub enum UnlockError {
    /// The user declined to enter a passphrase.
    #[error("unlock of key {0} cancelled")]
    Cancelled(KeyId),

    /// Wrong passphrase.
    #[error("incorrect passphrase for key {0}")]
    IncorrectPassphrase(KeyId),

    /// The sealed secret does not belong to the key.
    #[error("private key {0} does not match its public key")]
    KeyMismatch(KeyId),

    /// Passphrase stretching failed.
    #[error("key derivation failed for key {id}: {reason}")]
    KeyDerivation { id: KeyId, reason: String },
}

impl UnlockError {
    pub(crate) fn from_crypto(id: KeyId, err: CryptoError) -> Self {
        match err {
            CryptoError::IncorrectPassphrase(id) => UnlockError::IncorrectPassphrase(id),
            CryptoError::KeyMismatch(id) => UnlockError::KeyMismatch(id),
            other => UnlockError::KeyDerivation {
                id,
                reason: other.to_string(),
            },
        }
    }
}

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Some recipient ids have no registered public key.
    #[error("no public key registered for {}", join_ids(.missing))]
    KeyResolution { missing: Vec<KeyId> },

    /// The permission key could not be unlocked.
    #[error("unlock error: {0}")]
    Unlock(#[from] UnlockError),

    /// A ciphertext could not be opened.
    #[error("decryption error: {0}")]
    Decryption(#[source] CryptoError),

    /// A plaintext could not be encrypted to the requested recipients.
    #[error("encryption error: {0}")]
    Encryption(#[source] CryptoError),

    /// The request violates an access list rule.
    #[error("validation error: {0}")]
    Validation(String),

    /// The store answered 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other store failure, surfaced unchanged.
    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),

    /// The session holds no private key for any recipient of this path.
    #[error("no private key for any recipient of {0}")]
    NotAuthorized(String),
}

impl VaultError {
    /// Whether the failure came from the store, not-found included.
    pub fn is_persistence(&self) -> bool {
        matches!(self, VaultError::Persistence(_) | VaultError::NotFound(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => VaultError::NotFound(path),
            other => VaultError::Persistence(other),
        }
    }
}

impl From<CoreError> for VaultError {
    fn from(err: CoreError) -> Self {
        VaultError::Validation(err.to_string())
    }
}

fn join_ids(ids: &[KeyId]) -> String {
    ids.iter().map(KeyId::to_hex).collect::<Vec<_>>().join(", ")
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
