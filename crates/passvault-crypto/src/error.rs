//! Error types for the crypto module.

use passvault_core::KeyId;
use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A message must be encrypted to at least one recipient.
    #[error("cannot encrypt to an empty recipient set")]
    NoRecipients,

    /// A public key record does not parse or does not match its id.
    #[error("invalid public key {id}: {reason}")]
    InvalidPublicKey { id: String, reason: String },

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// The private key has not been unlocked.
    #[error("private key {0} is locked")]
    KeyLocked(KeyId),

    /// The message carries no wrapped key for this private key.
    #[error("message is not encrypted to key {0}")]
    NotARecipient(KeyId),

    /// Authentication failed while opening a wrapped key or the body.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Wrong passphrase.
    #[error("incorrect passphrase for key {0}")]
    IncorrectPassphrase(KeyId),

    /// The unsealed secret does not belong to the sealed public key.
    #[error("unsealed secret does not match key {0}")]
    KeyMismatch(KeyId),

    /// Key derivation error.
    #[error("key derivation error: {0}")]
    KeyDerivationError(String),

    /// Malformed armor block.
    #[error("invalid armor: {0}")]
    Armor(String),

    /// Unknown format version.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl CryptoError {
    /// Errors raised while building a message.
    pub fn is_encryption(&self) -> bool {
        matches!(
            self,
            CryptoError::NoRecipients
                | CryptoError::InvalidPublicKey { .. }
                | CryptoError::EncryptionError(_)
        )
    }

    /// Errors raised while unlocking a private key.
    pub fn is_unlock(&self) -> bool {
        matches!(
            self,
            CryptoError::IncorrectPassphrase(_)
                | CryptoError::KeyMismatch(_)
                | CryptoError::KeyDerivationError(_)
        )
    }
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
