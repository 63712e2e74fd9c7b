//! Error types for passvault core.

use thiserror::Error;

/// Errors raised while parsing or validating core types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key id {0:?}: expected 16 hex characters")]
    InvalidKeyId(String),

    #[error("duplicate recipient {0}")]
    DuplicateRecipient(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
