//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Body or blob serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No file or directory at this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was computed against state that has since changed.
    #[error("conflict at {path}: {reason}")]
    Conflict { path: String, reason: String },

    /// The request is well formed but violates a store rule.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub(crate) fn conflict(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Conflict {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
