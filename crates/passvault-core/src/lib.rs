//! # passvault Core
//!
//! Pure types for the passvault secret store client: key identifiers,
//! hierarchical paths, access lists, and the scope arithmetic that decides
//! which access list governs which file.
//!
//! This crate contains no I/O and no cryptography beyond fingerprinting.
//!
//! ## Key Types
//!
//! - [`KeyId`] - Canonical uppercase-hex recipient identifier
//! - [`PathSegment`] - One breadcrumb produced by [`resolve`]
//! - [`AccessControlList`] - Recipients governing a directory subtree
//! - [`EncryptedFile`] - A stored ciphertext and who it is encrypted to
//! - [`PublicKeyRecord`] - A registered public key
//!
//! ## Scopes
//!
//! The root directory is always a scope. Any directory with its own access
//! list is a scope too, and every file is governed by its nearest ancestor
//! scope. See [`scope`].

pub mod error;
pub mod model;
pub mod path;
pub mod scope;
pub mod types;

pub use error::{CoreError, Result};
pub use model::{AccessControlList, EncryptedFile, NodeKind, PathNode, PublicKeyRecord, UserRef};
pub use path::{
    canonicalize, display_name, file_name, is_within, join, parent, resolve, PathSegment, FILE_SUFFIX, ROOT,
};
pub use scope::{change_set, effective_scope, file_scope};
pub use types::{Fingerprint, KeyId};
