//! # passvault Store
//!
//! The interface between the vault engine and the remote secret store,
//! plus reference implementations of that interface.
//!
//! ## Overview
//!
//! The store is reached through the [`PassStore`] trait, one method per
//! resource verb:
//!
//! | method | resource |
//! |---|---|
//! | [`get_pass`](PassStore::get_pass) | `GET /pass/{path}` |
//! | [`put_pass`](PassStore::put_pass) | `PUT /pass/{path}` |
//! | [`delete_pass`](PassStore::delete_pass) | `DELETE /pass/{path}` |
//! | [`get_perm`](PassStore::get_perm) | `GET /passPerm/{path}` |
//! | [`commit_perm`](PassStore::commit_perm) | `POST /passPerm/{path}` |
//! | [`get_public_keys`](PassStore::get_public_keys) | `GET /publicKey?ids=...` |
//!
//! [`wire`] holds the JSON bodies and the resource path encoding of these
//! resources.
//!
//! ## Implementations
//!
//! - [`MemoryStore`] - In-memory reference store for tests
//! - [`SqliteStore`] - SQLite store; each permission commit is one SQL transaction
//! - [`StagedStore`] - Two-phase commits over a [`StagingBackend`] that
//!   can only write one object at a time
//! - [`WireStore`] - Any store behind the JSON wire encoding
//!
//! ## Usage
//!
//! ```rust,no_run
//! use passvault_store::{PassStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("vault.db").unwrap();
//!     let acl = store.get_perm("/").await.unwrap();
//!     println!("{} files under the root scope", acl.change_set.len());
//! }
//! ```

pub mod error;
mod layout;
pub mod loopback;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod staged;
pub mod traits;
pub mod wire;

pub use error::{Result, StoreError};
pub use loopback::WireStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use staged::{MemoryBackend, ObjectKey, ObjectKind, StagedStore, StagingBackend};
pub use traits::{Commit, DirEntry, PassEntry, PassStore, PassStoreExt, PermUpdate};
