//! # passvault Testkit
//!
//! Testing utilities for passvault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic identities, counting passphrase prompts
//!   and seeded stores
//! - **Probe store**: a [`PassStore`](passvault_store::PassStore) wrapper
//!   that counts calls per verb and injects fetch, corruption and commit
//!   failures
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use passvault_store::MemoryStore;
//! use passvault_testkit::{seed_store, Identity, ProbeStore};
//!
//! async fn example() {
//!     let alice = Identity::new("alice");
//!     let store = ProbeStore::new(MemoryStore::new());
//!     seed_store(&store, &alice, &[], &[("/web/github.gpg", "hunter2")]).await;
//!     assert_eq!(store.counts().put_pass, 1);
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod probe;

pub use fixtures::{fast_config, identities, seed_store, FixturePrompt, Identity};
pub use probe::{CallCounts, ProbeStore};
