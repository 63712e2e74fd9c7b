//! # passvault Crypto
//!
//! Multi-recipient encryption of stored secrets and passphrase-locked
//! private keys.
//!
//! ## Encryption Model
//!
//! Every stored file is one [`Message`]:
//!
//! 1. **Session Key**: a fresh ChaCha20-Poly1305 key encrypts the plaintext once
//! 2. **Wrapped Keys**: the session key is wrapped for each recipient via
//!    ephemeral X25519 agreement with the recipient's public key
//!
//! Changing who can read a file therefore means decrypting it with one
//! current recipient's key and encrypting it again for the new set.
//!
//! ## Private Keys
//!
//! A [`PrivateKeyHandle`] holds a sealed secret key. It starts locked and is
//! unlocked with a passphrase (scrypt, then BLAKE3 key derivation). Only an
//! unlocked handle can decrypt.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use passvault_crypto::{CryptoEngine, KdfParams, KeyPair};
//!
//! let alice = KeyPair::generate("correct horse", &KdfParams::default(), None).unwrap();
//! let engine = CryptoEngine::new();
//!
//! let message = engine.encrypt_for(b"hunter2", &[alice.public.clone()]).unwrap();
//! let bytes = engine.serialize(&message).unwrap();
//!
//! let mut key = alice.private;
//! key.unlock("correct horse").unwrap();
//! let plaintext = engine.decrypt_with(&engine.deserialize(&bytes).unwrap(), &key).unwrap();
//! assert_eq!(plaintext, b"hunter2");
//! ```

pub mod armor;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod keys;
pub mod message;

pub use crypto::{EncryptionKey, EncryptionNonce, EphemeralKeyPair, SharedKey, X25519PublicKey, X25519StaticSecret};
pub use engine::CryptoEngine;
pub use error::{CryptoError, Result};
pub use keys::{parse_public_key, public_record, KdfParams, KeyPair, KeyState, PrivateKeyHandle};
pub use message::{Message, WrappedKey, MESSAGE_VERSION};
