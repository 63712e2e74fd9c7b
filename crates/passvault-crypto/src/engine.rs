//! The crypto capability used by the vault engine.

use passvault_core::{KeyId, PublicKeyRecord};

use crate::error::{CryptoError, Result};
use crate::keys::{parse_public_key, PrivateKeyHandle};
use crate::message::Message;

/// Encrypts for many recipients, decrypts with one key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoEngine;

impl CryptoEngine {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext` once for every record in `recipients`.
    ///
    /// Records with the same id are wrapped once. Fails if the set is empty
    /// or any record does not parse or does not match its id.
    pub fn encrypt_for(&self, plaintext: &[u8], recipients: &[PublicKeyRecord]) -> Result<Message> {
        if recipients.is_empty() {
            return Err(CryptoError::NoRecipients);
        }

        let mut keys: Vec<(KeyId, _)> = Vec::with_capacity(recipients.len());
        for record in recipients {
            if keys.iter().any(|(id, _)| *id == record.id) {
                continue;
            }
            keys.push((record.id, parse_public_key(record)?));
        }

        Message::seal(plaintext, &keys)
    }

    /// Decrypt `message` with an unlocked private key.
    pub fn decrypt_with(&self, message: &Message, key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        let secret = key.secret().ok_or(CryptoError::KeyLocked(key.id()))?;
        message.open(&key.id(), secret)
    }

    pub fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        message.to_bytes()
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        Message::from_bytes(bytes)
    }

    /// Recipient ids of a serialized message, without decrypting it.
    pub fn recipients_of(&self, bytes: &[u8]) -> Result<Vec<KeyId>> {
        Ok(Message::from_bytes(bytes)?.recipient_ids())
    }
}
