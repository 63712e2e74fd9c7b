//! Multi-recipient messages.
//!
//! A message is one ciphertext of the plaintext under a random session key,
//! plus one wrapped copy of that session key per recipient. Each wrap uses
//! a fresh ephemeral X25519 key, so recipients learn nothing about each
//! other's keys.

use serde::{Deserialize, Serialize};

use passvault_core::KeyId;

use crate::crypto::{EncryptionKey, EncryptionNonce, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret};
use crate::error::{CryptoError, Result};

/// Current message format version.
pub const MESSAGE_VERSION: u8 = 1;

/// The session key wrapped for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Recipient this copy is for.
    pub key_id: KeyId,

    /// Ephemeral X25519 public key (sender's side of ECDH).
    pub ephemeral_public: X25519PublicKey,

    /// Nonce used for wrapping.
    pub nonce: EncryptionNonce,

    /// The session key, encrypted with the derived wrap key.
    pub encrypted_key: Vec<u8>,
}

impl WrappedKey {
    /// Wrap a session key for a recipient.
    pub fn wrap(
        session_key: &EncryptionKey,
        key_id: KeyId,
        recipient_public: &X25519PublicKey,
    ) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let shared = ephemeral.diffie_hellman(recipient_public);
        let wrap_key = shared.derive_encryption_key(&wrap_context(&key_id, &ephemeral_public));

        let nonce = EncryptionNonce::generate();
        let encrypted_key = wrap_key.encrypt(session_key.as_bytes(), &nonce)?;

        Ok(Self {
            key_id,
            ephemeral_public,
            nonce,
            encrypted_key,
        })
    }

    /// Recover the session key with the recipient's secret key.
    pub fn unwrap_with(&self, recipient_secret: &X25519StaticSecret) -> Result<EncryptionKey> {
        let shared = recipient_secret.diffie_hellman(&self.ephemeral_public);
        let wrap_key = shared.derive_encryption_key(&wrap_context(&self.key_id, &self.ephemeral_public));

        let key_bytes = zeroize::Zeroizing::new(wrap_key.decrypt(&self.encrypted_key, &self.nonce)?);
        let arr: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::Integrity(format!(
                "invalid session key length: expected 32, got {}",
                key_bytes.len()
            ))
        })?;
        Ok(EncryptionKey::from_bytes(arr))
    }
}

fn wrap_context(key_id: &KeyId, ephemeral_public: &X25519PublicKey) -> Vec<u8> {
    let mut context = Vec::with_capacity(8 + 32);
    context.extend_from_slice(key_id.as_bytes());
    context.extend_from_slice(ephemeral_public.as_bytes());
    context
}

/// An encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Format version.
    pub version: u8,

    /// One wrapped session key per recipient, in encryption order.
    pub recipients: Vec<WrappedKey>,

    /// Nonce used for the body.
    pub nonce: EncryptionNonce,

    /// The encrypted body (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl Message {
    /// Encrypt `plaintext` for every `(id, public key)` pair.
    ///
    /// The caller guarantees ids are unique.
    pub fn seal(plaintext: &[u8], recipients: &[(KeyId, X25519PublicKey)]) -> Result<Self> {
        if recipients.is_empty() {
            return Err(CryptoError::NoRecipients);
        }

        let session_key = EncryptionKey::generate();
        let wrapped = recipients
            .iter()
            .map(|(id, public)| WrappedKey::wrap(&session_key, *id, public))
            .collect::<Result<Vec<_>>>()?;

        let nonce = EncryptionNonce::generate();
        let ciphertext = session_key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            version: MESSAGE_VERSION,
            recipients: wrapped,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with the secret key belonging to `key_id`.
    pub fn open(&self, key_id: &KeyId, secret: &X25519StaticSecret) -> Result<Vec<u8>> {
        let wrapped = self
            .recipients
            .iter()
            .find(|w| &w.key_id == key_id)
            .ok_or(CryptoError::NotARecipient(*key_id))?;

        let session_key = wrapped.unwrap_with(secret)?;
        session_key.decrypt(&self.ciphertext, &self.nonce)
    }

    /// Key ids this message is encrypted to.
    pub fn recipient_ids(&self) -> Vec<KeyId> {
        self.recipients.iter().map(|w| w.key_id).collect()
    }

    /// Whether `key_id` can open this message.
    pub fn is_encrypted_to(&self, key_id: &KeyId) -> bool {
        self.recipients.iter().any(|w| &w.key_id == key_id)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let message: Self = ciborium::from_reader(bytes)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        if message.version != MESSAGE_VERSION {
            return Err(CryptoError::UnsupportedVersion(message.version));
        }
        if message.recipients.is_empty() {
            return Err(CryptoError::NoRecipients);
        }
        Ok(message)
    }
}
