//! Unlocking the permission key.
//!
//! [`PermissionKeyUnlocker::ensure_unlocked`] is the only way to get an
//! [`UnlockedKey`], and every decrypt in the engine takes one. A key that is
//! already unlocked is returned without prompting.

use passvault_core::KeyId;
use passvault_crypto::{KeyState, PrivateKeyHandle};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::UnlockError;

/// Asks the user for a key's passphrase.
pub trait PassphrasePrompt: Send + Sync {
    /// Passphrase for key `id`, or `None` if the user declined.
    fn passphrase(&self, id: &KeyId) -> Option<Zeroizing<String>>;
}

impl<F> PassphrasePrompt for F
where
    F: Fn(&KeyId) -> Option<Zeroizing<String>> + Send + Sync,
{
    fn passphrase(&self, id: &KeyId) -> Option<Zeroizing<String>> {
        self(id)
    }
}

/// Text to show when prompting for `id`.
pub fn prompt_text(id: &KeyId) -> String {
    format!("enter passphrase for key id {}", id)
}

/// Proof that a private key is unlocked.
///
/// Borrows the handle shared, so it cannot be locked while a transaction
/// is using it.
#[derive(Debug, Clone, Copy)]
pub struct UnlockedKey<'a> {
    handle: &'a PrivateKeyHandle,
}

impl<'a> UnlockedKey<'a> {
    pub fn id(&self) -> KeyId {
        self.handle.id()
    }

    pub fn handle(&self) -> &'a PrivateKeyHandle {
        self.handle
    }
}

/// Moves a private key from Locked to Unlocked.
pub struct PermissionKeyUnlocker<'p> {
    prompt: &'p dyn PassphrasePrompt,
}

impl<'p> PermissionKeyUnlocker<'p> {
    pub fn new(prompt: &'p dyn PassphrasePrompt) -> Self {
        Self { prompt }
    }

    /// Unlock `handle` if needed.
    ///
    /// Prompts once when the key is locked and never when it is unlocked.
    /// A failed unlock leaves the handle locked; it is not retried.
    pub fn ensure_unlocked<'a>(
        &self,
        handle: &'a mut PrivateKeyHandle,
    ) -> Result<UnlockedKey<'a>, UnlockError> {
        let id = handle.id();
        if handle.state() == KeyState::Unlocked {
            return Ok(UnlockedKey { handle });
        }

        let passphrase = self.prompt.passphrase(&id).ok_or(UnlockError::Cancelled(id))?;
        if let Err(e) = handle.unlock(&passphrase) {
            warn!(key = %id, error = %e, "unlock failed");
            return Err(UnlockError::from_crypto(id, e));
        }

        debug!(key = %id, "key unlocked");
        Ok(UnlockedKey { handle })
    }
}
