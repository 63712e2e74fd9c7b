//! Per-user client state passed into every vault operation.

use passvault_core::{resolve, KeyId, PathSegment, UserRef, ROOT};
use passvault_crypto::PrivateKeyHandle;

/// The current user's keys and navigation state.
///
/// Private keys live here for the whole session. Nothing in the engine
/// locks them; only [`lock_all`](Self::lock_all) or dropping the session
/// does.
#[derive(Debug, Default)]
pub struct Session {
    keys: Vec<PrivateKeyHandle>,
    breadcrumbs: Vec<PathSegment>,
    permission_key: Option<KeyId>,
    user: Option<UserRef>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            breadcrumbs: resolve(ROOT),
            ..Self::default()
        }
    }

    /// A session for `user`.
    pub fn for_user(user: UserRef) -> Self {
        Self {
            user: Some(user),
            ..Self::new()
        }
    }

    pub fn user(&self) -> Option<&UserRef> {
        self.user.as_ref()
    }

    /// Add a private key. A key with the same id is replaced.
    pub fn add_key(&mut self, key: PrivateKeyHandle) {
        match self.keys.iter_mut().find(|k| k.id() == key.id()) {
            Some(existing) => *existing = key,
            None => self.keys.push(key),
        }
    }

    pub fn key(&self, id: &KeyId) -> Option<&PrivateKeyHandle> {
        self.keys.iter().find(|k| k.id() == *id)
    }

    pub fn key_mut(&mut self, id: &KeyId) -> Option<&mut PrivateKeyHandle> {
        self.keys.iter_mut().find(|k| k.id() == *id)
    }

    pub fn key_ids(&self) -> Vec<KeyId> {
        self.keys.iter().map(PrivateKeyHandle::id).collect()
    }

    /// First recipient we hold a private key for.
    pub fn held_key(&self, recipients: &[KeyId]) -> Option<KeyId> {
        recipients.iter().copied().find(|id| self.key(id).is_some())
    }

    /// Make [`held_key`](Self::held_key) the current permission key.
    pub fn select_permission_key(&mut self, recipients: &[KeyId]) -> Option<KeyId> {
        self.permission_key = self.held_key(recipients);
        self.permission_key
    }

    pub fn permission_key(&self) -> Option<KeyId> {
        self.permission_key
    }

    /// Move to `raw`, returning the new breadcrumbs.
    pub fn set_location(&mut self, raw: &str) -> &[PathSegment] {
        self.breadcrumbs = resolve(raw);
        &self.breadcrumbs
    }

    pub fn breadcrumbs(&self) -> &[PathSegment] {
        &self.breadcrumbs
    }

    /// Canonical path of the current location.
    pub fn current_path(&self) -> &str {
        self.breadcrumbs
            .last()
            .map(|segment| segment.path.as_str())
            .unwrap_or(ROOT)
    }

    /// End of session: forget every open secret.
    pub fn lock_all(&mut self) {
        for key in &mut self.keys {
            key.lock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passvault_crypto::{KdfParams, KeyPair};

    fn key(seed: u8) -> PrivateKeyHandle {
        KeyPair::from_seed([seed; 32], "pw", &KdfParams::insecure_fast(), None)
            .unwrap()
            .private
    }

    #[test]
    fn test_new_session_is_at_root() {
        let session = Session::new();
        assert_eq!(session.current_path(), "/");
        assert_eq!(session.breadcrumbs().len(), 1);
    }

    #[test]
    fn test_set_location_normalizes() {
        let mut session = Session::new();
        let crumbs: Vec<String> = session
            .set_location("team//ops/")
            .iter()
            .map(|s| s.path.clone())
            .collect();
        assert_eq!(crumbs, vec!["/", "/team", "/team/ops"]);
        assert_eq!(session.current_path(), "/team/ops");
    }

    #[test]
    fn test_select_permission_key_takes_first_held() {
        let mut session = Session::new();
        let a = key(1);
        let b = key(2);
        let (a_id, b_id) = (a.id(), b.id());
        session.add_key(a);
        session.add_key(b);

        let stranger = KeyId::from_bytes([9; 8]);
        assert_eq!(session.select_permission_key(&[stranger, b_id, a_id]), Some(b_id));
        assert_eq!(session.permission_key(), Some(b_id));

        assert_eq!(session.select_permission_key(&[stranger]), None);
        assert_eq!(session.permission_key(), None);
    }

    #[test]
    fn test_add_key_replaces_same_id() {
        let mut session = Session::new();
        session.add_key(key(1));
        session.add_key(key(1));
        assert_eq!(session.key_ids().len(), 1);
    }

    #[test]
    fn test_lock_all() {
        let mut session = Session::new();
        let mut k = key(3);
        k.unlock("pw").unwrap();
        let id = k.id();
        session.add_key(k);
        assert!(!session.key(&id).unwrap().is_locked());

        session.lock_all();
        assert!(session.key(&id).unwrap().is_locked());
    }
}
