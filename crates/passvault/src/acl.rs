//! Access list edits.

use passvault_core::{AccessControlList, KeyId};

use crate::error::{Result, VaultError};
use crate::unlock::UnlockedKey;

/// A proposed change to one scope's recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclDelta {
    /// Directory the new access list is committed at.
    pub scope: String,
    /// Recipients before the change.
    pub previous: Vec<KeyId>,
    /// Recipients after the change.
    pub access: Vec<KeyId>,
    /// Files to re-encrypt, as read with `previous`.
    pub change_set: Vec<String>,
}

impl AclDelta {
    fn unchanged(acl: &AccessControlList) -> Self {
        Self {
            scope: acl.path.clone(),
            previous: acl.access.clone(),
            access: acl.access.clone(),
            change_set: acl.change_set.clone(),
        }
    }

    /// A delta that needs no network write.
    pub fn is_noop(&self) -> bool {
        self.previous == self.access
    }
}

/// Computes access list deltas and enforces their rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessListEditor;

impl AccessListEditor {
    pub fn new() -> Self {
        Self
    }

    /// Append `id`. Adding a present recipient yields a no-op delta.
    pub fn add_recipient(&self, acl: &AccessControlList, id: KeyId) -> AclDelta {
        let mut delta = AclDelta::unchanged(acl);
        if !delta.access.contains(&id) {
            delta.access.push(id);
        }
        delta
    }

    /// Remove `id`.
    ///
    /// Fails if `id` is not a recipient, if the root would be left with no
    /// recipients, or if files would be left encrypted to nobody.
    pub fn remove_recipient(&self, acl: &AccessControlList, id: KeyId) -> Result<AclDelta> {
        if !acl.contains(&id) {
            return Err(VaultError::Validation(format!(
                "{} is not a recipient of {}",
                id, acl.path
            )));
        }

        let mut delta = AclDelta::unchanged(acl);
        delta.access.retain(|k| *k != id);

        if delta.access.is_empty() {
            if acl.is_root() {
                return Err(VaultError::Validation(
                    "the root access list cannot be empty".into(),
                ));
            }
            if !acl.change_set.is_empty() {
                return Err(VaultError::Validation(format!(
                    "{} would leave {} files with no recipients",
                    acl.path,
                    acl.change_set.len()
                )));
            }
        }

        Ok(delta)
    }

    /// Check that `key` belongs to a current recipient of the scope.
    pub fn authorize(&self, delta: &AclDelta, key: &UnlockedKey<'_>) -> Result<()> {
        if delta.previous.contains(&key.id()) {
            Ok(())
        } else {
            Err(VaultError::NotAuthorized(delta.scope.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> KeyId {
        KeyId::from_bytes([b; 8])
    }

    fn acl(path: &str, access: &[u8], files: &[&str]) -> AccessControlList {
        AccessControlList::new(
            path,
            access.iter().map(|b| id(*b)).collect(),
            files.iter().map(|f| f.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_add_appends_in_order() {
        let delta = AccessListEditor::new().add_recipient(&acl("/", &[2, 1], &[]), id(3));
        assert_eq!(delta.access, vec![id(2), id(1), id(3)]);
        assert_eq!(delta.previous, vec![id(2), id(1)]);
        assert!(!delta.is_noop());
    }

    #[test]
    fn test_add_existing_is_noop() {
        let original = acl("/web", &[1, 2], &["/web/a.gpg"]);
        let delta = AccessListEditor::new().add_recipient(&original, id(2));
        assert!(delta.is_noop());
        assert_eq!(delta.access, original.access);
        assert_eq!(delta.change_set, original.change_set);
    }

    #[test]
    fn test_remove_missing_recipient() {
        let err = AccessListEditor::new()
            .remove_recipient(&acl("/", &[1], &[]), id(2))
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn test_remove_last_root_recipient() {
        let err = AccessListEditor::new()
            .remove_recipient(&acl("/", &[1], &[]), id(1))
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn test_remove_last_recipient_of_populated_scope() {
        let err = AccessListEditor::new()
            .remove_recipient(&acl("/web", &[1], &["/web/a.gpg"]), id(1))
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn test_remove_last_recipient_of_empty_scope() {
        let delta = AccessListEditor::new()
            .remove_recipient(&acl("/web", &[1], &[]), id(1))
            .unwrap();
        assert!(delta.access.is_empty());
    }

    #[test]
    fn test_remove_keeps_order() {
        let delta = AccessListEditor::new()
            .remove_recipient(&acl("/", &[3, 1, 2], &[]), id(1))
            .unwrap();
        assert_eq!(delta.access, vec![id(3), id(2)]);
    }
}
