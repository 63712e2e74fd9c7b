//! Records exchanged with the store.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::path::{canonicalize, display_name, ROOT};
use crate::types::KeyId;

/// Whether a node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// A node of the store's directory tree.
///
/// Directory nodes carry their immediate children as summaries (children of
/// children are not populated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    /// Canonical path.
    pub path: String,
    /// File or directory.
    pub kind: NodeKind,
    /// Immediate children, ordered. Always empty for files.
    pub children: Vec<PathNode>,
}

impl PathNode {
    /// A file summary.
    pub fn file(path: impl AsRef<str>) -> Self {
        Self {
            path: canonicalize(path.as_ref()),
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    /// A directory summary with the given children.
    pub fn dir(path: impl AsRef<str>, children: Vec<PathNode>) -> Self {
        Self {
            path: canonicalize(path.as_ref()),
            kind: NodeKind::Dir,
            children,
        }
    }

    /// Name for display (base name without the file suffix).
    pub fn name(&self) -> &str {
        display_name(&self.path)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }
}

/// The access list of one scope.
///
/// `access` keeps insertion order for display and never holds duplicates.
/// `change_set` lists the files currently encrypted under this scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    /// The directory this list governs.
    pub path: String,
    /// Recipient key ids.
    pub access: Vec<KeyId>,
    /// Files that must be re-encrypted together whenever `access` changes.
    pub change_set: Vec<String>,
}

impl AccessControlList {
    /// Build an access list, rejecting duplicate recipients.
    pub fn new(path: impl AsRef<str>, access: Vec<KeyId>, change_set: Vec<String>) -> Result<Self> {
        for (i, id) in access.iter().enumerate() {
            if access[..i].contains(id) {
                return Err(CoreError::DuplicateRecipient(id.to_hex()));
            }
        }
        Ok(Self {
            path: canonicalize(path.as_ref()),
            access,
            change_set,
        })
    }

    /// Whether `id` is a current recipient.
    pub fn contains(&self, id: &KeyId) -> bool {
        self.access.contains(id)
    }

    /// Whether this is the root scope.
    pub fn is_root(&self) -> bool {
        self.path == ROOT
    }
}

/// A stored ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFile {
    /// Canonical path.
    pub path: String,
    /// Serialized message bytes.
    pub ciphertext: Vec<u8>,
    /// Key ids the message is encrypted to, as read from the message itself.
    pub recipients: Vec<KeyId>,
}

/// Weak reference to the user owning a key. Lookup only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    /// Login id.
    pub id: String,
    /// Full name.
    pub name: String,
}

/// A registered public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    /// Canonical key id.
    pub id: KeyId,
    /// Armored key material.
    pub armored: String,
    /// Owning user, if known.
    pub owner: Option<UserRef>,
}

impl PublicKeyRecord {
    /// Label shown when choosing recipients: `KEYID (Name (user-id))`.
    pub fn label(&self) -> String {
        match &self.owner {
            Some(user) => format!("{} ({} ({}))", self.id, user.name, user.id),
            None => self.id.to_hex(),
        }
    }
}
