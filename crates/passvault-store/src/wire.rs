//! JSON bodies of the store's HTTP resources, and resource path encoding.
//!
//! Byte fields travel as standard base64. Key ids travel as uppercase hex.
//! [`WireStore`](crate::WireStore) sends the resource calls of a
//! [`PassStore`](crate::PassStore) through these encodings.

use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

use passvault_core::{
    canonicalize, display_name, AccessControlList, EncryptedFile, KeyId, NodeKind, PathNode,
    PublicKeyRecord, ROOT,
};

use crate::error::{Result, StoreError};
use crate::traits::{DirEntry, PassEntry, PermUpdate};

/// How the root permission resource is addressed.
pub const ROOT_RESOURCE: &str = ".";

/// Characters escaped inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Resource path for a store path: segments percent encoded, joined by `/`,
/// no leading separator. The root is [`ROOT_RESOURCE`].
pub fn encode_resource_path(path: &str) -> String {
    let canonical = canonicalize(path);
    if canonical == ROOT {
        return ROOT_RESOURCE.to_string();
    }
    canonical[1..]
        .split('/')
        .map(|segment| match segment {
            ROOT_RESOURCE => "%2E".to_string(),
            _ => utf8_percent_encode(segment, SEGMENT).to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Store path for a resource path.
///
/// An escaped separator (`%2F`) addresses the same path as a literal one.
pub fn decode_resource_path(resource: &str) -> Result<String> {
    if resource == ROOT_RESOURCE {
        return Ok(ROOT.to_string());
    }
    let decoded = percent_decode_str(resource)
        .decode_utf8()
        .map_err(|e| StoreError::Serialization(format!("resource path is not utf-8: {}", e)))?;
    Ok(canonicalize(&decoded))
}

mod base64_bytes {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// `GET /pass/{path}` for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBody {
    pub name: String,
    pub path: String,
    #[serde(with = "base64_bytes")]
    pub contents: Vec<u8>,
    pub recipients: Vec<KeyId>,
}

/// One child in a directory body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildBody {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

/// `GET /pass/{path}` for a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirBody {
    pub children: Vec<ChildBody>,
    pub recipients: Vec<KeyId>,
}

/// Either response of `GET /pass/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PassBody {
    File(FileBody),
    Dir(DirBody),
}

impl From<&PassEntry> for PassBody {
    fn from(entry: &PassEntry) -> Self {
        match entry {
            PassEntry::File(file) => PassBody::File(FileBody {
                name: display_name(&file.path).to_string(),
                path: file.path.clone(),
                contents: file.ciphertext.clone(),
                recipients: file.recipients.clone(),
            }),
            PassEntry::Dir(dir) => PassBody::Dir(DirBody {
                children: dir
                    .node
                    .children
                    .iter()
                    .map(|child| ChildBody {
                        name: child.name().to_string(),
                        path: child.path.clone(),
                        kind: child.kind,
                    })
                    .collect(),
                recipients: dir.recipients.clone(),
            }),
        }
    }
}

impl PassBody {
    /// Rebuild the entry. Directory bodies carry no path of their own, so the
    /// requested path is supplied.
    pub fn into_entry(self, requested: &str) -> PassEntry {
        match self {
            PassBody::File(file) => PassEntry::File(EncryptedFile {
                path: canonicalize(&file.path),
                ciphertext: file.contents,
                recipients: file.recipients,
            }),
            PassBody::Dir(dir) => {
                let children = dir
                    .children
                    .into_iter()
                    .map(|child| match child.kind {
                        NodeKind::File => PathNode::file(child.path),
                        NodeKind::Dir => PathNode::dir(child.path, Vec::new()),
                    })
                    .collect();
                PassEntry::Dir(DirEntry {
                    node: PathNode::dir(requested, children),
                    recipients: dir.recipients,
                })
            }
        }
    }
}

/// `PUT|POST /pass/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutBody {
    #[serde(with = "base64_bytes")]
    pub contents: Vec<u8>,
    pub message: String,
}

/// `GET /passPerm/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermBody {
    pub access: Vec<KeyId>,
    pub change: Vec<String>,
}

impl From<&AccessControlList> for PermBody {
    fn from(acl: &AccessControlList) -> Self {
        Self {
            access: acl.access.clone(),
            change: acl.change_set.clone(),
        }
    }
}

impl PermBody {
    pub fn into_acl(self, path: &str) -> Result<AccessControlList> {
        AccessControlList::new(path, self.access, self.change)
            .map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

/// `POST /passPerm/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermCommitBody {
    pub access: Vec<KeyId>,
    pub files: BTreeMap<String, Base64>,
}

/// Base64 wrapper for map values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Base64(#[serde(with = "base64_bytes")] pub Vec<u8>);

impl From<&PermUpdate> for PermCommitBody {
    fn from(update: &PermUpdate) -> Self {
        Self {
            access: update.access.clone(),
            files: update
                .files
                .iter()
                .map(|(path, bytes)| (path.clone(), Base64(bytes.clone())))
                .collect(),
        }
    }
}

impl PermCommitBody {
    pub fn into_update(self, scope: &str) -> PermUpdate {
        PermUpdate {
            scope: canonicalize(scope),
            access: self.access,
            files: self
                .files
                .into_iter()
                .map(|(path, bytes)| (path, bytes.0))
                .collect(),
        }
    }
}

/// One value of `GET /publicKey?ids=...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyBody {
    pub armored: String,
}

/// Query string for a public key lookup.
pub fn public_key_query(ids: &[KeyId]) -> String {
    let ids: Vec<String> = ids.iter().map(KeyId::to_hex).collect();
    format!("ids={}", ids.join(","))
}

/// Key ids of a public key lookup query. An empty `ids=` asks for nothing.
pub fn parse_public_key_query(query: &str) -> Result<Vec<KeyId>> {
    let ids = query
        .strip_prefix("ids=")
        .ok_or_else(|| StoreError::Serialization(format!("not a key query: {}", query)))?;
    ids.split(',')
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .map_err(|e| StoreError::Serialization(format!("{}: {}", id, e)))
        })
        .collect()
}

/// Records of a public key lookup body. Owners do not travel.
pub fn public_keys_from_body(
    body: BTreeMap<KeyId, PublicKeyBody>,
) -> HashMap<KeyId, PublicKeyRecord> {
    body.into_iter()
        .map(|(id, key)| {
            (
                id,
                PublicKeyRecord {
                    id,
                    armored: key.armored,
                    owner: None,
                },
            )
        })
        .collect()
}

/// Body of a public key lookup.
pub fn public_keys_body(found: &HashMap<KeyId, PublicKeyRecord>) -> BTreeMap<KeyId, PublicKeyBody> {
    found
        .iter()
        .map(|(id, record)| {
            (
                *id,
                PublicKeyBody {
                    armored: record.armored.clone(),
                },
            )
        })
        .collect()
}

/// Serialize any body to JSON.
pub fn to_json<T: Serialize>(body: &T) -> Result<String> {
    serde_json::to_string(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parse any body from JSON.
pub fn from_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
}
