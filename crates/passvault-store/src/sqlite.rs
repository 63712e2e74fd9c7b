//! SQLite implementation of the PassStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`. Every mutating call runs in one SQL
//! transaction, so a permission commit lands whole or not at all.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use passvault_core::{canonicalize, AccessControlList, EncryptedFile, KeyId, PublicKeyRecord, UserRef};
use passvault_crypto::{parse_public_key, CryptoEngine};

use crate::error::{Result, StoreError};
use crate::layout::{decode_cbor, encode_cbor, Layout};
use crate::migration::{self, now_millis};
use crate::traits::{Commit, PassEntry, PassStore, PermUpdate};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }

    /// Commit history, oldest first.
    pub async fn commits(&self) -> Result<Vec<Commit>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT message, paths FROM commits ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            let mut commits = Vec::new();
            for row in rows {
                let (message, paths) = row?;
                commits.push(Commit {
                    message,
                    paths: decode_cbor(&paths)?,
                });
            }
            Ok(commits)
        })
        .await
    }
}

/// Load file paths and scopes.
fn load_layout(conn: &Connection) -> Result<Layout> {
    let mut layout = Layout::default();

    let mut stmt = conn.prepare("SELECT path FROM files")?;
    for path in stmt.query_map([], |row| row.get::<_, String>(0))? {
        layout.files.insert(path?);
    }

    let mut stmt = conn.prepare("SELECT path, access FROM scopes")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;
    for row in rows {
        let (path, access) = row?;
        layout.scopes.insert(path, decode_cbor(&access)?);
    }

    Ok(layout)
}

fn record_commit(conn: &Connection, message: &str, paths: &[String]) -> Result<()> {
    conn.execute(
        "INSERT INTO commits (message, paths, committed_at) VALUES (?1, ?2, ?3)",
        params![message, encode_cbor(&paths)?, now_millis()],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, Option<String>, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_record(
    (key_id, armored, owner_id, owner_name): (String, String, Option<String>, Option<String>),
) -> Result<PublicKeyRecord> {
    let id = KeyId::from_hex(&key_id).map_err(|e| StoreError::InvalidData(e.to_string()))?;
    let owner = match (owner_id, owner_name) {
        (Some(id), Some(name)) => Some(UserRef { id, name }),
        _ => None,
    };
    Ok(PublicKeyRecord { id, armored, owner })
}

#[async_trait]
impl PassStore for SqliteStore {
    async fn get_pass(&self, path: &str) -> Result<PassEntry> {
        let path = canonicalize(path);

        self.blocking(move |conn| {
            let contents: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT contents FROM files WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()?;

            match contents {
                Some(bytes) => {
                    let recipients = CryptoEngine::new()
                        .recipients_of(&bytes)
                        .map_err(|e| StoreError::InvalidData(format!("{}: {}", path, e)))?;
                    Ok(PassEntry::File(EncryptedFile {
                        path,
                        ciphertext: bytes,
                        recipients,
                    }))
                }
                None => load_layout(conn)?.list(&path).map(PassEntry::Dir),
            }
        })
        .await
    }

    async fn put_pass(&self, path: &str, contents: &[u8], message: &str) -> Result<()> {
        let path = canonicalize(path);
        let contents = contents.to_vec();
        let message = message.to_string();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            load_layout(&tx)?.check_put(&path, &contents)?;

            tx.execute(
                "INSERT INTO files (path, contents, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET contents = excluded.contents, updated_at = excluded.updated_at",
                params![path, contents, now_millis()],
            )?;
            record_commit(&tx, &message, std::slice::from_ref(&path))?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_pass(&self, path: &str) -> Result<()> {
        let path = canonicalize(path);

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            if tx.execute("DELETE FROM files WHERE path = ?1", params![path])? == 0 {
                return Err(StoreError::NotFound(path));
            }

            let mut layout = load_layout(&tx)?;
            for scope in layout.prune_scopes() {
                tx.execute("DELETE FROM scopes WHERE path = ?1", params![scope])?;
            }
            record_commit(&tx, &format!("removed {}", path), std::slice::from_ref(&path))?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_perm(&self, path: &str) -> Result<AccessControlList> {
        let path = canonicalize(path);
        self.blocking(move |conn| load_layout(conn)?.acl(&path)).await
    }

    async fn commit_perm(&self, update: &PermUpdate) -> Result<()> {
        let update = update.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let scope = load_layout(&tx)?.check_commit(&update)?;
            let now = now_millis();

            let mut paths = Vec::with_capacity(update.files.len());
            for (path, bytes) in &update.files {
                let path = canonicalize(path);
                tx.execute(
                    "UPDATE files SET contents = ?2, updated_at = ?3 WHERE path = ?1",
                    params![path, bytes, now],
                )?;
                paths.push(path);
            }
            tx.execute(
                "INSERT INTO scopes (path, access, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET access = excluded.access, updated_at = excluded.updated_at",
                params![scope, encode_cbor(&update.access)?, now],
            )?;
            record_commit(&tx, &format!("updated access list of {}", scope), &paths)?;

            tx.commit()?;
            debug!(scope = %scope, files = paths.len(), "committed access list");
            Ok(())
        })
        .await
    }

    async fn get_public_keys(&self, ids: &[KeyId]) -> Result<HashMap<KeyId, PublicKeyRecord>> {
        let ids = ids.to_vec();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key_id, armored, owner_id, owner_name FROM public_keys WHERE key_id = ?1",
            )?;

            let mut found = HashMap::new();
            for id in ids {
                if let Some(row) = stmt.query_row(params![id.to_hex()], row_to_record).optional()? {
                    found.insert(id, to_record(row)?);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn list_public_keys(&self) -> Result<Vec<PublicKeyRecord>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key_id, armored, owner_id, owner_name FROM public_keys ORDER BY key_id",
            )?;
            let rows = stmt.query_map([], row_to_record)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(to_record(row?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn add_public_key(&self, record: &PublicKeyRecord) -> Result<()> {
        parse_public_key(record).map_err(|e| StoreError::Rejected(e.to_string()))?;
        let record = record.clone();

        self.blocking(move |conn| {
            let (owner_id, owner_name) = match &record.owner {
                Some(user) => (Some(user.id.clone()), Some(user.name.clone())),
                None => (None, None),
            };
            conn.execute(
                "INSERT OR REPLACE INTO public_keys (key_id, armored, owner_id, owner_name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.id.to_hex(), record.armored, owner_id, owner_name],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use passvault_core::ROOT;
    use passvault_crypto::{KdfParams, KeyPair};

    fn key() -> KeyPair {
        KeyPair::generate("pw", &KdfParams::insecure_fast(), None).unwrap()
    }

    fn sealed_for(keys: &[&KeyPair], plaintext: &[u8]) -> Vec<u8> {
        let engine = CryptoEngine::new();
        let records: Vec<_> = keys.iter().map(|k| k.public.clone()).collect();
        engine
            .serialize(&engine.encrypt_for(plaintext, &records).unwrap())
            .unwrap()
    }

    async fn seeded(owner: &KeyPair) -> SqliteStore {
        let store = SqliteStore::open_memory().unwrap();
        store.add_public_key(&owner.public).await.unwrap();
        store
            .commit_perm(&PermUpdate {
                scope: ROOT.into(),
                access: vec![owner.public.id],
                files: BTreeMap::new(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_put_get_and_list() {
        let owner = key();
        let store = seeded(&owner).await;
        store
            .put_pass("/web/github.gpg", &sealed_for(&[&owner], b"pw"), "add")
            .await
            .unwrap();

        match store.get_pass("/web").await.unwrap() {
            PassEntry::Dir(dir) => {
                assert_eq!(dir.recipients, vec![owner.public.id]);
                assert_eq!(dir.node.children[0].path, "/web/github.gpg");
            }
            other => panic!("expected dir, got {:?}", other),
        }
        let acl = store.get_perm(ROOT).await.unwrap();
        assert_eq!(acl.change_set, vec!["/web/github.gpg".to_string()]);
    }

    #[tokio::test]
    async fn test_commit_perm_rewrites_files() {
        let owner = key();
        let friend = key();
        let store = seeded(&owner).await;
        store.add_public_key(&friend.public).await.unwrap();
        store
            .put_pass("/a.gpg", &sealed_for(&[&owner], b"a"), "add")
            .await
            .unwrap();

        let reencrypted = sealed_for(&[&owner, &friend], b"a");
        store
            .commit_perm(&PermUpdate {
                scope: ROOT.into(),
                access: vec![owner.public.id, friend.public.id],
                files: [("/a.gpg".to_string(), reencrypted.clone())].into(),
            })
            .await
            .unwrap();

        match store.get_pass("/a.gpg").await.unwrap() {
            PassEntry::File(file) => {
                assert_eq!(file.ciphertext, reencrypted);
                assert_eq!(file.recipients, vec![owner.public.id, friend.public.id]);
            }
            other => panic!("expected file, got {:?}", other),
        }
        let commits = store.commits().await.unwrap();
        assert_eq!(commits.last().unwrap().paths, vec!["/a.gpg".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_commit_changes_nothing() {
        let owner = key();
        let store = seeded(&owner).await;
        store
            .put_pass("/a.gpg", &sealed_for(&[&owner], b"a"), "add")
            .await
            .unwrap();
        let commits_before = store.commits().await.unwrap().len();

        let err = store
            .commit_perm(&PermUpdate {
                scope: ROOT.into(),
                access: vec![owner.public.id],
                files: [
                    ("/a.gpg".to_string(), sealed_for(&[&owner], b"a")),
                    ("/b.gpg".to_string(), sealed_for(&[&owner], b"b")),
                ]
                .into(),
            })
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.commits().await.unwrap().len(), commits_before);
    }

    #[tokio::test]
    async fn test_delete_prunes_scope() {
        let owner = key();
        let store = seeded(&owner).await;
        store
            .put_pass("/team/a.gpg", &sealed_for(&[&owner], b"a"), "add")
            .await
            .unwrap();
        store
            .commit_perm(&PermUpdate {
                scope: "/team".into(),
                access: vec![owner.public.id],
                files: [("/team/a.gpg".to_string(), sealed_for(&[&owner], b"a"))].into(),
            })
            .await
            .unwrap();

        store.delete_pass("/team/a.gpg").await.unwrap();
        assert!(store.get_perm("/team").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("vault.db");
        let owner = KeyPair::generate(
            "pw",
            &KdfParams::insecure_fast(),
            Some(UserRef {
                id: "ada".into(),
                name: "Ada Lovelace".into(),
            }),
        )
        .unwrap();

        {
            let store = SqliteStore::open(&db).unwrap();
            store.add_public_key(&owner.public).await.unwrap();
        }

        let store = SqliteStore::open(&db).unwrap();
        let keys = store.list_public_keys().await.unwrap();
        assert_eq!(keys, vec![owner.public.clone()]);
    }
}
