//! Re-encryption transactions.
//!
//! When a scope's recipients change, every file in its change set must be
//! re-encrypted to the new recipients and committed together with the new
//! access list. [`ReencryptionCoordinator`] runs that as one transaction:
//!
//! ```text
//! Pending -> Resolving -> Transforming -> Persisting -> Committed
//!    \           \             \              \
//!     +-----------+-------------+--------------+--> Aborted
//! ```
//!
//! Nothing is written before every file has been transformed, and the write
//! is a single [`PassStore::commit_perm`] call.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use passvault_core::{AccessControlList, EncryptedFile, KeyId, PublicKeyRecord};
use passvault_crypto::{CryptoEngine, CryptoError};
use passvault_store::{PassStore, PassStoreExt, PermUpdate};

use crate::error::{Result, VaultError};
use crate::unlock::UnlockedKey;

/// Where a transaction is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Resolving,
    Transforming,
    Persisting,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Pending => "pending",
            TransactionState::Resolving => "resolving",
            TransactionState::Transforming => "transforming",
            TransactionState::Persisting => "persisting",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// The state trail of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReport {
    pub scope: String,
    /// Every state entered, in order.
    pub states: Vec<TransactionState>,
    /// The change set being re-encrypted.
    pub files: Vec<String>,
}

impl TransactionReport {
    fn new(scope: &str, files: &[String]) -> Self {
        Self {
            scope: scope.to_string(),
            states: vec![TransactionState::Pending],
            files: files.to_vec(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.states
            .last()
            .copied()
            .unwrap_or(TransactionState::Pending)
    }

    pub fn committed(&self) -> bool {
        self.states.contains(&TransactionState::Committed)
    }

    fn enter(&mut self, state: TransactionState) {
        debug!(scope = %self.scope, from = %self.state(), to = %state, "transaction state");
        self.states.push(state);
    }

    fn abort(mut self, cause: VaultError) -> ReencryptError {
        let state = self.state();
        warn!(scope = %self.scope, during = %state, error = %cause, "re-encryption aborted");
        self.enter(TransactionState::Aborted);
        ReencryptError {
            state,
            report: self,
            cause,
        }
    }
}

/// The scope as read back from the store after a commit.
#[derive(Debug, Clone)]
pub struct RefreshedScope {
    pub acl: AccessControlList,
    pub files: Vec<EncryptedFile>,
}

/// A committed transaction.
#[derive(Debug, Clone)]
pub struct ReencryptOutcome {
    pub report: TransactionReport,
    /// `None` when refreshing is turned off.
    pub refreshed: Option<RefreshedScope>,
}

/// A transaction that failed.
///
/// `state` is where the failure happened. If it is
/// [`Committed`](TransactionState::Committed) the commit went through and
/// only the refresh failed.
#[derive(Debug, Error)]
#[error("re-encryption of {} failed while {state}: {cause}", .report.scope)]
pub struct ReencryptError {
    pub state: TransactionState,
    pub report: TransactionReport,
    #[source]
    pub cause: VaultError,
}

impl From<ReencryptError> for VaultError {
    fn from(err: ReencryptError) -> Self {
        err.cause
    }
}

/// Runs re-encryption transactions against a store.
pub struct ReencryptionCoordinator<'s, S: ?Sized> {
    store: &'s S,
    engine: CryptoEngine,
    refresh: bool,
}

impl<'s, S: PassStore + ?Sized> ReencryptionCoordinator<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            engine: CryptoEngine::new(),
            refresh: true,
        }
    }

    /// Whether to read the scope back after committing.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Re-encrypt `change_set` to `new_access` and commit it at `scope`.
    #[instrument(skip(self, new_access, key, change_set), fields(recipients = new_access.len(), files = change_set.len()))]
    pub async fn reencrypt(
        &self,
        scope: &str,
        new_access: &[KeyId],
        key: &UnlockedKey<'_>,
        change_set: &[String],
    ) -> std::result::Result<ReencryptOutcome, ReencryptError> {
        let mut report = TransactionReport::new(scope, change_set);

        report.enter(TransactionState::Resolving);
        if new_access.is_empty() && !change_set.is_empty() {
            return Err(report.abort(VaultError::Encryption(CryptoError::NoRecipients)));
        }
        let records = match resolve_keys(self.store, new_access).await {
            Ok(records) => records,
            Err(e) => return Err(report.abort(e)),
        };

        report.enter(TransactionState::Transforming);
        let transforms = change_set
            .iter()
            .map(|path| self.transform(path, key, &records));
        let files: BTreeMap<String, Vec<u8>> = match try_join_all(transforms).await {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(e) => return Err(report.abort(e)),
        };

        report.enter(TransactionState::Persisting);
        let update = PermUpdate {
            scope: scope.to_string(),
            access: new_access.to_vec(),
            files,
        };
        if let Err(e) = self.store.commit_perm(&update).await {
            return Err(report.abort(e.into()));
        }

        report.enter(TransactionState::Committed);
        info!(scope, files = change_set.len(), "access list committed");

        if !self.refresh {
            return Ok(ReencryptOutcome {
                report,
                refreshed: None,
            });
        }
        match self.refresh(scope).await {
            Ok(refreshed) => Ok(ReencryptOutcome {
                report,
                refreshed: Some(refreshed),
            }),
            Err(cause) => {
                warn!(scope, error = %cause, "refresh after commit failed");
                Err(ReencryptError {
                    state: TransactionState::Committed,
                    report,
                    cause,
                })
            }
        }
    }

    async fn transform(
        &self,
        path: &str,
        key: &UnlockedKey<'_>,
        records: &[PublicKeyRecord],
    ) -> Result<(String, Vec<u8>)> {
        let file = self.store.get_file(path).await?;
        let message = self
            .engine
            .deserialize(&file.ciphertext)
            .map_err(VaultError::Decryption)?;
        let plaintext = Zeroizing::new(
            self.engine
                .decrypt_with(&message, key.handle())
                .map_err(VaultError::Decryption)?,
        );

        let sealed = self
            .engine
            .encrypt_for(&plaintext, records)
            .map_err(VaultError::Encryption)?;
        let bytes = self.engine.serialize(&sealed).map_err(VaultError::Encryption)?;
        Ok((path.to_string(), bytes))
    }

    async fn refresh(&self, scope: &str) -> Result<RefreshedScope> {
        let acl = self.store.get_perm(scope).await?;
        let files = try_join_all(acl.change_set.iter().map(|path| self.store.get_file(path))).await?;
        Ok(RefreshedScope { acl, files })
    }
}

/// Public keys for every id, in `ids` order.
///
/// Fails with [`VaultError::KeyResolution`] naming every id the registry
/// does not know.
pub(crate) async fn resolve_keys<S: PassStore + ?Sized>(
    store: &S,
    ids: &[KeyId],
) -> Result<Vec<PublicKeyRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut found = store.get_public_keys(ids).await?;
    let missing: Vec<KeyId> = ids
        .iter()
        .filter(|id| !found.contains_key(*id))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(VaultError::KeyResolution { missing });
    }

    Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
}
