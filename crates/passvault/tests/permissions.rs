//! Permission edits end to end: access list rules, re-encryption and the
//! all-or-nothing commit.

use passvault::crypto::CryptoEngine;
use passvault::store::{MemoryStore, PassStore, PassStoreExt, StoreError};
use passvault::{
    KeyId, PermissionKeyUnlocker, ReencryptionCoordinator, TransactionState, Vault, VaultError,
};
use passvault_testkit::{fast_config, seed_store, FixturePrompt, Identity, ProbeStore};

type TestVault = Vault<ProbeStore<MemoryStore>>;

async fn setup(files: &[(&str, &str)]) -> (TestVault, Identity, Identity) {
    let alice = Identity::new("alice");
    let bob = Identity::new("bob");
    let vault = Vault::with_config(ProbeStore::new(MemoryStore::new()), fast_config());
    seed_store(vault.store(), &alice, &[&bob], files).await;
    vault.store().reset_counts();
    (vault, alice, bob)
}

fn memory(vault: &TestVault) -> &MemoryStore {
    vault.store().inner()
}

#[tokio::test]
async fn add_recipient_round_trips_for_every_recipient() -> anyhow::Result<()> {
    let files = [("/team/wifi.gpg", "wpa-key"), ("/team/vpn.gpg", "vpn-pass")];
    let (vault, alice, bob) = setup(&files).await;
    let mut alice_session = alice.session();

    let change = vault
        .add_permission(&mut alice_session, "/team", bob.id(), &alice.prompt())
        .await?;
    let outcome = change.outcome.expect("permission was added");
    assert_eq!(outcome.report.state(), TransactionState::Committed);
    assert_eq!(vault.store().counts().commit_perm, 1);

    let refreshed = outcome.refreshed.expect("refresh is on by default");
    assert_eq!(refreshed.acl.access, vec![alice.id(), bob.id()]);
    assert_eq!(refreshed.files.len(), 2);

    for (owner, mut session) in [(&alice, alice.session()), (&bob, bob.session())] {
        for (path, secret) in files {
            let plain = vault.decrypt_file(&mut session, path, &owner.prompt()).await?;
            assert_eq!(plain.as_slice(), secret.as_bytes());
        }
    }
    Ok(())
}

#[tokio::test]
async fn non_recipient_cannot_decrypt() {
    let (vault, _alice, _bob) = setup(&[("/a.gpg", "secret")]).await;
    let carol = Identity::new("carol");

    let mut carol_key = carol.private_key();
    carol_key.unlock(&carol.passphrase).unwrap();

    let file = memory(&vault).get_file("/a.gpg").await.unwrap();
    let engine = CryptoEngine::new();
    let message = engine.deserialize(&file.ciphertext).unwrap();
    assert!(engine.decrypt_with(&message, &carol_key).is_err());

    let err = vault
        .decrypt_file(&mut carol.session(), "/a.gpg", &carol.prompt())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotAuthorized(_)));
}

#[tokio::test]
async fn adding_existing_recipient_writes_nothing() {
    let (vault, alice, _bob) = setup(&[("/a.gpg", "x")]).await;
    let prompt = alice.prompt();
    let before = memory(&vault).scopes();

    let change = vault
        .add_permission(&mut alice.session(), "/", alice.id(), &prompt)
        .await
        .unwrap();

    assert!(change.delta.is_noop());
    assert!(change.outcome.is_none());
    assert_eq!(vault.store().counts().writes(), 0);
    assert_eq!(prompt.calls(), 0);
    assert_eq!(memory(&vault).scopes(), before);
}

#[tokio::test]
async fn root_keeps_at_least_one_recipient() {
    let (vault, alice, _bob) = setup(&[("/a.gpg", "x")]).await;
    let before = memory(&vault).files();

    let err = vault
        .remove_permission(&mut alice.session(), "/", alice.id(), &alice.prompt())
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::Validation(_)));
    assert_eq!(vault.store().counts().commit_perm, 0);
    assert_eq!(memory(&vault).scopes()["/"], vec![alice.id()]);
    assert_eq!(memory(&vault).files(), before);
}

#[tokio::test]
async fn removing_absent_recipient_is_rejected() {
    let (vault, alice, bob) = setup(&[]).await;
    let err = vault
        .remove_permission(&mut alice.session(), "/", bob.id(), &alice.prompt())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Validation(_)));
}

#[tokio::test]
async fn corrupt_file_aborts_whole_transaction() {
    let files = [("/a.gpg", "one"), ("/b.gpg", "two"), ("/c.gpg", "three")];
    let (vault, alice, bob) = setup(&files).await;
    let before_files = memory(&vault).files();
    let before_scopes = memory(&vault).scopes();
    vault.store().corrupt_fetch("/b.gpg");

    let err = vault
        .add_permission(&mut alice.session(), "/", bob.id(), &alice.prompt())
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::Decryption(_)));
    assert_eq!(vault.store().counts().commit_perm, 0);
    assert_eq!(memory(&vault).files(), before_files);
    assert_eq!(memory(&vault).scopes(), before_scopes);
}

#[tokio::test]
async fn failed_fetch_aborts_whole_transaction() {
    let files = [("/a.gpg", "one"), ("/b.gpg", "two")];
    let (vault, alice, bob) = setup(&files).await;
    let before = memory(&vault).files();
    vault.store().fail_fetch("/a.gpg");

    let err = vault
        .add_permission(&mut alice.session(), "/", bob.id(), &alice.prompt())
        .await
        .unwrap_err();

    assert!(err.is_persistence());
    assert_eq!(vault.store().counts().commit_perm, 0);
    assert_eq!(memory(&vault).files(), before);
}

#[tokio::test]
async fn removed_recipient_loses_access() -> anyhow::Result<()> {
    let files = [("/team/a.gpg", "one"), ("/team/b.gpg", "two"), ("/c.gpg", "three")];
    let (vault, alice, bob) = setup(&files).await;
    let mut alice_session = alice.session();
    let prompt = alice.prompt();

    vault
        .add_permission(&mut alice_session, "/team", bob.id(), &prompt)
        .await?;
    vault
        .remove_permission(&mut alice_session, "/team", alice.id(), &prompt)
        .await?;

    let acl = vault.store().get_perm("/team").await?;
    assert_eq!(acl.access, vec![bob.id()]);

    let mut bob_session = bob.session();
    for (path, secret) in &files[..2] {
        let file = vault.store().get_file(path).await?;
        assert_eq!(file.recipients, vec![bob.id()]);
        let plain = vault.decrypt_file(&mut bob_session, path, &bob.prompt()).await?;
        assert_eq!(plain.as_slice(), secret.as_bytes());

        let err = vault
            .decrypt_file(&mut alice_session, path, &prompt)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotAuthorized(_)));
    }

    // Outside the edited scope nothing changed.
    let plain = vault.decrypt_file(&mut alice_session, "/c.gpg", &prompt).await?;
    assert_eq!(plain.as_slice(), b"three");
    assert_eq!(prompt.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_recipient_aborts_before_any_fetch() {
    let (vault, alice, _bob) = setup(&[("/a.gpg", "one"), ("/b.gpg", "two")]).await;
    let stranger = KeyId::from_bytes([0x5a; 8]);

    let err = vault
        .add_permission(&mut alice.session(), "/", stranger, &alice.prompt())
        .await
        .unwrap_err();

    match err {
        VaultError::KeyResolution { missing } => assert_eq!(missing, vec![stranger]),
        other => panic!("expected key resolution error, got {other:?}"),
    }
    let counts = vault.store().counts();
    assert_eq!(counts.get_pass, 0);
    assert_eq!(counts.commit_perm, 0);
}

#[tokio::test]
async fn commit_failure_is_surfaced_unchanged() {
    let (vault, alice, bob) = setup(&[("/a.gpg", "one")]).await;
    let before = memory(&vault).files();
    vault.store().fail_commit();

    let err = vault
        .add_permission(&mut alice.session(), "/", bob.id(), &alice.prompt())
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::Persistence(StoreError::Rejected(_))));
    assert_eq!(vault.store().counts().commit_perm, 1);
    assert_eq!(memory(&vault).files(), before);
    assert_eq!(memory(&vault).scopes()["/"], vec![alice.id()]);
}

#[tokio::test]
async fn only_a_current_recipient_may_edit() {
    let (vault, _alice, bob) = setup(&[("/a.gpg", "one")]).await;
    let carol = Identity::new("carol");
    vault.store().add_public_key(&carol.public).await.unwrap();
    vault.store().reset_counts();

    let err = vault
        .add_permission(&mut bob.session(), "/", carol.id(), &bob.prompt())
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::NotAuthorized(_)));
    assert_eq!(vault.store().counts().writes(), 0);
}

#[tokio::test]
async fn stale_change_set_is_a_conflict() {
    let (vault, alice, bob) = setup(&[("/a.gpg", "one")]).await;
    let acl = vault.store().get_perm("/").await.unwrap();

    // Someone else adds a file after we read the access list.
    vault
        .add_file("/", "late", b"two", &[alice.id()])
        .await
        .unwrap();

    let mut key = alice.private_key();
    let prompt = alice.prompt();
    let unlocked = PermissionKeyUnlocker::new(&prompt)
        .ensure_unlocked(&mut key)
        .unwrap();
    let err = ReencryptionCoordinator::new(vault.store())
        .reencrypt(&acl.path, &[alice.id(), bob.id()], &unlocked, &acl.change_set)
        .await
        .unwrap_err();

    assert_eq!(err.state, TransactionState::Persisting);
    assert!(matches!(&err.cause, VaultError::Persistence(e) if e.is_conflict()));
    assert_eq!(memory(&vault).scopes()["/"], vec![alice.id()]);
}

#[tokio::test]
async fn new_scope_leaves_parent_untouched() -> anyhow::Result<()> {
    let files = [("/a.gpg", "root"), ("/ops/db.gpg", "db")];
    let (vault, alice, bob) = setup(&files).await;

    vault
        .add_permission(&mut alice.session(), "/ops", bob.id(), &alice.prompt())
        .await?;

    let root = vault.store().get_perm("/").await?;
    assert_eq!(root.access, vec![alice.id()]);
    assert_eq!(root.change_set, vec!["/a.gpg".to_string()]);

    let ops = vault.store().get_perm("/ops").await?;
    assert_eq!(ops.access, vec![alice.id(), bob.id()]);
    assert_eq!(ops.change_set, vec!["/ops/db.gpg".to_string()]);
    Ok(())
}

#[tokio::test]
async fn edit_file_uses_directory_recipients() -> anyhow::Result<()> {
    let (vault, alice, bob) = setup(&[("/ops/db.gpg", "old")]).await;
    vault
        .add_permission(&mut alice.session(), "/ops", bob.id(), &alice.prompt())
        .await?;

    vault.edit_file("/ops/db.gpg", b"new").await?;

    let file = vault.store().get_file("/ops/db.gpg").await?;
    assert_eq!(file.recipients, vec![alice.id(), bob.id()]);
    let plain = vault
        .decrypt_file(&mut bob.session(), "/ops/db.gpg", &bob.prompt())
        .await?;
    assert_eq!(plain.as_slice(), b"new");
    Ok(())
}
