//! Navigation and the re-encryption post-condition over generated trees.

use std::collections::BTreeSet;

use proptest::prelude::*;

use passvault::store::{MemoryStore, PassStoreExt};
use passvault::Vault;
use passvault_testkit::generators::{component, secret};
use passvault_testkit::{fast_config, seed_store, Identity};

#[tokio::test]
async fn browse_normalizes_raw_paths() {
    let alice = Identity::new("alice");
    let vault = Vault::with_config(MemoryStore::new(), fast_config());
    seed_store(vault.store(), &alice, &[], &[("/a/b/c.gpg", "x"), ("/a/b/d/e.gpg", "y")]).await;

    let mut session = alice.session();
    let view = vault.browse(&mut session, "a//b/").await.unwrap();

    let crumbs: Vec<&str> = view.breadcrumbs.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(crumbs, vec!["/", "/a", "/a/b"]);
    assert_eq!(view.breadcrumbs[0].name, "root");

    let dirs: Vec<&str> = view.dirs().iter().map(|n| n.path.as_str()).collect();
    let files: Vec<&str> = view.files().iter().map(|n| n.name()).collect();
    assert_eq!(dirs, vec!["/a/b/d"]);
    assert_eq!(files, vec!["c"]);
    assert_eq!(view.permission_key, Some(alice.id()));
}

#[tokio::test]
async fn browse_file_selects_permission_key() {
    let alice = Identity::new("alice");
    let bob = Identity::new("bob");
    let vault = Vault::with_config(MemoryStore::new(), fast_config());
    seed_store(vault.store(), &alice, &[&bob], &[("/a.gpg", "x")]).await;

    let view = vault.browse(&mut bob.session(), "/a.gpg").await.unwrap();
    assert!(!view.is_dir());
    assert_eq!(view.recipients, vec![alice.id()]);
    assert_eq!(view.permission_key, None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn every_file_in_scope_follows_new_access(
        names in prop::collection::btree_set(component(), 1..5),
        nested in prop::collection::btree_set(component(), 0..3),
        payload in secret(64),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let alice = Identity::new("alice");
            let bob = Identity::new("bob");
            let vault = Vault::with_config(MemoryStore::new(), fast_config());

            let text = String::from_utf8_lossy(&payload).into_owned();
            let mut paths: BTreeSet<String> = names.iter().map(|n| format!("/s/{}.gpg", n)).collect();
            paths.extend(nested.iter().map(|n| format!("/s/sub/{}.gpg", n)));
            let files: Vec<(&str, &str)> = paths.iter().map(|p| (p.as_str(), text.as_str())).collect();
            seed_store(vault.store(), &alice, &[&bob], &files).await;

            vault
                .add_permission(&mut alice.session(), "/s", bob.id(), &alice.prompt())
                .await
                .unwrap();

            let mut bob_session = bob.session();
            let prompt = bob.prompt();
            for path in &paths {
                let file = vault.store().get_file(path).await.unwrap();
                assert_eq!(file.recipients, vec![alice.id(), bob.id()]);
                let plain = vault.decrypt_file(&mut bob_session, path, &prompt).await.unwrap();
                assert_eq!(plain.as_slice(), text.as_bytes());
            }
            assert_eq!(prompt.calls(), 1);
        });
    }
}
