//! Proptest generators for property-based testing.

use proptest::prelude::*;

use passvault_core::KeyId;

/// Generate a random KeyId.
pub fn key_id() -> impl Strategy<Value = KeyId> {
    any::<[u8; 8]>().prop_map(KeyId::from_bytes)
}

/// Generate up to `max` distinct key ids, in generation order.
pub fn key_ids(max: usize) -> impl Strategy<Value = Vec<KeyId>> {
    prop::collection::vec(key_id(), 0..=max).prop_map(|ids| {
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        unique
    })
}

/// Generate a path component.
pub fn component() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9._-]{0,11}".prop_map(String::from)
}

/// Generate a raw path as a user might type it: optional leading slash,
/// repeated separators, optional trailing slash.
pub fn raw_path() -> impl Strategy<Value = String> {
    (
        any::<bool>(),
        prop::collection::vec((component(), 1usize..=3), 0..=5),
        any::<bool>(),
    )
        .prop_map(|(leading, parts, trailing)| {
            let mut raw = String::new();
            if leading {
                raw.push('/');
            }
            for (i, (part, slashes)) in parts.iter().enumerate() {
                if i > 0 {
                    raw.push_str(&"/".repeat(*slashes));
                }
                raw.push_str(part);
            }
            if trailing {
                raw.push('/');
            }
            raw
        })
}

/// Generate a non-empty secret.
pub fn secret(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}
