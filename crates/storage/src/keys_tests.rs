// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::Store;
use serde_json::json;

fn store() -> Store {
    Store::open_in_memory(None).unwrap()
}

#[test]
fn minted_key_validates_and_carries_policy() {
    let store = store();
    let policy = json!({"scope": "agent:srv1"});
    let (key_id, full) = store.create_api_key(&policy, 1_000).unwrap();
    assert!(full.starts_with(&format!("{key_id}.")));

    let rec = store.validate_api_key(&full).unwrap().unwrap();
    assert_eq!(rec.key_id, key_id);
    assert_eq!(rec.policy["scope"], "agent:srv1");
}

#[test]
fn wrong_secret_or_shape_fails_validation() {
    let store = store();
    let (key_id, _full) = store.create_api_key(&json!({}), 1_000).unwrap();
    assert!(store.validate_api_key(&format!("{key_id}.deadbeef")).unwrap().is_none());
    assert!(store.validate_api_key("no-dot-here").unwrap().is_none());
    assert!(store.validate_api_key("key-ghost.aaaa").unwrap().is_none());
}

#[test]
fn revoked_key_stops_validating() {
    let store = store();
    let (key_id, full) = store.create_api_key(&json!({}), 1_000).unwrap();
    assert!(store.revoke_api_key(&key_id, 2_000).unwrap());
    assert!(store.validate_api_key(&full).unwrap().is_none());
    // Second revoke is a no-op.
    assert!(!store.revoke_api_key(&key_id, 3_000).unwrap());
}
