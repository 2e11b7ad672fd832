// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn open_in_memory_migrates_to_latest() {
    let store = Store::open_in_memory(None).unwrap();
    assert_eq!(store.schema_version().unwrap(), 3);
    assert!(!store.has_secret());
}

#[test]
fn open_on_disk_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hub.db");
    {
        let store = Store::open(&path, Some("s3cret")).unwrap();
        assert!(store.has_secret());
    }
    // Re-opening an already-migrated database applies nothing new.
    let store = Store::open(&path, Some("s3cret")).unwrap();
    assert_eq!(store.schema_version().unwrap(), 3);
}
