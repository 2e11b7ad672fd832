// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn request_ids_carry_prefix_and_are_unique() {
    let a = RequestId::new();
    let b = RequestId::new();
    assert!(a.as_str().starts_with("req-"));
    assert_ne!(a, b);
}

#[test]
fn agent_id_is_uuid_shaped_and_stable() {
    let id = AgentId::generate();
    assert_eq!(id.as_str().len(), 36);
    let parsed = AgentId::from_string(id.as_str());
    assert_eq!(id, parsed);
}

#[test]
fn ids_serialize_as_plain_strings() {
    let id = SocketId::from_string("sck-abc");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"sck-abc\"");
    let back: SocketId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn short_truncates_only_long_strings() {
    assert_eq!(short("abcdef", 4), "abcd");
    assert_eq!(short("ab", 4), "ab");
}

#[test]
fn token_ids_use_tok_prefix() {
    assert!(TokenId::new().as_str().starts_with("tok-"));
    assert!(KeyId::new().as_str().starts_with("key-"));
}
