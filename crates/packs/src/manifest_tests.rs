// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn manifest() -> PackManifest {
    PackManifest {
        name: "demo".into(),
        version: "0.1.0".into(),
        description: "demo pack".into(),
        requires: Requires::default(),
        probes: vec![ProbeSpec {
            name: "ping".into(),
            description: "ping".into(),
            capability: sonde_core::CapabilityLevel::Observe,
            params: Some(ParamSchema { required: vec!["host".into()] }),
            timeout_ms: Some(5_000),
        }],
        detect: None,
        runbook: None,
        signature: None,
    }
}

#[test]
fn probe_lookup_uses_in_pack_name() {
    let m = manifest();
    assert!(m.probe("ping").is_some());
    assert!(m.probe("demo.ping").is_none());
}

#[test]
fn param_schema_lists_missing_required() {
    let schema = ParamSchema { required: vec!["host".into(), "port".into()] };
    assert_eq!(schema.missing(&json!({"host": "a"})), vec!["port"]);
    assert!(schema.missing(&json!({"host": "a", "port": 80})).is_empty());
    assert!(schema.requires_input());
    assert!(!ParamSchema::default().requires_input());
}

#[test]
fn canonical_bytes_exclude_the_signature() {
    let unsigned = manifest();
    let mut signed = manifest();
    signed.signature = Some("sig".into());
    assert_eq!(unsigned.canonical_bytes(), signed.canonical_bytes());
}

#[test]
fn canonical_bytes_are_key_sorted() {
    let bytes = manifest().canonical_bytes();
    let text = String::from_utf8(bytes).unwrap();
    let desc = text.find("\"description\"").unwrap();
    let name = text.find("\"name\"").unwrap();
    assert!(desc < name);
}

#[test]
fn requires_empty_detection() {
    assert!(Requires::default().is_empty());
    let r = Requires { commands: vec!["df".into()], ..Default::default() };
    assert!(!r.is_empty());
}
