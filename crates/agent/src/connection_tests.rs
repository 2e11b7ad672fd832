// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use yare::parameterized;

use sonde_packs::FakeExec;
use crate::scrub::Scrubber;

#[parameterized(
    first = { 0, 1_000 },
    second = { 1, 2_000 },
    third = { 2, 4_000 },
    fifth = { 4, 16_000 },
    capped = { 6, 60_000 },
    beyond_cap = { 12, 60_000 },
)]
fn backoff_doubles_to_the_cap(attempts: u32, expected_ms: u64) {
    assert_eq!(backoff_ms(attempts), expected_ms);
}

fn connection(config: AgentConfig, dir: &std::path::Path) -> Arc<Connection> {
    let executor = Arc::new(crate::executor::Executor::new(
        sonde_packs::PackRegistry::local_for_agent(&config.disabled_packs),
        Arc::new(FakeExec::new()),
        Scrubber::default(),
        config.agent_name.clone(),
    ));
    Arc::new(Connection::new(config, dir.join("config.json"), executor))
}

#[test]
fn register_payload_reports_identity_and_packs() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig {
        hub_url: "ws://hub:8420".into(),
        api_key: "k".into(),
        agent_name: "srv1".into(),
        disabled_packs: ["logs".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let conn = connection(config, dir.path());

    let payload = conn.register_payload(Some("tok-1".into()));
    assert_eq!(payload.name, "srv1");
    assert_eq!(payload.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(payload.enrollment_token.as_deref(), Some("tok-1"));
    // logs is filtered out of the registry entirely; the rest are active.
    assert!(payload.packs.iter().all(|p| p.status == "active"));
    assert!(payload.packs.iter().any(|p| p.name == "system"));
    assert!(!payload.packs.iter().any(|p| p.name == "logs"));

    let attestation = payload.attestation.expect("attestation");
    assert!(!attestation.config_hash.is_empty());
    assert!(attestation.packs.iter().any(|p| p.starts_with("system@")));
    assert_eq!(attestation.runtime_version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn attestation_hash_tracks_config_changes() {
    let base = AgentConfig {
        hub_url: "ws://hub:8420".into(),
        api_key: "k".into(),
        agent_name: "srv1".into(),
        ..Default::default()
    };
    let mut changed = base.clone();
    changed.disabled_packs.insert("logs".into());

    let a = build_attestation(&base);
    let b = build_attestation(&changed);
    assert_ne!(a.config_hash, b.config_hash);
    assert_eq!(a.binary_hash, b.binary_hash);
}

#[test]
fn signing_key_loads_from_config_path() {
    let dir = tempfile::tempdir().unwrap();
    let key = EnvelopeKey::generate();
    let key_path = dir.path().join("agent-key.pem");
    std::fs::write(&key_path, key.to_pkcs8_pem().unwrap()).unwrap();

    let config = AgentConfig {
        hub_url: "ws://hub:8420".into(),
        api_key: "k".into(),
        agent_name: "srv1".into(),
        key_path: Some(key_path),
        ..Default::default()
    };
    let conn = connection(config, dir.path());

    // Signed register frames verify against the issued public key.
    let payload = conn.register_payload(None);
    let mut envelope = Envelope::new(
        MessageType::AgentRegister,
        serde_json::to_value(&payload).unwrap(),
    );
    conn.sign(&mut envelope);
    assert!(!envelope.signature.is_empty());
    sonde_wire::verify_payload(
        &key.public_key_pem().unwrap(),
        &envelope.payload,
        &envelope.signature,
    )
    .unwrap();
}

#[test]
fn inbound_verification_uses_the_stored_hub_key() {
    let dir = tempfile::tempdir().unwrap();
    let hub_key = EnvelopeKey::generate();
    let hub_key_path = dir.path().join("hub.pub.pem");
    std::fs::write(&hub_key_path, hub_key.public_key_pem().unwrap()).unwrap();

    let config = AgentConfig {
        hub_url: "ws://hub:8420".into(),
        api_key: "k".into(),
        agent_name: "srv1".into(),
        hub_key_path: Some(hub_key_path),
        ..Default::default()
    };
    let conn = connection(config, dir.path());

    let mut envelope = Envelope::new(MessageType::HubAck, serde_json::json!({"agentId": "a"}));
    envelope.signature = hub_key.sign(&envelope.payload);
    assert!(conn.verify_inbound(&envelope));

    envelope.payload = serde_json::json!({"agentId": "tampered"});
    assert!(!conn.verify_inbound(&envelope));

    // Unsigned frames pass (signature enforcement is hub-side policy).
    envelope.signature = String::new();
    assert!(conn.verify_inbound(&envelope));
}
