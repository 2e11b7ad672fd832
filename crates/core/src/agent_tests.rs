// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn effective_status_reads_stale_heartbeat_as_offline() {
    let mut rec = AgentRecord::new(AgentId::generate(), "srv1", 1_000_000);
    rec.status = AgentStatus::Online;

    // Within 2x the interval the stored status holds.
    assert_eq!(
        rec.effective_status(1_000_000 + 2 * HEARTBEAT_INTERVAL_MS),
        AgentStatus::Online
    );
    // One past the window reads offline.
    assert_eq!(
        rec.effective_status(1_000_000 + 2 * HEARTBEAT_INTERVAL_MS + 1),
        AgentStatus::Offline
    );
}

#[test]
fn degraded_status_survives_fresh_heartbeat() {
    let mut rec = AgentRecord::new(AgentId::generate(), "srv1", 5_000);
    rec.status = AgentStatus::Degraded;
    assert_eq!(rec.effective_status(5_001), AgentStatus::Degraded);
}

#[test]
fn empty_attestation_is_detected() {
    assert!(Attestation::default().is_empty());
    let a = Attestation { os_version: "linux 6.1".into(), ..Default::default() };
    assert!(!a.is_empty());
}

#[test]
fn attestation_serializes_camel_case() {
    let a = Attestation { binary_hash: "abc".into(), ..Default::default() };
    let v = a.to_value();
    assert_eq!(v["binaryHash"], "abc");
    assert_eq!(v["osVersion"], "");
}
