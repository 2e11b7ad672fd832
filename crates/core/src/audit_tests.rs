// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn entry(id: u64, prev_hash: String) -> AuditEntry {
    AuditEntry {
        id,
        timestamp_ms: 1_000 + id,
        probe: "system.disk.usage".into(),
        source: AuditSource::Agent("srv1".into()),
        status: ProbeStatus::Success,
        duration_ms: 5,
        api_key_id: None,
        response_digest: None,
        prev_hash,
    }
}

fn chain(n: u64) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = Vec::new();
    for i in 0..n {
        let prev = entries.last().map(entry_hash).unwrap_or_default();
        entries.push(entry(i, prev));
    }
    entries
}

#[test]
fn intact_chain_verifies() {
    let entries = chain(5);
    assert_eq!(verify_chain(&entries), ChainCheck { valid: true, broken_at: None });
}

#[test]
fn empty_and_single_entry_chains_verify() {
    assert!(verify_chain(&[]).valid);
    assert!(verify_chain(&chain(1)).valid);
}

#[test]
fn mutating_middle_entry_breaks_successor() {
    // Three entries, overwrite status on the second; the third entry's
    // stored prev_hash no longer matches.
    let mut entries = chain(3);
    entries[1].status = ProbeStatus::Error;

    let check = verify_chain(&entries);
    assert!(!check.valid);
    assert_eq!(check.broken_at, Some(3));
}

#[test]
fn nonempty_genesis_prev_hash_breaks_at_one() {
    let mut entries = chain(2);
    entries[0].prev_hash = "deadbeef".into();
    assert_eq!(verify_chain(&entries).broken_at, Some(1));
}

#[test]
fn hash_is_sensitive_to_every_field() {
    let a = entry(7, String::new());
    let mut b = a.clone();
    b.duration_ms += 1;
    assert_ne!(entry_hash(&a), entry_hash(&b));

    let mut c = a.clone();
    c.response_digest = Some("d".into());
    assert_ne!(entry_hash(&a), entry_hash(&c));
}

#[test]
fn ring_chains_appends() {
    let mut ring = AuditRing::new(10);
    for i in 0..3 {
        ring.append(
            1_000 + i,
            "system.uptime",
            AuditSource::Agent("srv1".into()),
            ProbeStatus::Success,
            2,
            None,
        );
    }
    assert_eq!(ring.len(), 3);
    assert!(ring.verify().valid);
}

#[test]
fn ring_eviction_keeps_relative_validity() {
    let mut ring = AuditRing::new(3);
    for i in 0..5 {
        ring.append(
            i,
            "system.uptime",
            AuditSource::Agent("srv1".into()),
            ProbeStatus::Success,
            1,
            None,
        );
    }
    // Two entries evicted; the oldest resident entry has a non-empty
    // prev_hash but the window still verifies.
    assert_eq!(ring.len(), 3);
    let oldest = ring.entries().next().cloned();
    assert!(oldest.is_some_and(|e| !e.prev_hash.is_empty()));
    assert!(ring.verify().valid);
}

#[test]
fn ring_detects_tamper_in_window() {
    let mut ring = AuditRing::new(10);
    for i in 0..4 {
        ring.append(
            i,
            "system.uptime",
            AuditSource::Integration("httpbin".into()),
            ProbeStatus::Success,
            1,
            None,
        );
    }
    let mut entries: Vec<AuditEntry> = ring.entries().cloned().collect();
    entries[2].probe = "tampered".into();
    let check = verify_chain(&entries);
    assert_eq!(check.broken_at, Some(4));
}
