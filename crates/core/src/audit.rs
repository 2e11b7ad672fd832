// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, hash-chained audit records.
//!
//! Every probe execution appends one entry whose `prev_hash` is the SHA-256
//! of the canonical serialization of its predecessor, making the chain
//! tamper-evident. Hashing serializes the entry struct as JSON in field
//! declaration order; that order is part of the format and must not be
//! reordered without a migration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::probe::ProbeStatus;

/// Where a probe executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum AuditSource {
    /// Executed on a remote agent (by name).
    Agent(String),
    /// Executed server-side by an integration pack (by pack name).
    Integration(String),
}

/// One link in the audit chain.
///
/// Field order is the hashing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotone per-store id (ring entries restart per process).
    pub id: u64,
    pub timestamp_ms: u64,
    pub probe: String,
    pub source: AuditSource,
    pub status: ProbeStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,
    /// SHA-256 hex of the canonical response data, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_digest: Option<String>,
    /// Hash of the predecessor entry; empty for the genesis entry.
    pub prev_hash: String,
}

/// SHA-256 hex over the canonical serialization of an entry.
pub fn entry_hash(entry: &AuditEntry) -> String {
    let json = serde_json::to_string(entry).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

/// Result of a chain walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainCheck {
    pub valid: bool,
    /// 1-indexed position of the first entry whose `prev_hash` does not
    /// match; absent when the chain verifies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
}

impl ChainCheck {
    fn ok() -> Self {
        Self { valid: true, broken_at: None }
    }

    fn broken(position: usize) -> Self {
        Self { valid: false, broken_at: Some(position) }
    }
}

/// Verify an anchored chain: the first entry must carry an empty
/// `prev_hash`, and every successor must hash-link to its predecessor.
pub fn verify_chain(entries: &[AuditEntry]) -> ChainCheck {
    if let Some(first) = entries.first() {
        if !first.prev_hash.is_empty() {
            return ChainCheck::broken(1);
        }
    }
    verify_links(entries)
}

fn verify_links(entries: &[AuditEntry]) -> ChainCheck {
    for i in 1..entries.len() {
        if entries[i].prev_hash != entry_hash(&entries[i - 1]) {
            return ChainCheck::broken(i + 1);
        }
    }
    ChainCheck::ok()
}

/// Bounded FIFO audit buffer kept by the agent process.
///
/// Once the ring has evicted its genesis entry, chain validity is only
/// meaningful from the oldest still-present entry, so `verify` skips the
/// empty-genesis check after the first eviction.
#[derive(Debug)]
pub struct AuditRing {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
    next_id: u64,
    evicted: bool,
}

pub const DEFAULT_RING_CAPACITY: usize = 1000;

impl AuditRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_RING_CAPACITY)),
            capacity: capacity.max(1),
            next_id: 0,
            evicted: false,
        }
    }

    /// Append one execution record, chaining it to the current tail.
    pub fn append(
        &mut self,
        timestamp_ms: u64,
        probe: impl Into<String>,
        source: AuditSource,
        status: ProbeStatus,
        duration_ms: u64,
        response_digest: Option<String>,
    ) -> &AuditEntry {
        let prev_hash = self.entries.back().map(entry_hash).unwrap_or_default();
        let entry = AuditEntry {
            id: self.next_id,
            timestamp_ms,
            probe: probe.into(),
            source,
            status,
            duration_ms,
            api_key_id: None,
            response_digest,
            prev_hash,
        };
        self.next_id += 1;
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.evicted = true;
        }
        match self.entries.back() {
            Some(entry) => entry,
            // Just pushed; the back exists.
            None => unreachable!("ring append left an empty buffer"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// Verify the resident window of the chain.
    pub fn verify(&self) -> ChainCheck {
        let slice: Vec<AuditEntry> = self.entries.iter().cloned().collect();
        if self.evicted {
            verify_links(&slice)
        } else {
            verify_chain(&slice)
        }
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
