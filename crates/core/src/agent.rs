// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable agent records.
//!
//! An `AgentRecord` is the hub's persisted view of one enrolled agent. It is
//! created by the first successful registration and mutated on heartbeat,
//! re-registration, probe responses, and attestation updates; the core never
//! deletes it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::AgentId;

/// Agent-driven heartbeat cadence. A record whose `last_seen_ms` trails by
/// more than twice this is read as offline.
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Stored status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    /// Attestation baseline mismatch without a version change.
    Degraded,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// One loaded pack as reported by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackStatus {
    pub name: String,
    pub version: String,
    /// "active", "disabled", or a pack-specific state string.
    pub status: String,
}

/// Identity-affecting snapshot reported at registration.
///
/// Compared against the stored baseline to detect tampering across
/// reconnects; a version change legitimizes a differing snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub binary_hash: String,
    #[serde(default)]
    pub packs: Vec<String>,
    #[serde(default)]
    pub config_hash: String,
    #[serde(default)]
    pub runtime_version: String,
}

impl Attestation {
    pub fn is_empty(&self) -> bool {
        self == &Attestation::default()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Persisted record of one enrolled agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub os: String,
    pub version: String,
    #[serde(default)]
    pub packs: Vec<PackStatus>,
    pub last_seen_ms: u64,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_pem: Option<String>,
    /// SPKI PEM of the agent's envelope-signing key. Present iff a
    /// certificate was issued; its presence makes signatures mandatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_key_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
    #[serde(default)]
    pub attestation_mismatch: bool,
}

impl AgentRecord {
    pub fn new(id: AgentId, name: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            os: String::new(),
            version: String::new(),
            packs: Vec::new(),
            last_seen_ms: now_ms,
            status: AgentStatus::Online,
            cert_fingerprint: None,
            cert_pem: None,
            pub_key_pem: None,
            attestation: None,
            attestation_mismatch: false,
        }
    }

    /// Status as read at `now_ms`: a stale heartbeat reads as offline
    /// regardless of the stored status (eviction happens only on socket
    /// close, so the stored status may lag).
    pub fn effective_status(&self, now_ms: u64) -> AgentStatus {
        if now_ms.saturating_sub(self.last_seen_ms) > 2 * HEARTBEAT_INTERVAL_MS {
            AgentStatus::Offline
        } else {
            self.status
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
