// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed payload schemas, keyed on the envelope type tag.
//!
//! Probe request/response payloads are `sonde_core::ProbeRequest` and
//! `sonde_core::ProbeResponse` carried verbatim.

use serde::{Deserialize, Serialize};

use sonde_core::{AgentId, Attestation, PackStatus};

/// Error text for a malformed or schema-invalid frame.
pub const ERR_INVALID_MESSAGE: &str = "Invalid message format";
/// Error text for a frame claiming a different agent id than the socket.
pub const ERR_AGENT_ID_MISMATCH: &str = "Agent ID mismatch";

/// `agent.register` — announce identity and capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub name: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub packs: Vec<PackStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
}

/// `hub.ack` — response to register. On rejection only `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_pem: Option<String>,
    /// SPKI PEM for verifying hub-signed envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_key_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl AckPayload {
    pub fn rejection(reason: impl Into<String>) -> Self {
        Self { error: Some(reason.into()), ..Default::default() }
    }
}

/// `agent.heartbeat` — liveness; resets last-seen.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeartbeatPayload {}

/// `hub.update_available` — version advisory after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailablePayload {
    pub current_version: String,
    pub latest_version: String,
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
