// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Probe request/response types.
//!
//! These structs are carried verbatim inside wire payloads, so their JSON
//! spelling is camelCase to match the protocol.

use crate::id::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default deadline for an outbound probe when the manifest does not
/// override it.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 30_000;

/// A single probe invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequest {
    /// Fully-qualified probe name (`pack.probe`).
    pub probe: String,
    /// Free-form parameter map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    /// Deadline in milliseconds.
    pub timeout_ms: u64,
    /// Opaque requester tag (api-key id, tool name, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    /// Echoed in the response for correlation.
    pub request_id: RequestId,
}

impl ProbeRequest {
    pub fn new(probe: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
            params: BTreeMap::new(),
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            requester: None,
            request_id: RequestId::new(),
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Parameters as a JSON object value (for fingerprints and handlers).
    pub fn params_value(&self) -> Value {
        let map: serde_json::Map<String, Value> =
            self.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Value::Object(map)
    }
}

/// Outcome classification of a probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    Error,
    Timeout,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Self-declared permission tier of a probe handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityLevel {
    Observe,
    Act,
    Admin,
}

impl Default for CapabilityLevel {
    fn default() -> Self {
        Self::Observe
    }
}

/// Provenance metadata attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeMetadata {
    pub agent_version: String,
    pub pack_name: String,
    pub pack_version: String,
    #[serde(default)]
    pub capability_level: CapabilityLevel,
}

/// The structured reply to a [`ProbeRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub probe: String,
    pub status: ProbeStatus,
    /// Free-form on success, `{"error": message}` on failure.
    pub data: Value,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    pub metadata: ProbeMetadata,
}

impl ProbeResponse {
    /// Build an error response in the shape every failure takes.
    pub fn error(
        probe: impl Into<String>,
        message: impl Into<String>,
        duration_ms: u64,
        metadata: ProbeMetadata,
    ) -> Self {
        Self {
            probe: probe.into(),
            status: ProbeStatus::Error,
            data: serde_json::json!({ "error": message.into() }),
            duration_ms,
            request_id: None,
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProbeStatus::Success
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
