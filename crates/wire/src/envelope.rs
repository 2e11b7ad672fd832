// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message envelope — the only frame exchanged over the agent socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use sonde_core::AgentId;

/// Maximum frame size, enforced on both encode and decode.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Enumerated envelope type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "agent.register")]
    AgentRegister,
    #[serde(rename = "agent.heartbeat")]
    AgentHeartbeat,
    #[serde(rename = "hub.ack")]
    HubAck,
    #[serde(rename = "hub.update_available")]
    HubUpdateAvailable,
    #[serde(rename = "probe.request")]
    ProbeRequest,
    #[serde(rename = "probe.response")]
    ProbeResponse,
    #[serde(rename = "probe.error")]
    ProbeError,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AgentRegister => "agent.register",
            Self::AgentHeartbeat => "agent.heartbeat",
            Self::HubAck => "hub.ack",
            Self::HubUpdateAvailable => "hub.update_available",
            Self::ProbeRequest => "probe.request",
            Self::ProbeResponse => "probe.response",
            Self::ProbeError => "probe.error",
        };
        write!(f, "{s}")
    }
}

/// Errors decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes ({0})")]
    TooLarge(usize),
    #[error("invalid message format: {0}")]
    Schema(String),
}

/// The sole frame type on the agent transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique frame id.
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// ISO-8601 send time. Informational; not covered by the signature.
    pub timestamp: String,
    /// Required on every message from a registered agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Base64 Ed25519 signature over the canonical payload; empty when
    /// unsigned.
    #[serde(default)]
    pub signature: String,
    /// Schema keyed on the type tag.
    pub payload: Value,
}

impl Envelope {
    pub fn new(message_type: MessageType, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            timestamp: chrono::Utc::now().to_rfc3339(),
            agent_id: None,
            signature: String::new(),
            payload,
        }
    }

    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Deserialize the payload into a typed struct.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, WireError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| WireError::Schema(format!("{} payload: {e}", self.message_type)))
    }
}

/// Encode an envelope to a JSON text frame, enforcing the frame cap.
pub fn encode(envelope: &Envelope) -> Result<String, WireError> {
    let text =
        serde_json::to_string(envelope).map_err(|e| WireError::Schema(e.to_string()))?;
    if text.len() > MAX_FRAME_BYTES {
        return Err(WireError::TooLarge(text.len()));
    }
    Ok(text)
}

/// Decode and validate one frame.
pub fn decode(text: &str) -> Result<Envelope, WireError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(WireError::TooLarge(text.len()));
    }
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| WireError::Schema(e.to_string()))?;
    if !envelope.payload.is_object() {
        return Err(WireError::Schema("payload must be an object".into()));
    }
    Ok(envelope)
}

/// A bare error frame (protocol-level; not an envelope).
pub fn error_frame(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
