// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured integration lifecycle events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationEventType {
    Created,
    ConfigUpdate,
    TestConnection,
    ProbeExecution,
    CredentialRefresh,
    Deleted,
}

impl std::fmt::Display for IntegrationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::ConfigUpdate => "config_update",
            Self::TestConnection => "test_connection",
            Self::ProbeExecution => "probe_execution",
            Self::CredentialRefresh => "credential_refresh",
            Self::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// One recorded event against an integration. Deleting the integration
/// cascades to its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub timestamp_ms: u64,
    pub integration_id: String,
    pub event_type: IntegrationEventType,
    /// "success" / "error" / pack-specific.
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}
