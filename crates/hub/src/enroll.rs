// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration and enrollment handling.
//!
//! A register frame either reuses an API-key-authenticated identity or
//! consumes a one-time enrollment token. Token consumption mints the
//! agent's long-lived API key and, when a CA is held, its certificate and
//! signing key. Agent ids are stable per name across re-registration.

use sonde_core::{version_lt, AgentRecord, AgentStatus};
use sonde_storage::{Store, StoreError};
use sonde_wire::{AckPayload, RegisterPayload, UpdateAvailablePayload};

use crate::identity::Ca;

/// Result of processing one register frame.
pub struct EnrollOutcome {
    pub ack: AckPayload,
    /// Close the socket after sending the ack (token rejection).
    pub close: bool,
    /// The registered agent; absent on rejection.
    pub agent: Option<AgentRecord>,
    /// Version advisory to send after the ack, when applicable.
    pub advisory: Option<UpdateAvailablePayload>,
}

/// Process `agent.register`.
///
/// `upgrade_token` is the bearer credential presented at upgrade time when
/// it was an enrollment token — the frame may carry the token either way.
pub fn handle_register(
    store: &Store,
    ca: Option<&Ca>,
    payload: &RegisterPayload,
    upgrade_token: Option<&str>,
    now_ms: u64,
) -> Result<EnrollOutcome, StoreError> {
    if payload.name.is_empty() {
        return Ok(EnrollOutcome {
            ack: AckPayload::rejection("Agent name is required"),
            close: true,
            agent: None,
            advisory: None,
        });
    }

    let token = payload.enrollment_token.as_deref().or(upgrade_token);
    let enrolling = token.is_some();
    if let Some(token) = token {
        if let Err(rejection) =
            store.consume_enrollment_token(token, &payload.name, now_ms)?
        {
            tracing::warn!(agent = %payload.name, %rejection, "enrollment token rejected");
            return Ok(EnrollOutcome {
                ack: AckPayload::rejection(format!("Enrollment token rejected: {rejection}")),
                close: true,
                agent: None,
                advisory: None,
            });
        }
        tracing::info!(agent = %payload.name, "enrollment token consumed");
    }

    let previous = store.agent_by_name(&payload.name)?;
    let record =
        store.upsert_agent(&payload.name, &payload.os, &payload.version, &payload.packs, now_ms)?;

    // Attestation baseline: a differing snapshot without a version change
    // marks the agent degraded; a self-update resets the baseline.
    if let Some(attestation) = payload.attestation.as_ref().filter(|a| !a.is_empty()) {
        let mut mismatch = false;
        if let Some(prev) = &previous {
            let baseline = prev.attestation.as_ref().filter(|a| !a.is_empty());
            if let Some(baseline) = baseline {
                if baseline != attestation && prev.version == payload.version {
                    mismatch = true;
                    tracing::warn!(agent = %payload.name, "attestation mismatch; marking degraded");
                    store.set_agent_status(&record.id, AgentStatus::Degraded)?;
                }
            }
        }
        store.set_agent_attestation(&record.id, attestation, mismatch)?;
    }

    let mut ack = AckPayload { agent_id: Some(record.id.clone()), ..Default::default() };

    if let Some(ca) = ca {
        match ca.hub_public_key_pem() {
            Ok(pem) => ack.hub_key_pem = Some(pem),
            Err(e) => tracing::error!(error = %e, "hub public key unavailable"),
        }
        if enrolling {
            match ca.issue_agent_cert(&payload.name) {
                Ok(issued) => {
                    store.set_agent_cert(
                        &record.id,
                        &issued.fingerprint,
                        &issued.cert_pem,
                        &issued.public_key_pem,
                    )?;
                    ack.cert_pem = Some(issued.cert_pem);
                    ack.key_pem = Some(issued.key_pem);
                    ack.ca_cert_pem = Some(ca.cert_pem().to_string());
                }
                // Enrollment still succeeds without mTLS material.
                Err(e) => tracing::error!(agent = %payload.name, error = %e,
                    "certificate issuance failed"),
            }
        }
    }

    let policy = serde_json::json!({ "scope": format!("agent:{}", payload.name) });
    let (_key_id, full_key) = store.create_api_key(&policy, now_ms)?;
    ack.api_key = Some(full_key);

    let advisory = match store.setting(sonde_storage::LATEST_AGENT_VERSION)? {
        Some(latest) if version_lt(&payload.version, &latest) => Some(UpdateAvailablePayload {
            current_version: payload.version.clone(),
            latest_version: latest,
        }),
        _ => None,
    };

    let agent = store.agent_by_id(&record.id)?;
    Ok(EnrollOutcome { ack, close: false, agent, advisory })
}

#[cfg(test)]
#[path = "enroll_tests.rs"]
mod tests;
