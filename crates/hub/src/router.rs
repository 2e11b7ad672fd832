// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The probe router: single entrypoint for "execute probe X".
//!
//! Decides the execution plane by probe-name prefix (integration pack vs
//! agent), applies the per-fingerprint result cache, and records one audit
//! entry (plus an integration event for hub-side probes) per execution.

use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use sonde_core::{
    canonical_json, AuditSource, IntegrationEvent, IntegrationEventType, ProbeResponse,
};
use sonde_packs::{split_probe_name, PackRegistry};
use sonde_storage::{Store, StoreError};

use crate::dispatcher::{DispatchError, Dispatcher};
use crate::integration::IntegrationExecutor;

/// Cache TTL for successful responses.
pub const DEFAULT_CACHE_TTL_MS: u64 = 10_000;
/// Best-effort LRU bound on cache entries.
const CACHE_MAX_ENTRIES: usize = 256;

/// Errors that bubble out of the router (everything else rides through as
/// a structured error response).
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Probe '{0}' requires an agent")]
    AgentRequired(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

struct CacheEntry {
    response: ProbeResponse,
    expires_at: Instant,
    last_used: u64,
}

/// Routes probes to agents or integrations.
pub struct ProbeRouter {
    registry: Arc<PackRegistry>,
    dispatcher: Arc<Dispatcher>,
    integrations: Arc<IntegrationExecutor>,
    store: Arc<Store>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    use_seq: Mutex<u64>,
}

impl ProbeRouter {
    pub fn new(
        registry: Arc<PackRegistry>,
        dispatcher: Arc<Dispatcher>,
        integrations: Arc<IntegrationExecutor>,
        store: Arc<Store>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            integrations,
            store,
            cache: Mutex::new(HashMap::new()),
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            use_seq: Mutex::new(0),
        }
    }

    #[cfg(test)]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The cache key: `(probe, canonical params, agent-or-empty)`.
    fn fingerprint(probe: &str, params: &Value, agent: Option<&str>) -> String {
        format!("{probe}|{}|{}", canonical_json(params), agent.unwrap_or(""))
    }

    /// Execute one probe.
    ///
    /// Application-level failures return as `ProbeResponse` with an error
    /// status; only agent-missing, dispatch, and storage failures error.
    pub async fn execute(
        &self,
        probe: &str,
        params: &Value,
        agent: Option<&str>,
        caller: Option<&str>,
    ) -> Result<ProbeResponse, RouterError> {
        let fingerprint = Self::fingerprint(probe, params, agent);

        if let Some(cached) = self.cache_lookup(&fingerprint) {
            tracing::debug!(probe, "cache hit");
            return Ok(cached);
        }

        let is_integration = self.registry.is_integration_probe(probe);
        let (response, source) = if is_integration {
            let response = self.integrations.execute(probe, params).await;
            let pack = split_probe_name(probe).map(|(p, _)| p).unwrap_or(probe);
            (response, AuditSource::Integration(pack.to_string()))
        } else {
            let agent = agent.ok_or_else(|| RouterError::AgentRequired(probe.to_string()))?;
            let name = self
                .dispatcher
                .resolve(agent)
                .map(|(_, name)| name)
                .unwrap_or_else(|| agent.to_string());
            let timeout = self.registry.probe_timeout_ms(probe);
            let response =
                self.dispatcher.send_probe(agent, probe, params.clone(), timeout).await?;
            (response, AuditSource::Agent(name))
        };

        if response.is_success() {
            self.cache_install(fingerprint, &response);
        }

        self.record(probe, &source, &response, caller, is_integration);
        Ok(response)
    }

    fn cache_lookup(&self, fingerprint: &str) -> Option<ProbeResponse> {
        let mut cache = self.cache.lock();
        let now = Instant::now();
        match cache.get_mut(fingerprint) {
            Some(entry) if now < entry.expires_at => {
                let mut seq = self.use_seq.lock();
                *seq += 1;
                entry.last_used = *seq;
                // Deep copy: callers must not be able to poison the cache.
                Some(entry.response.clone())
            }
            Some(_) => {
                cache.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    fn cache_install(&self, fingerprint: String, response: &ProbeResponse) {
        let mut cache = self.cache.lock();
        if cache.len() >= CACHE_MAX_ENTRIES {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        let mut seq = self.use_seq.lock();
        *seq += 1;
        cache.insert(
            fingerprint,
            CacheEntry {
                response: response.clone(),
                expires_at: Instant::now() + self.cache_ttl,
                last_used: *seq,
            },
        );
    }

    /// Audit entry (always) + integration event (integration probes).
    fn record(
        &self,
        probe: &str,
        source: &AuditSource,
        response: &ProbeResponse,
        caller: Option<&str>,
        is_integration: bool,
    ) {
        let digest = hex::encode(Sha256::digest(canonical_json(&response.data).as_bytes()));
        if let Err(e) = self.store.append_audit(
            now_ms(),
            probe,
            source.clone(),
            response.status,
            response.duration_ms,
            caller,
            Some(&digest),
        ) {
            tracing::error!(probe, error = %e, "audit append failed");
        }

        if is_integration {
            let pack = split_probe_name(probe).map(|(p, _)| p).unwrap_or(probe);
            let integration_id = self
                .store
                .integrations_for_pack(pack)
                .ok()
                .and_then(|v| v.first().map(|i| i.id.clone()));
            if let Some(id) = integration_id {
                let event = IntegrationEvent {
                    timestamp_ms: now_ms(),
                    integration_id: id,
                    event_type: IntegrationEventType::ProbeExecution,
                    status: response.status.to_string(),
                    message: probe.to_string(),
                    detail: Some(serde_json::json!({ "durationMs": response.duration_ms })),
                };
                if let Err(e) = self.store.append_integration_event(&event) {
                    tracing::error!(probe, error = %e, "integration event append failed");
                }
            }
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
