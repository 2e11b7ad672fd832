// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-side probe execution.
//!
//! Resolves the pack and handler, runs it through the injected exec seam,
//! scrubs the result, and records the execution in the local audit ring.

use parking_lot::Mutex;
use std::sync::Arc;

use sonde_core::{
    AuditRing, CapabilityLevel, ChainCheck, ProbeMetadata, ProbeRequest, ProbeResponse,
    ProbeStatus, AuditSource,
};
use sonde_packs::{split_probe_name, ExecFn, LocalCtx, PackKind, PackRegistry};

use crate::scrub::Scrubber;

/// Fallback deadline when neither request nor manifest sets one.
const DEFAULT_LOCAL_TIMEOUT_MS: u64 = 30_000;

/// Executes probes against the local pack registry.
pub struct Executor {
    registry: PackRegistry,
    exec: Arc<dyn ExecFn>,
    scrubber: Scrubber,
    agent_name: String,
    version: String,
    ring: Mutex<AuditRing>,
}

impl Executor {
    pub fn new(
        registry: PackRegistry,
        exec: Arc<dyn ExecFn>,
        scrubber: Scrubber,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            exec,
            scrubber,
            agent_name: agent_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ring: Mutex::new(AuditRing::new(sonde_core::audit::DEFAULT_RING_CAPACITY)),
        }
    }

    pub fn registry(&self) -> &PackRegistry {
        &self.registry
    }

    /// Verify the resident window of the local audit ring.
    pub fn verify_ring(&self) -> ChainCheck {
        self.ring.lock().verify()
    }

    pub fn ring_len(&self) -> usize {
        self.ring.lock().len()
    }

    fn metadata(&self, pack: &str, capability: CapabilityLevel) -> ProbeMetadata {
        let pack_version = self
            .registry
            .get(pack)
            .map(|p| p.manifest.version.clone())
            .unwrap_or_default();
        ProbeMetadata {
            agent_version: self.version.clone(),
            pack_name: pack.to_string(),
            pack_version,
            capability_level: capability,
        }
    }

    /// Run one probe request to a structured response. Never panics, never
    /// propagates: every failure is a `status: error` response.
    pub async fn execute(&self, request: &ProbeRequest) -> ProbeResponse {
        let started = std::time::Instant::now();
        let response = self.execute_inner(request, started).await;
        let duration_ms = response.duration_ms;
        self.ring.lock().append(
            now_ms(),
            &request.probe,
            AuditSource::Agent(self.agent_name.clone()),
            response.status,
            duration_ms,
            None,
        );
        response
    }

    async fn execute_inner(
        &self,
        request: &ProbeRequest,
        started: std::time::Instant,
    ) -> ProbeResponse {
        let probe = request.probe.as_str();
        let Some((pack_name, rest)) = split_probe_name(probe) else {
            return self.error(request, probe, "", format!("Malformed probe name '{probe}'"), started);
        };
        let Some(pack) = self.registry.get(pack_name) else {
            return self.error(
                request,
                probe,
                pack_name,
                format!("Unknown pack '{pack_name}'"),
                started,
            );
        };
        let PackKind::Local(handlers) = &pack.kind else {
            return self.error(
                request,
                probe,
                pack_name,
                format!("Pack '{pack_name}' does not run on agents"),
                started,
            );
        };
        let Some(handler) = handlers.get(rest).cloned() else {
            return self.error(
                request,
                probe,
                pack_name,
                format!("Unknown probe '{rest}' in pack '{pack_name}'"),
                started,
            );
        };

        let spec = pack.manifest.probe(rest);
        // Probes above `observe` need an explicit policy grant; the
        // built-in packs are all observe-level.
        let capability = spec.map(|s| s.capability).unwrap_or_default();
        if capability > CapabilityLevel::Observe {
            return self.error(
                request,
                probe,
                pack_name,
                format!("Probe '{probe}' requires capability beyond observe"),
                started,
            );
        }

        let timeout_ms = spec
            .and_then(|s| s.timeout_ms)
            .unwrap_or(request.timeout_ms.min(DEFAULT_LOCAL_TIMEOUT_MS));

        let ctx = LocalCtx {
            params: request.params_value(),
            exec: Arc::clone(&self.exec),
            timeout_ms,
        };
        match handler(ctx).await {
            Ok(data) => ProbeResponse {
                probe: probe.to_string(),
                status: ProbeStatus::Success,
                data: self.scrubber.scrub(&data),
                duration_ms: started.elapsed().as_millis() as u64,
                request_id: Some(request.request_id.clone()),
                metadata: self.metadata(pack_name, capability),
            },
            Err(e) => self.error(request, probe, pack_name, e.to_string(), started),
        }
    }

    fn error(
        &self,
        request: &ProbeRequest,
        probe: &str,
        pack: &str,
        message: String,
        started: std::time::Instant,
    ) -> ProbeResponse {
        let mut response = ProbeResponse::error(
            probe,
            message,
            started.elapsed().as_millis() as u64,
            self.metadata(pack, CapabilityLevel::Observe),
        );
        response.request_id = Some(request.request_id.clone());
        response
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
