// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side execution of integration probes.
//!
//! Bounded concurrency per pack, per-probe cancellation, retry with
//! backoff on transient HTTP failures, and a single silent OAuth2 refresh
//! on 401.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use sonde_core::{
    CapabilityLevel, Credentials, ProbeMetadata, ProbeResponse, ProbeStatus,
};
use sonde_packs::{
    split_probe_name, CredentialsHandle, FetchRequest, HandlerError, HttpFetch, IntegrationCtx,
    IntegrationHandler, PackKind, PackRegistry,
};
use sonde_storage::Store;

/// Default deadline for integration probes without a manifest override.
pub const DEFAULT_INTEGRATION_TIMEOUT_MS: u64 = 15_000;
/// Manifest timeouts are clamped into this band.
const TIMEOUT_BAND_MS: (u64, u64) = (5_000, 30_000);
/// Statuses retried with backoff.
const TRANSIENT_STATUSES: [u16; 6] = [500, 502, 503, 504, 408, 429];
const BACKOFF_MS: [u64; 2] = [250, 1_000];
/// Concurrent handler invocations per pack.
const PER_PACK_CONCURRENCY: usize = 8;

/// Runs integration-type probes in-process.
pub struct IntegrationExecutor {
    registry: Arc<PackRegistry>,
    store: Arc<Store>,
    fetch: Arc<dyn HttpFetch>,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
    /// Live credential slots per integration id; OAuth2 refresh mutates
    /// these in place.
    credentials: Mutex<HashMap<String, CredentialsHandle>>,
}

impl IntegrationExecutor {
    pub fn new(registry: Arc<PackRegistry>, store: Arc<Store>, fetch: Arc<dyn HttpFetch>) -> Self {
        Self {
            registry,
            store,
            fetch,
            semaphores: Mutex::new(HashMap::new()),
            credentials: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, pack: &str) -> Arc<Semaphore> {
        Arc::clone(
            self.semaphores
                .lock()
                .entry(pack.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(PER_PACK_CONCURRENCY))),
        )
    }

    /// The shared credential slot for an integration, loading from the
    /// store on first touch.
    fn credentials_handle(&self, integration_id: Option<&str>) -> CredentialsHandle {
        let Some(id) = integration_id else {
            return Arc::new(Mutex::new(None));
        };
        if let Some(handle) = self.credentials.lock().get(id) {
            return Arc::clone(handle);
        }
        let loaded = self
            .store
            .integration(id)
            .ok()
            .flatten()
            .and_then(|rec| rec.credentials);
        let handle: CredentialsHandle = Arc::new(Mutex::new(loaded));
        self.credentials.lock().insert(id.to_string(), Arc::clone(&handle));
        handle
    }

    fn metadata(&self, pack: &str) -> ProbeMetadata {
        let version = self
            .registry
            .get(pack)
            .map(|p| p.manifest.version.clone())
            .unwrap_or_default();
        ProbeMetadata {
            agent_version: "hub".into(),
            pack_name: pack.to_string(),
            pack_version: version,
            capability_level: CapabilityLevel::Observe,
        }
    }

    /// Execute one integration probe. Every failure mode returns a
    /// structured response; this never errors out.
    pub async fn execute(&self, probe: &str, params: &Value) -> ProbeResponse {
        let started = std::time::Instant::now();
        let Some((pack_name, rest)) = split_probe_name(probe) else {
            return ProbeResponse::error(
                probe,
                format!("Malformed probe name '{probe}'"),
                0,
                self.metadata(""),
            );
        };
        let metadata = self.metadata(pack_name);

        let Some(pack) = self.registry.get(pack_name) else {
            return ProbeResponse::error(
                probe,
                format!("Unknown integration pack '{pack_name}'"),
                0,
                metadata,
            );
        };
        let PackKind::Integration { handlers, .. } = &pack.kind else {
            return ProbeResponse::error(
                probe,
                format!("Pack '{pack_name}' is not an integration pack"),
                0,
                metadata,
            );
        };
        let Some(handler) = handlers.get(rest).cloned() else {
            return ProbeResponse::error(
                probe,
                format!("Unknown probe '{rest}' in pack '{pack_name}'"),
                0,
                metadata,
            );
        };

        let spec_capability = pack
            .manifest
            .probe(rest)
            .map(|s| s.capability)
            .unwrap_or_default();
        let timeout_ms = pack
            .manifest
            .probe(rest)
            .and_then(|s| s.timeout_ms)
            .map(|t| t.clamp(TIMEOUT_BAND_MS.0, TIMEOUT_BAND_MS.1))
            .unwrap_or(DEFAULT_INTEGRATION_TIMEOUT_MS);

        let integration = self
            .store
            .integrations_for_pack(pack_name)
            .ok()
            .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) });
        let integration_id = integration.as_ref().map(|i| i.id.clone());
        let config = integration.map(|i| i.config).unwrap_or_else(|| Value::Object(Default::default()));
        let credentials = self.credentials_handle(integration_id.as_deref());

        let semaphore = self.semaphore(pack_name);
        let _permit = match semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => {
                return ProbeResponse::error(probe, "executor shut down", 0, metadata);
            }
        };

        let cancel = CancellationToken::new();
        let outcome = tokio::select! {
            r = self.attempt_loop(
                &handler,
                params,
                &config,
                &credentials,
                integration_id.as_deref(),
                &cancel,
            ) => r,
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                cancel.cancel();
                Err(HandlerError::Cancelled)
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let metadata = ProbeMetadata { capability_level: spec_capability, ..metadata };
        match outcome {
            Ok(data) => ProbeResponse {
                probe: probe.to_string(),
                status: ProbeStatus::Success,
                data,
                duration_ms,
                request_id: None,
                metadata,
            },
            Err(HandlerError::Cancelled) => ProbeResponse {
                probe: probe.to_string(),
                status: ProbeStatus::Timeout,
                data: serde_json::json!({
                    "error": format!("Probe '{probe}' timed out after {timeout_ms}ms")
                }),
                duration_ms,
                request_id: None,
                metadata,
            },
            Err(e) => ProbeResponse::error(probe, e.to_string(), duration_ms, metadata),
        }
    }

    async fn attempt_loop(
        &self,
        handler: &IntegrationHandler,
        params: &Value,
        config: &Value,
        credentials: &CredentialsHandle,
        integration_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, HandlerError> {
        let mut transient_retries = 0usize;
        let mut refreshed = false;
        loop {
            let ctx = IntegrationCtx {
                params: params.clone(),
                config: config.clone(),
                credentials: Arc::clone(credentials),
                fetch: Arc::clone(&self.fetch),
                cancel: cancel.clone(),
            };
            match handler(ctx).await {
                Ok(value) => return Ok(value),
                Err(HandlerError::Http { status: 401, .. })
                    if !refreshed && has_refreshable_oauth(credentials) =>
                {
                    refreshed = true;
                    self.refresh_oauth(credentials, integration_id, cancel).await?;
                    // Retry the handler once with the refreshed token.
                }
                Err(HandlerError::Http { status, message })
                    if TRANSIENT_STATUSES.contains(&status)
                        && transient_retries < BACKOFF_MS.len() =>
                {
                    tracing::debug!(status, retry = transient_retries, "transient failure, backing off");
                    tokio::time::sleep(Duration::from_millis(BACKOFF_MS[transient_retries])).await;
                    transient_retries += 1;
                    let _ = message;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// POST a refresh_token grant to the stored token URL and swap the
    /// access token in place.
    async fn refresh_oauth(
        &self,
        credentials: &CredentialsHandle,
        integration_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let (refresh_token, token_url) = {
            let guard = credentials.lock();
            match guard.as_ref() {
                Some(Credentials::OAuth2 { refresh_token, token_url, .. }) => {
                    (refresh_token.clone(), token_url.clone())
                }
                _ => return Err(HandlerError::Failed("no refreshable credentials".into())),
            }
        };

        let request = FetchRequest::post_form(
            token_url,
            vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("refresh_token".to_string(), refresh_token),
            ],
        );
        let response = self
            .fetch
            .fetch(request, cancel)
            .await
            .map_err(|e| HandlerError::Failed(format!("token refresh failed: {e}")))?;
        let new_token = response
            .body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::Failed("token response missing access_token".into()))?
            .to_string();

        let updated = {
            let mut guard = credentials.lock();
            match guard.as_mut() {
                Some(Credentials::OAuth2 { access_token, .. }) => {
                    *access_token = new_token;
                    guard.clone()
                }
                _ => return Err(HandlerError::Failed("credentials changed during refresh".into())),
            }
        };
        if let (Some(id), Some(creds)) = (integration_id, updated) {
            if let Err(e) = self.store.update_integration_credentials(id, &creds, now_ms()) {
                tracing::error!(integration = id, error = %e, "failed to persist refreshed token");
            }
        }
        tracing::info!("OAuth2 access token refreshed");
        Ok(())
    }

    /// Run a pack's testConnection handler, if it declares one.
    pub async fn test_connection(&self, pack_name: &str) -> ProbeResponse {
        let started = std::time::Instant::now();
        let metadata = self.metadata(pack_name);
        let handler = match self.registry.get(pack_name).map(|p| &p.kind) {
            Some(PackKind::Integration { test_connection: Some(h), .. }) => h.clone(),
            Some(PackKind::Integration { test_connection: None, .. }) => {
                return ProbeResponse::error(
                    format!("{pack_name}.testConnection"),
                    "pack declares no testConnection",
                    0,
                    metadata,
                );
            }
            _ => {
                return ProbeResponse::error(
                    format!("{pack_name}.testConnection"),
                    format!("Unknown integration pack '{pack_name}'"),
                    0,
                    metadata,
                );
            }
        };

        let integration = self
            .store
            .integrations_for_pack(pack_name)
            .ok()
            .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) });
        let integration_id = integration.as_ref().map(|i| i.id.clone());
        let config = integration.map(|i| i.config).unwrap_or_else(|| Value::Object(Default::default()));
        let credentials = self.credentials_handle(integration_id.as_deref());

        let cancel = CancellationToken::new();
        let outcome = self
            .attempt_loop(
                &handler,
                &Value::Object(Default::default()),
                &config,
                &credentials,
                integration_id.as_deref(),
                &cancel,
            )
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(data) => ProbeResponse {
                probe: format!("{pack_name}.testConnection"),
                status: ProbeStatus::Success,
                data,
                duration_ms,
                request_id: None,
                metadata,
            },
            Err(e) => ProbeResponse::error(
                format!("{pack_name}.testConnection"),
                e.to_string(),
                duration_ms,
                metadata,
            ),
        }
    }
}

fn has_refreshable_oauth(credentials: &CredentialsHandle) -> bool {
    matches!(
        credentials.lock().as_ref(),
        Some(Credentials::OAuth2 { refresh_token, .. }) if !refresh_token.is_empty()
    )
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "integration_tests.rs"]
mod tests;
