// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's hub session.
//!
//! State machine: Idle → Connecting → Registered ↔ Disconnected; an
//! explicit stop is the only way back to Idle. Reconnects back off
//! exponentially, outbound payloads are signed when a key is loaded, and
//! inbound signed envelopes verify against the stored hub key.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use sonde_core::{Attestation, PackStatus, ProbeRequest, HEARTBEAT_INTERVAL_MS};
use sonde_wire::{
    decode, encode, AckPayload, Envelope, EnvelopeKey, MessageType, RegisterPayload,
    UpdateAvailablePayload,
};

use crate::config::AgentConfig;
use crate::executor::Executor;

/// Agent-driven heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(HEARTBEAT_INTERVAL_MS);

/// Reconnect backoff: `min(1s * 2^attempts, 60s)`.
pub fn backoff_ms(attempts: u32) -> u64 {
    let base = 1_000u64.saturating_mul(1u64 << attempts.min(6));
    base.min(60_000)
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("bad hub url: {0}")]
    Url(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("websocket error: {0}")]
    Ws(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("registration rejected: {0}")]
    Rejected(String),
    #[error("hub closed before ack")]
    NoAck,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One agent ↔ hub connection, auto-reconnecting until stopped.
pub struct Connection {
    config: parking_lot::Mutex<AgentConfig>,
    config_path: std::path::PathBuf,
    executor: Arc<Executor>,
    signing: Option<EnvelopeKey>,
    hub_key_pem: Option<String>,
    running: AtomicBool,
}

impl Connection {
    pub fn new(
        config: AgentConfig,
        config_path: std::path::PathBuf,
        executor: Arc<Executor>,
    ) -> Self {
        let signing = config
            .key_path
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|pem| EnvelopeKey::from_pkcs8_pem(&pem).ok());
        let hub_key_pem = config
            .hub_key_path
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok());
        Self {
            config: parking_lot::Mutex::new(config),
            config_path,
            executor,
            signing,
            hub_key_pem,
            running: AtomicBool::new(false),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run sessions until stopped, reconnecting with backoff.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let mut attempts: u32 = 0;
        while self.running.load(Ordering::SeqCst) {
            match self.session().await {
                Ok(()) => {
                    attempts = 0;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "session ended");
                }
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let delay = backoff_ms(attempts);
            attempts = attempts.saturating_add(1);
            tracing::info!(delay_ms = delay, attempt = attempts, "reconnecting after backoff");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// The register payload for the current process state.
    pub fn register_payload(&self, token: Option<String>) -> RegisterPayload {
        let config = self.config.lock();
        let packs = self.pack_statuses(&config);
        let mut attestation = build_attestation(&config);
        attestation.packs =
            packs.iter().map(|p| format!("{}@{}", p.name, p.version)).collect();
        RegisterPayload {
            name: config.agent_name.clone(),
            os: os_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            packs,
            enrollment_token: token,
            attestation: Some(attestation),
        }
    }

    fn pack_statuses(&self, config: &AgentConfig) -> Vec<PackStatus> {
        self.executor
            .registry()
            .iter()
            .map(|pack| PackStatus {
                name: pack.manifest.name.clone(),
                version: pack.manifest.version.clone(),
                status: if config.disabled_packs.contains(&pack.manifest.name) {
                    "disabled".to_string()
                } else {
                    "active".to_string()
                },
            })
            .collect()
    }

    fn sign(&self, envelope: &mut Envelope) {
        if let Some(key) = &self.signing {
            envelope.signature = key.sign(&envelope.payload);
        }
    }

    /// Verify an inbound envelope when it claims to be signed.
    fn verify_inbound(&self, envelope: &Envelope) -> bool {
        if envelope.signature.is_empty() {
            return true;
        }
        match &self.hub_key_pem {
            Some(pem) => {
                sonde_wire::verify_payload(pem, &envelope.payload, &envelope.signature).is_ok()
            }
            // No stored hub key: nothing to verify against.
            None => true,
        }
    }

    async fn session(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let (url, bearer, agent_id) = {
            let config = self.config.lock();
            (
                format!("{}/ws/agent", config.hub_url.trim_end_matches('/')),
                config.api_key.clone(),
                config.agent_id.clone(),
            )
        };
        let mut request =
            url.clone().into_client_request().map_err(|e| ConnectionError::Url(e.to_string()))?;
        let auth = format!("Bearer {bearer}");
        request.headers_mut().insert(
            "authorization",
            auth.parse().map_err(|_| ConnectionError::Url("bad credential".into()))?,
        );

        let connector = crate::tlsclient::connector(&self.config.lock())?;
        let (ws, _) = tokio_tungstenite::connect_async_tls_with_config(
            request, None, false, connector,
        )
        .await
        .map_err(Box::new)?;
        tracing::info!(%url, "connected to hub");

        let (mut write, mut read) = ws.split();
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if write.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Register.
        let payload = self.register_payload(None);
        let mut envelope = Envelope::new(
            MessageType::AgentRegister,
            serde_json::to_value(&payload).unwrap_or_default(),
        );
        if let Some(id) = &agent_id {
            envelope.agent_id = Some(id.as_str().into());
        }
        self.sign(&mut envelope);
        let frame = encode(&envelope).map_err(|e| ConnectionError::Protocol(e.to_string()))?;
        tx.send(frame).await.map_err(|_| ConnectionError::NoAck)?;

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.tick().await; // first tick is immediate; skip it

        let outcome = loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle_frame(text.as_str(), &tx).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Err(e)) => break Err(ConnectionError::Ws(Box::new(e))),
                    Some(Ok(_)) => {} // Ping/Pong/Binary
                },
                _ = heartbeat.tick() => {
                    let mut envelope = Envelope::new(MessageType::AgentHeartbeat, json!({}));
                    if let Some(id) = &self.config.lock().agent_id {
                        envelope.agent_id = Some(id.as_str().into());
                    }
                    self.sign(&mut envelope);
                    if let Ok(frame) = encode(&envelope) {
                        if tx.send(frame).await.is_err() {
                            break Ok(());
                        }
                    }
                }
            }
        };

        writer.abort();
        outcome
    }

    async fn handle_frame(
        self: &Arc<Self>,
        text: &str,
        tx: &mpsc::Sender<String>,
    ) -> Result<(), ConnectionError> {
        // Bare error frames ({"error": ...}) are protocol noise; log them.
        let envelope = match decode(text) {
            Ok(envelope) => envelope,
            Err(_) => {
                if let Ok(v) = serde_json::from_str::<serde_json::Value>(text) {
                    if let Some(error) = v.get("error").and_then(|e| e.as_str()) {
                        tracing::warn!(error, "hub rejected a frame");
                        return Ok(());
                    }
                }
                tracing::warn!("undecodable frame from hub");
                return Ok(());
            }
        };

        if !self.verify_inbound(&envelope) {
            tracing::warn!(frame_type = %envelope.message_type, "hub signature rejected; dropping frame");
            return Ok(());
        }

        match envelope.message_type {
            MessageType::HubAck => {
                let ack: AckPayload = match envelope.payload_as() {
                    Ok(a) => a,
                    Err(_) => return Ok(()),
                };
                if let Some(error) = ack.error {
                    return Err(ConnectionError::Rejected(error));
                }
                if let Some(agent_id) = ack.agent_id {
                    let mut config = self.config.lock();
                    if config.agent_id.as_deref() != Some(agent_id.as_str()) {
                        config.agent_id = Some(agent_id.to_string());
                        if let Err(e) = config.save(&self.config_path) {
                            tracing::error!(error = %e, "failed to persist agent id");
                        }
                    }
                }
                tracing::info!("registered with hub");
                Ok(())
            }
            MessageType::HubUpdateAvailable => {
                if let Ok(advisory) = envelope.payload_as::<UpdateAvailablePayload>() {
                    tracing::info!(
                        current = %advisory.current_version,
                        latest = %advisory.latest_version,
                        "agent update available"
                    );
                }
                Ok(())
            }
            MessageType::ProbeRequest => {
                let request: ProbeRequest = match envelope.payload_as() {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "bad probe request payload");
                        return Ok(());
                    }
                };
                // Handlers may run long; answer from a task so the read
                // loop keeps serving concurrent requests.
                let this = Arc::clone(self);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = this.executor.execute(&request).await;
                    let message_type = if response.is_success() {
                        MessageType::ProbeResponse
                    } else {
                        MessageType::ProbeError
                    };
                    let mut envelope = Envelope::new(
                        message_type,
                        serde_json::to_value(&response).unwrap_or_default(),
                    );
                    if let Some(id) = &this.config.lock().agent_id {
                        envelope.agent_id = Some(id.as_str().into());
                    }
                    this.sign(&mut envelope);
                    if let Ok(frame) = encode(&envelope) {
                        let _ = tx.send(frame).await;
                    }
                });
                Ok(())
            }
            // Agent-originated tags coming back are hub bugs; ignore.
            MessageType::AgentRegister
            | MessageType::AgentHeartbeat
            | MessageType::ProbeResponse
            | MessageType::ProbeError => Ok(()),
        }
    }
}

fn os_string() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Identity-affecting snapshot for tamper detection.
pub fn build_attestation(config: &AgentConfig) -> Attestation {
    use sha2::{Digest, Sha256};
    let binary_hash = std::env::current_exe()
        .ok()
        .and_then(|p| std::fs::read(p).ok())
        .map(|bytes| hex::encode(Sha256::digest(&bytes)))
        .unwrap_or_default();
    let config_hash = serde_json::to_string(config)
        .map(|json| hex::encode(Sha256::digest(json.as_bytes())))
        .unwrap_or_default();
    Attestation {
        os_version: os_string(),
        binary_hash,
        packs: Vec::new(),
        config_hash,
        runtime_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
