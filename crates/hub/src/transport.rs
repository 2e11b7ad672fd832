// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub-side WebSocket transport.
//!
//! One listener serves two upgrade paths: `/ws/agent` (agents, Bearer
//! credential or CA-verified client cert) and `/ws/dashboard` (session
//! cookie, delegated). After the upgrade, each connection gets a reader
//! loop and a writer task draining the per-socket mailbox, so outbound
//! frames never interleave.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use sonde_core::{AgentId, SocketId};
use sonde_wire::{
    decode, encode, error_frame, AckPayload, Envelope, MessageType, RegisterPayload,
    ERR_AGENT_ID_MISMATCH, ERR_INVALID_MESSAGE,
};
use sonde_storage::Store;

use crate::dispatcher::{Dispatcher, Sink};
use crate::enroll;
use crate::identity::Ca;

/// Depth of each socket's writer mailbox.
const MAILBOX_DEPTH: usize = 64;

/// Delegated dashboard session authentication (the session manager lives
/// outside the core).
pub trait DashboardAuth: Send + Sync {
    fn authorize(&self, cookie_header: Option<&str>) -> bool;
}

/// Default-deny dashboard auth for hubs without a session manager.
pub struct DenyAllDashboards;

impl DashboardAuth for DenyAllDashboards {
    fn authorize(&self, _cookie_header: Option<&str>) -> bool {
        false
    }
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared context for all connections.
pub struct TransportCtx {
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub ca: Option<Arc<Ca>>,
    pub dashboard_auth: Arc<dyn DashboardAuth>,
}

/// What the upgrade gate admitted.
enum Upgrade {
    Agent {
        /// Set when the Bearer credential was an enrollment token; a
        /// register frame without its own token consumes this one.
        token: Option<String>,
    },
    Dashboard,
}

/// The accept loop.
pub struct Transport {
    ctx: Arc<TransportCtx>,
}

impl Transport {
    pub fn new(ctx: Arc<TransportCtx>) -> Self {
        Self { ctx }
    }

    /// Accept plain-TCP connections forever.
    pub async fn run(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "inbound connection");
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_socket(stream, false, ctx).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => tracing::error!(error = %e, "accept error"),
            }
        }
    }

    /// Accept TLS connections; a verified client certificate bypasses the
    /// Bearer check per the upgrade gate.
    pub async fn run_tls(&self, listener: TcpListener, acceptor: tokio_rustls::TlsAcceptor) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&self.ctx);
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls) => {
                                let client_cert = {
                                    let (_, conn) = tls.get_ref();
                                    conn.peer_certificates().is_some_and(|c| !c.is_empty())
                                };
                                if let Err(e) = handle_socket(tls, client_cert, ctx).await {
                                    tracing::debug!(error = %e, "connection ended with error");
                                }
                            }
                            Err(e) => tracing::warn!(%peer, error = %e, "TLS handshake failed"),
                        }
                    });
                }
                Err(e) => tracing::error!(error = %e, "accept error"),
            }
        }
    }
}

/// Upgrade one socket and run its session to completion.
async fn handle_socket<S>(
    stream: S,
    client_cert_verified: bool,
    ctx: Arc<TransportCtx>,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let admitted: Arc<parking_lot::Mutex<Option<Upgrade>>> =
        Arc::new(parking_lot::Mutex::new(None));
    let admitted_cb = Arc::clone(&admitted);
    let gate_ctx = Arc::clone(&ctx);

    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let upgrade = gate(req, client_cert_verified, &gate_ctx)?;
        *admitted_cb.lock() = Some(upgrade);
        Ok(resp)
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let upgrade = admitted.lock().take();
    let Some(upgrade) = upgrade else {
        return Ok(()); // gate rejected; handshake already answered
    };

    let (mut write, mut read) = ws.split();
    let socket_id = SocketId::new();
    let (tx, mut rx) = mpsc::channel::<String>(MAILBOX_DEPTH);
    let sink = Sink::new(socket_id.clone(), tx);

    // Writer task: the only place this socket is written.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    match upgrade {
        Upgrade::Dashboard => {
            ctx.dispatcher.add_observer(sink);
            // Dashboards only listen; drain until close.
            while let Some(Ok(msg)) = read.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
            ctx.dispatcher.remove_observer(&socket_id);
        }
        Upgrade::Agent { token } => {
            let mut session = AgentSession {
                ctx: Arc::clone(&ctx),
                sink: sink.clone(),
                bound: None,
                upgrade_token: token,
            };
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if session.handle_frame(text.as_str()).await == FrameOutcome::Close {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {} // Ping/Pong/Binary — ignore
                }
            }
            // Conditional removal: a reconnect may have superseded this
            // socket already (see dispatcher stale-socket invariant).
            ctx.dispatcher.remove_by_socket(&socket_id);
        }
    }

    writer.abort();
    Ok(())
}

/// The upgrade gate, in spec order: dashboard cookie, client cert, Bearer
/// credential.
fn gate(
    req: &Request,
    client_cert_verified: bool,
    ctx: &TransportCtx,
) -> Result<Upgrade, ErrorResponse> {
    let path = req.uri().path();
    match path {
        "/ws/dashboard" => {
            let cookie = req.headers().get("cookie").and_then(|v| v.to_str().ok());
            if ctx.dashboard_auth.authorize(cookie) {
                Ok(Upgrade::Dashboard)
            } else {
                Err(reject(StatusCode::UNAUTHORIZED, "unauthorized"))
            }
        }
        "/ws/agent" => {
            if client_cert_verified {
                return Ok(Upgrade::Agent { token: None });
            }
            let bearer = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim);
            let Some(credential) = bearer else {
                return Err(reject(StatusCode::UNAUTHORIZED, "missing credentials"));
            };
            let now = now_ms();
            if ctx.store.enrollment_token_valid(credential, now).unwrap_or(false) {
                return Ok(Upgrade::Agent { token: Some(credential.to_string()) });
            }
            if ctx.store.validate_api_key(credential).ok().flatten().is_some() {
                return Ok(Upgrade::Agent { token: None });
            }
            Err(reject(StatusCode::UNAUTHORIZED, "invalid credentials"))
        }
        _ => Err(reject(StatusCode::NOT_FOUND, "unknown path")),
    }
}

fn reject(status: StatusCode, body: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(body.to_string()));
    *resp.status_mut() = status;
    resp
}

#[derive(Debug, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    Close,
}

/// Per-connection agent state.
struct AgentSession {
    ctx: Arc<TransportCtx>,
    sink: Sink,
    /// Agent id bound to this socket by its register frame.
    bound: Option<AgentId>,
    upgrade_token: Option<String>,
}

impl AgentSession {
    async fn handle_frame(&mut self, text: &str) -> FrameOutcome {
        let envelope = match decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame");
                let _ = self.sink.send(error_frame(ERR_INVALID_MESSAGE)).await;
                return FrameOutcome::Continue;
            }
        };

        // Impersonation block: an authenticated socket may not speak for a
        // different agent id than the one it bound.
        if let (Some(bound), Some(claimed)) = (&self.bound, &envelope.agent_id) {
            if bound != claimed {
                tracing::warn!(bound = %bound, claimed = %claimed, "agent id mismatch");
                let _ = self.sink.send(error_frame(ERR_AGENT_ID_MISMATCH)).await;
                return FrameOutcome::Continue;
            }
        }

        // Agents holding an issued certificate must sign every frame.
        if let Some(claimed) = &envelope.agent_id {
            if let Ok(Some(record)) = self.ctx.store.agent_by_id(claimed) {
                if let Some(pub_key) = &record.pub_key_pem {
                    if let Err(e) =
                        sonde_wire::verify_payload(pub_key, &envelope.payload, &envelope.signature)
                    {
                        tracing::warn!(agent = %record.name, error = %e, "envelope signature rejected");
                        let _ = self.sink.send(error_frame("Invalid signature")).await;
                        return FrameOutcome::Continue;
                    }
                }
            }
        }

        match envelope.message_type {
            MessageType::AgentRegister => self.handle_register(&envelope).await,
            MessageType::AgentHeartbeat => {
                if let Some(agent_id) = &self.bound {
                    if let Err(e) = self.ctx.store.touch_agent(agent_id, now_ms()) {
                        tracing::error!(error = %e, "heartbeat persist failed");
                    }
                }
                FrameOutcome::Continue
            }
            MessageType::ProbeResponse | MessageType::ProbeError => {
                let Some(agent_id) = self.bound.clone() else {
                    let _ = self.sink.send(error_frame(ERR_INVALID_MESSAGE)).await;
                    return FrameOutcome::Continue;
                };
                match envelope.payload_as::<sonde_core::ProbeResponse>() {
                    Ok(response) => {
                        // A response is as good as a heartbeat.
                        if let Err(e) = self.ctx.store.touch_agent(&agent_id, now_ms()) {
                            tracing::error!(error = %e, "last-seen persist failed");
                        }
                        self.ctx.dispatcher.handle_response(&agent_id, response);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "bad probe response payload");
                        let _ = self.sink.send(error_frame(ERR_INVALID_MESSAGE)).await;
                    }
                }
                FrameOutcome::Continue
            }
            // Hub-originated tags have no business arriving here.
            MessageType::HubAck | MessageType::HubUpdateAvailable | MessageType::ProbeRequest => {
                let _ = self.sink.send(error_frame(ERR_INVALID_MESSAGE)).await;
                FrameOutcome::Continue
            }
        }
    }

    async fn handle_register(&mut self, envelope: &Envelope) -> FrameOutcome {
        let payload: RegisterPayload = match envelope.payload_as() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "bad register payload");
                let _ = self.sink.send(error_frame(ERR_INVALID_MESSAGE)).await;
                return FrameOutcome::Continue;
            }
        };

        let outcome = match enroll::handle_register(
            &self.ctx.store,
            self.ctx.ca.as_deref(),
            &payload,
            self.upgrade_token.as_deref(),
            now_ms(),
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(agent = %payload.name, error = %e, "registration failed");
                let _ = self
                    .sink
                    .send(self.ack_frame(&AckPayload::rejection("Registration failed")))
                    .await;
                return FrameOutcome::Close;
            }
        };
        // One-shot: a consumed (or rejected) upgrade token never re-arms.
        self.upgrade_token = None;

        let close = outcome.close;
        let _ = self.sink.send(self.ack_frame(&outcome.ack)).await;
        if close {
            return FrameOutcome::Close;
        }

        if let Some(agent) = &outcome.agent {
            self.bound = Some(agent.id.clone());
            self.ctx
                .dispatcher
                .register_agent(agent.id.clone(), &agent.name, self.sink.clone());
            tracing::info!(agent = %agent.name, id = %agent.id, "agent registered");
        }

        if let Some(advisory) = &outcome.advisory {
            let payload = serde_json::to_value(advisory).unwrap_or_default();
            let mut envelope = Envelope::new(MessageType::HubUpdateAvailable, payload);
            self.sign(&mut envelope);
            if let Ok(frame) = encode(&envelope) {
                let _ = self.sink.send(frame).await;
            }
        }
        FrameOutcome::Continue
    }

    fn ack_frame(&self, ack: &AckPayload) -> String {
        let payload = serde_json::to_value(ack).unwrap_or_default();
        let mut envelope = Envelope::new(MessageType::HubAck, payload);
        self.sign(&mut envelope);
        encode(&envelope).unwrap_or_else(|_| error_frame("ack encoding failed"))
    }

    fn sign(&self, envelope: &mut Envelope) {
        if let Some(ca) = &self.ctx.ca {
            envelope.signature = ca.envelope_key().sign(&envelope.payload);
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
#[path = "transport_tests.rs"]
mod tests;
