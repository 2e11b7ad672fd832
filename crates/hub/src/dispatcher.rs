// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical registry of live agents and in-flight probe correlation.
//!
//! Three maps give O(1) lookup by agent id, name, and socket. A separate
//! pending-request table correlates outbound probes with inbound responses,
//! so one agent can serve many concurrent probes.
//!
//! Stale-socket invariant: a reconnecting agent that beats the close event
//! of its prior connection must not be evicted when that close fires. The
//! socket id bound to the agent is compared on removal; a close for a
//! superseded socket is a no-op.

use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use sonde_core::{
    AgentId, ProbeRequest, ProbeResponse, RequestId, SocketId, DEFAULT_PROBE_TIMEOUT_MS,
};
use sonde_wire::{encode, Envelope, EnvelopeKey, MessageType};

/// Errors surfaced to probe callers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("Agent not found or offline")]
    AgentUnavailable,
    #[error("Agent {0} disconnected")]
    AgentDisconnected(String),
    #[error("Probe '{probe}' timed out after {timeout_ms}ms")]
    Timeout { probe: String, timeout_ms: u64 },
    #[error("send failed: {0}")]
    Send(String),
}

/// Writer mailbox of one socket. Frames queue here and a per-connection
/// writer task drains them, so sends never interleave.
#[derive(Clone)]
pub struct Sink {
    pub socket_id: SocketId,
    tx: mpsc::Sender<String>,
}

impl Sink {
    pub fn new(socket_id: SocketId, tx: mpsc::Sender<String>) -> Self {
        Self { socket_id, tx }
    }

    pub async fn send(&self, frame: String) -> Result<(), DispatchError> {
        self.tx.send(frame).await.map_err(|_| DispatchError::Send("socket closed".into()))
    }

    /// Non-blocking send for broadcast fan-out; a full mailbox drops the
    /// frame rather than blocking the hot path.
    pub fn try_send(&self, frame: String) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

struct AgentEntry {
    name: String,
    sink: Sink,
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<AgentId, AgentEntry>,
    by_name: HashMap<String, AgentId>,
    by_socket: HashMap<SocketId, AgentId>,
}

struct PendingProbe {
    agent_id: AgentId,
    seq: u64,
    tx: oneshot::Sender<Result<ProbeResponse, DispatchError>>,
}

/// Live-session registry + request correlation + dashboard broadcast.
pub struct Dispatcher {
    tables: Mutex<Tables>,
    pending: Mutex<HashMap<RequestId, PendingProbe>>,
    observers: Mutex<HashMap<SocketId, Sink>>,
    seq: Mutex<u64>,
    /// Hub envelope key; outbound probe payloads are signed when present.
    signing: Mutex<Option<Arc<EnvelopeKey>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            pending: Mutex::new(HashMap::new()),
            observers: Mutex::new(HashMap::new()),
            seq: Mutex::new(0),
            signing: Mutex::new(None),
        }
    }

    pub fn set_signing_key(&self, key: Arc<EnvelopeKey>) {
        *self.signing.lock() = Some(key);
    }

    /// Bind an agent to a socket, superseding any previous socket.
    ///
    /// The previous socket is dropped from the socket index without
    /// touching the agent, so its eventual close event is a no-op.
    pub fn register_agent(&self, agent_id: AgentId, name: &str, sink: Sink) {
        {
            let mut tables = self.tables.lock();
            if let Some(existing) = tables.by_id.get(&agent_id) {
                let old_socket = existing.sink.socket_id.clone();
                if old_socket != sink.socket_id {
                    tables.by_socket.remove(&old_socket);
                    tracing::info!(agent = %name, old = %old_socket, new = %sink.socket_id,
                        "agent reconnected, superseding socket");
                }
            }
            tables.by_socket.insert(sink.socket_id.clone(), agent_id.clone());
            tables.by_name.insert(name.to_string(), agent_id.clone());
            tables.by_id.insert(agent_id, AgentEntry { name: name.to_string(), sink });
        }
        self.broadcast_status();
    }

    /// Socket closed: evict the agent only if this socket is still the one
    /// bound to it.
    pub fn remove_by_socket(&self, socket_id: &SocketId) {
        let agent_id = {
            let tables = self.tables.lock();
            let Some(agent_id) = tables.by_socket.get(socket_id) else { return };
            let Some(entry) = tables.by_id.get(agent_id) else { return };
            if entry.sink.socket_id != *socket_id {
                return;
            }
            agent_id.clone()
        };
        self.remove_agent(&agent_id);
    }

    /// Drop an agent from all tables and reject its pending probes.
    pub fn remove_agent(&self, agent_id: &AgentId) {
        let name = {
            let mut tables = self.tables.lock();
            let Some(entry) = tables.by_id.remove(agent_id) else { return };
            tables.by_name.remove(&entry.name);
            tables.by_socket.remove(&entry.sink.socket_id);
            entry.name
        };
        let rejected: Vec<PendingProbe> = {
            let mut pending = self.pending.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, p)| p.agent_id == *agent_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter().filter_map(|id| pending.remove(&id)).collect()
        };
        for p in rejected {
            let _ = p.tx.send(Err(DispatchError::AgentDisconnected(name.clone())));
        }
        tracing::info!(agent = %name, "agent removed from dispatcher");
        self.broadcast_status();
    }

    pub fn is_online(&self, name: &str) -> bool {
        self.tables.lock().by_name.contains_key(name)
    }

    /// Resolve a name or id to the live agent id.
    pub fn resolve(&self, name_or_id: &str) -> Option<(AgentId, String)> {
        let tables = self.tables.lock();
        let agent_id = tables
            .by_name
            .get(name_or_id)
            .cloned()
            .or_else(|| {
                let id = AgentId::from_string(name_or_id);
                tables.by_id.contains_key(&id).then_some(id)
            })?;
        let name = tables.by_id.get(&agent_id)?.name.clone();
        Some((agent_id, name))
    }

    /// Snapshot of online agents as `(id, name)` pairs, name-sorted.
    pub fn online_agents(&self) -> Vec<(AgentId, String)> {
        let tables = self.tables.lock();
        let mut out: Vec<(AgentId, String)> =
            tables.by_id.iter().map(|(id, e)| (id.clone(), e.name.clone())).collect();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }

    /// Send a probe to an online agent and await its correlated response.
    ///
    /// Resolves even for errored responses; rejects only on timeout,
    /// disconnect, or no-such-agent.
    pub async fn send_probe(
        &self,
        name_or_id: &str,
        probe: &str,
        params: serde_json::Value,
        timeout_override_ms: Option<u64>,
    ) -> Result<ProbeResponse, DispatchError> {
        let (agent_id, _name, sink) = {
            let tables = self.tables.lock();
            let agent_id = tables
                .by_name
                .get(name_or_id)
                .cloned()
                .or_else(|| {
                    let id = AgentId::from_string(name_or_id);
                    tables.by_id.contains_key(&id).then_some(id)
                })
                .ok_or(DispatchError::AgentUnavailable)?;
            let entry = tables.by_id.get(&agent_id).ok_or(DispatchError::AgentUnavailable)?;
            (agent_id.clone(), entry.name.clone(), entry.sink.clone())
        };

        let timeout_ms = timeout_override_ms.unwrap_or(DEFAULT_PROBE_TIMEOUT_MS);
        let mut request = ProbeRequest::new(probe);
        request.timeout_ms = timeout_ms;
        if let serde_json::Value::Object(map) = &params {
            request.params = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
        let request_id = request.request_id.clone();

        let payload = serde_json::to_value(&request)
            .map_err(|e| DispatchError::Send(e.to_string()))?;
        let mut envelope = Envelope::new(MessageType::ProbeRequest, payload);
        if let Some(key) = self.signing.lock().clone() {
            envelope.signature = key.sign(&envelope.payload);
        }
        let frame = encode(&envelope).map_err(|e| DispatchError::Send(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut seq = self.seq.lock();
            *seq += 1;
            self.pending.lock().insert(
                request_id.clone(),
                PendingProbe { agent_id: agent_id.clone(), seq: *seq, tx },
            );
        }

        if let Err(e) = sink.send(frame).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        // Deadline task: on expiry the pending entry is deleted and the
        // future rejected; a late response then misses correlation and is
        // dropped.
        let probe_name = probe.to_string();
        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await;
        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(DispatchError::Send("dispatcher dropped the request".into())),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(DispatchError::Timeout { probe: probe_name, timeout_ms })
            }
        }
    }

    /// Correlate an inbound response. Prefers the echoed request id; falls
    /// back to the oldest pending request for the agent (agents that do
    /// not echo ids). Unmatched responses are dropped.
    pub fn handle_response(&self, agent_id: &AgentId, response: ProbeResponse) {
        let pending = {
            let mut pending = self.pending.lock();
            let key = match &response.request_id {
                Some(id)
                    if pending.get(id).is_some_and(|p| p.agent_id == *agent_id) =>
                {
                    Some(id.clone())
                }
                Some(_) => None,
                None => pending
                    .iter()
                    .filter(|(_, p)| p.agent_id == *agent_id)
                    .min_by_key(|(_, p)| p.seq)
                    .map(|(id, _)| id.clone()),
            };
            key.and_then(|k| pending.remove(&k))
        };
        match pending {
            Some(p) => {
                let _ = p.tx.send(Ok(response));
            }
            None => {
                tracing::debug!(agent = %agent_id, probe = response.probe,
                    "dropping uncorrelated probe response");
            }
        }
    }

    /// Number of in-flight probes (tests and metrics).
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Attach a dashboard observer; it immediately receives the current
    /// online set.
    pub fn add_observer(&self, sink: Sink) {
        let frame = self.status_frame();
        sink.try_send(frame);
        self.observers.lock().insert(sink.socket_id.clone(), sink);
    }

    pub fn remove_observer(&self, socket_id: &SocketId) {
        self.observers.lock().remove(socket_id);
    }

    fn status_frame(&self) -> String {
        let agents = self.online_agents();
        json!({
            "type": "agent.status",
            "onlineAgentIds": agents.iter().map(|(id, _)| id.to_string()).collect::<Vec<_>>(),
            "onlineAgents": agents
                .iter()
                .map(|(id, name)| json!({"id": id, "name": name}))
                .collect::<Vec<_>>(),
        })
        .to_string()
    }

    /// Fan the online set out to every observer. Closed observers are
    /// pruned; slow ones just miss this frame.
    fn broadcast_status(&self) {
        let frame = self.status_frame();
        let mut closed = Vec::new();
        {
            let observers = self.observers.lock();
            for (socket_id, sink) in observers.iter() {
                if !sink.try_send(frame.clone()) && sink.tx.is_closed() {
                    closed.push(socket_id.clone());
                }
            }
        }
        if !closed.is_empty() {
            let mut observers = self.observers.lock();
            for socket_id in closed {
                observers.remove(&socket_id);
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
