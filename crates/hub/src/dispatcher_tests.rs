// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sonde_core::{CapabilityLevel, ProbeMetadata, ProbeStatus};
use tokio::sync::mpsc;

fn sink() -> (Sink, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(16);
    (Sink::new(SocketId::new(), tx), rx)
}

fn response(probe: &str, request_id: Option<RequestId>) -> ProbeResponse {
    ProbeResponse {
        probe: probe.into(),
        status: ProbeStatus::Success,
        data: serde_json::json!({"ok": true}),
        duration_ms: 2,
        request_id,
        metadata: ProbeMetadata {
            agent_version: "1.0.0".into(),
            pack_name: "system".into(),
            pack_version: "1.0.0".into(),
            capability_level: CapabilityLevel::Observe,
        },
    }
}

#[tokio::test]
async fn register_and_resolve_by_name_and_id() {
    let d = Dispatcher::new();
    let id = AgentId::generate();
    let (s, _rx) = sink();
    d.register_agent(id.clone(), "srv1", s);

    assert!(d.is_online("srv1"));
    assert_eq!(d.resolve("srv1").map(|(i, _)| i), Some(id.clone()));
    assert_eq!(d.resolve(id.as_str()).map(|(_, n)| n), Some("srv1".to_string()));
    assert!(d.resolve("ghost").is_none());
}

#[tokio::test]
async fn stale_socket_close_does_not_evict_reconnected_agent() {
    // A new connection supersedes ws1; the late close of ws1 is a no-op.
    let d = Dispatcher::new();
    let id = AgentId::generate();
    let (ws1, _rx1) = sink();
    let ws1_id = ws1.socket_id.clone();
    d.register_agent(id.clone(), "srv1", ws1);

    let (ws2, _rx2) = sink();
    d.register_agent(id.clone(), "srv1", ws2);

    d.remove_by_socket(&ws1_id);
    assert!(d.is_online("srv1"));
    let online = d.online_agents();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0], (id, "srv1".to_string()));
}

#[tokio::test]
async fn current_socket_close_evicts() {
    let d = Dispatcher::new();
    let id = AgentId::generate();
    let (ws, _rx) = sink();
    let ws_id = ws.socket_id.clone();
    d.register_agent(id, "srv1", ws);

    d.remove_by_socket(&ws_id);
    assert!(!d.is_online("srv1"));
    assert!(d.online_agents().is_empty());
}

#[tokio::test]
async fn probe_resolves_with_correlated_response() {
    let d = Arc::new(Dispatcher::new());
    let id = AgentId::generate();
    let (s, mut rx) = sink();
    d.register_agent(id.clone(), "srv1", s);

    let d2 = Arc::clone(&d);
    let id2 = id.clone();
    let reply = tokio::spawn(async move {
        let frame = rx.recv().await.expect("probe frame");
        let envelope = sonde_wire::decode(&frame).expect("envelope");
        assert_eq!(envelope.message_type, sonde_wire::MessageType::ProbeRequest);
        let request: ProbeRequest = envelope.payload_as().expect("request payload");
        assert_eq!(request.probe, "system.uptime");
        d2.handle_response(&id2, response("system.uptime", Some(request.request_id)));
    });

    let resp = d
        .send_probe("srv1", "system.uptime", serde_json::json!({}), None)
        .await
        .expect("probe result");
    assert_eq!(resp.status, ProbeStatus::Success);
    assert_eq!(d.pending_count(), 0);
    reply.await.expect("reply task");
}

#[tokio::test]
async fn missing_agent_fails_immediately() {
    let d = Dispatcher::new();
    let err = d
        .send_probe("ghost", "system.uptime", serde_json::json!({}), None)
        .await
        .expect_err("no agent");
    assert_eq!(err, DispatchError::AgentUnavailable);
}

#[tokio::test(start_paused = true)]
async fn probe_times_out_and_late_response_is_dropped() {
    let d = Arc::new(Dispatcher::new());
    let id = AgentId::generate();
    let (s, mut rx) = sink();
    d.register_agent(id.clone(), "srv1", s);

    let fut = d.send_probe("srv1", "system.disk.usage", serde_json::json!({"all": true}), None);
    tokio::pin!(fut);

    // Nothing answers; the default 30s deadline elapses under paused time.
    let err = fut.await.expect_err("timeout");
    assert_eq!(
        err.to_string(),
        "Probe 'system.disk.usage' timed out after 30000ms"
    );
    assert_eq!(d.pending_count(), 0);

    // The late response misses correlation and is dropped silently.
    let frame = rx.recv().await.expect("probe frame");
    let envelope = sonde_wire::decode(&frame).expect("envelope");
    let request: ProbeRequest = envelope.payload_as().expect("request payload");
    d.handle_response(&id, response("system.disk.usage", Some(request.request_id)));
    assert_eq!(d.pending_count(), 0);
}

#[tokio::test]
async fn disconnect_rejects_all_pending_for_that_agent() {
    let d = Arc::new(Dispatcher::new());
    let id = AgentId::generate();
    let (s, _rx) = sink();
    d.register_agent(id.clone(), "srv1", s);

    let d2 = Arc::clone(&d);
    let probe = tokio::spawn(async move {
        d2.send_probe("srv1", "system.uptime", serde_json::json!({}), None).await
    });

    // Wait for the pending entry to appear, then drop the agent.
    while d.pending_count() == 0 {
        tokio::task::yield_now().await;
    }
    d.remove_agent(&id);

    let err = probe.await.expect("join").expect_err("disconnected");
    assert_eq!(err, DispatchError::AgentDisconnected("srv1".into()));
}

#[tokio::test]
async fn response_without_request_id_matches_oldest_pending() {
    let d = Arc::new(Dispatcher::new());
    let id = AgentId::generate();
    let (s, mut rx) = sink();
    d.register_agent(id.clone(), "srv1", s);

    let d2 = Arc::clone(&d);
    let probe = tokio::spawn(async move {
        d2.send_probe("srv1", "system.uptime", serde_json::json!({}), None).await
    });
    let _ = rx.recv().await;

    while d.pending_count() == 0 {
        tokio::task::yield_now().await;
    }
    // Compatibility path: no echoed id.
    d.handle_response(&id, response("system.uptime", None));
    let resp = probe.await.expect("join").expect("resolved");
    assert_eq!(resp.probe, "system.uptime");
}

#[tokio::test]
async fn observers_receive_status_on_attach_and_on_change() {
    let d = Dispatcher::new();
    let (obs, mut obs_rx) = sink();
    d.add_observer(obs);

    // Attach snapshot with no agents.
    let first: serde_json::Value =
        serde_json::from_str(&obs_rx.recv().await.expect("attach frame")).expect("json");
    assert_eq!(first["type"], "agent.status");
    assert!(first["onlineAgents"].as_array().expect("array").is_empty());

    let id = AgentId::generate();
    let (s, _rx) = sink();
    d.register_agent(id.clone(), "srv1", s);

    let second: serde_json::Value =
        serde_json::from_str(&obs_rx.recv().await.expect("update frame")).expect("json");
    assert_eq!(second["onlineAgents"][0]["name"], "srv1");
    assert_eq!(second["onlineAgentIds"][0], id.to_string());

    d.remove_agent(&id);
    let third: serde_json::Value =
        serde_json::from_str(&obs_rx.recv().await.expect("removal frame")).expect("json");
    assert!(third["onlineAgents"].as_array().expect("array").is_empty());
}

#[tokio::test]
async fn signed_probe_requests_verify_against_hub_key() {
    let d = Dispatcher::new();
    let key = Arc::new(EnvelopeKey::generate());
    let pub_pem = key.public_key_pem().expect("pub pem");
    d.set_signing_key(key);

    let id = AgentId::generate();
    let (s, mut rx) = sink();
    d.register_agent(id.clone(), "srv1", s);

    let send = d.send_probe("srv1", "system.uptime", serde_json::json!({}), Some(50));
    let recv = async {
        let frame = rx.recv().await.expect("frame");
        sonde_wire::decode(&frame).expect("envelope")
    };
    let (send_result, envelope) = tokio::join!(send, recv);
    assert!(send_result.is_err()); // nothing replies; timeout

    assert!(!envelope.signature.is_empty());
    sonde_wire::verify_payload(&pub_pem, &envelope.payload, &envelope.signature)
        .expect("hub signature verifies");
}
