// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use sonde_packs::{builtin_runbooks, FakeFetch};
use crate::integration::IntegrationExecutor;
use crate::runbook::RunbookEngine;

struct Fixture {
    tools: ToolSurface,
    fetch: Arc<FakeFetch>,
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
}

fn fixture() -> Fixture {
    let store = Arc::new(Store::open_in_memory(None).unwrap());
    let registry = Arc::new(PackRegistry::builtin());
    let dispatcher = Arc::new(Dispatcher::new());
    let fetch = Arc::new(FakeFetch::new());
    let integrations = Arc::new(IntegrationExecutor::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        fetch.clone() as Arc<dyn sonde_packs::HttpFetch>,
    ));
    let router = Arc::new(ProbeRouter::new(
        Arc::clone(&registry),
        Arc::clone(&dispatcher),
        integrations,
        Arc::clone(&store),
    ));
    let engine = Arc::new(RunbookEngine::new(
        Arc::clone(&router),
        Arc::clone(&dispatcher),
        Arc::clone(&store),
        builtin_runbooks(),
    ));
    let tools = ToolSurface::new(router, engine, Arc::clone(&dispatcher), Arc::clone(&store), registry);
    Fixture { tools, fetch, store, dispatcher }
}

fn online_agent(f: &Fixture, name: &str) -> sonde_core::AgentId {
    let rec = f.store.upsert_agent(name, "linux", "1.0.0", &[], 1_000).unwrap();
    let (tx, _rx) = tokio::sync::mpsc::channel(8);
    f.dispatcher.register_agent(
        rec.id.clone(),
        name,
        crate::dispatcher::Sink::new(sonde_core::SocketId::new(), tx),
    );
    rec.id
}

#[tokio::test]
async fn probe_tool_returns_structured_response() {
    let f = fixture();
    f.fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    let v = f.tools.probe("httpbin.ip", json!({}), None).await;
    assert_eq!(v["status"], "success");
    assert_eq!(v["data"]["origin"], "1.2.3.4");
    assert!(v.get("isError").is_none());
}

#[tokio::test]
async fn offline_agent_yields_is_error_with_last_seen() {
    let f = fixture();
    f.store.upsert_agent("srv1", "linux", "1.0.0", &[], 1_000).unwrap();
    let v = f.tools.probe("system.uptime", json!({}), Some("srv1")).await;
    assert_eq!(v["isError"], true);
    let msg = v["error"].as_str().unwrap();
    assert!(msg.contains("srv1 offline, last seen"), "got: {msg}");
}

#[tokio::test]
async fn unknown_agent_yields_is_error() {
    let f = fixture();
    let v = f.tools.probe("system.uptime", json!({}), Some("ghost")).await;
    assert_eq!(v["isError"], true);
}

#[tokio::test]
async fn list_agents_merges_live_and_stored_state() {
    let f = fixture();
    online_agent(&f, "srv1");
    f.store.upsert_agent("srv2", "linux", "1.0.0", &[], 1_000).unwrap();

    let v = f.tools.list_agents();
    let agents = v["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0]["name"], "srv1");
    assert_eq!(agents[0]["online"], true);
    assert_eq!(agents[1]["name"], "srv2");
    assert_eq!(agents[1]["online"], false);
    assert_eq!(agents[1]["status"], "offline");
}

#[tokio::test]
async fn agent_overview_reports_record_fields() {
    let f = fixture();
    online_agent(&f, "srv1");
    let v = f.tools.agent_overview("srv1");
    assert_eq!(v["name"], "srv1");
    assert_eq!(v["online"], true);

    let v = f.tools.agent_overview("ghost");
    assert_eq!(v["isError"], true);
}

#[tokio::test]
async fn list_capabilities_covers_packs_and_categories() {
    let f = fixture();
    let v = f.tools.list_capabilities();
    let packs = v["packs"].as_array().unwrap();
    let names: Vec<&str> = packs.iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"system"));
    assert!(names.contains(&"httpbin"));
    let categories = v["categories"].as_array().unwrap();
    assert!(categories.iter().any(|c| c == "system_health"));

    let httpbin = packs.iter().find(|p| p["name"] == "httpbin").unwrap();
    assert_eq!(httpbin["kind"], "integration");
    assert!(httpbin["probes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["name"] == "httpbin.ip"));
}

#[tokio::test]
async fn query_logs_routes_audit_source_to_store() {
    let f = fixture();
    f.fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    f.tools.probe("httpbin.ip", json!({}), None).await;

    let v = f.tools.query_logs("audit", None, json!({})).await;
    assert_eq!(v["entries"].as_array().unwrap().len(), 1);

    let v = f.tools.query_logs("systemd", None, json!({})).await;
    assert_eq!(v["isError"], true);

    let v = f.tools.query_logs("syslog", None, json!({})).await;
    assert_eq!(v["isError"], true);
}

#[tokio::test]
async fn critical_path_stops_at_first_broken_hop() {
    let f = fixture();
    // First hop succeeds, second fails; third never runs.
    f.fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    f.fetch.push_error(sonde_packs::FetchError::Network("down".into()));

    let v = f
        .tools
        .check_critical_path(&json!("httpbin.ip -> httpbin.headers -> httpbin.ip"))
        .await;
    assert_eq!(v["healthy"], false);
    assert_eq!(v["firstBrokenHop"], 2);
    assert_eq!(v["hops"].as_array().unwrap().len(), 2);
    assert_eq!(v["hops"][0]["status"], "ok");
}

#[tokio::test]
async fn critical_path_accepts_hop_objects() {
    let f = fixture();
    f.fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    let v = f
        .tools
        .check_critical_path(&json!([{"probe": "httpbin.ip"}]))
        .await;
    assert_eq!(v["healthy"], true);
    assert_eq!(v["firstBrokenHop"], Value::Null);

    let v = f.tools.check_critical_path(&json!(42)).await;
    assert_eq!(v["isError"], true);
    let v = f.tools.check_critical_path(&json!("")).await;
    assert_eq!(v["isError"], true);
}

#[tokio::test]
async fn trending_summary_aggregates_audit_entries() {
    let f = fixture();
    // Two successes and one failure for the same probe.
    f.fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    f.tools.probe("httpbin.ip", json!({}), None).await;
    f.fetch.push_error(sonde_packs::FetchError::Status { status: 404, body: "x".into() });
    f.tools.probe("httpbin.ip", json!({"fresh": 1}), None).await;

    let v = f.tools.trending_summary(24, None, None);
    let probes = v["probes"].as_array().unwrap();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0]["probe"], "httpbin.ip");
    assert_eq!(probes[0]["count"], 2);
    assert_eq!(probes[0]["errors"], 1);
    assert_eq!(probes[0]["errorRate"], 0.5);

    // Probe filter with no matches yields an empty set, not an error.
    let v = f.tools.trending_summary(24, Some("system.uptime"), None);
    assert!(v["probes"].as_array().unwrap().is_empty());
}
