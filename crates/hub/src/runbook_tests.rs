// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use sonde_core::{PackStatus, Severity};
use sonde_packs::{builtin_runbooks, FakeFetch, PackRegistry};
use crate::integration::IntegrationExecutor;

struct Fixture {
    engine: RunbookEngine,
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
        registry,
        Arc::clone(&dispatcher),
        integrations,
        Arc::clone(&store),
    ));
    let engine = RunbookEngine::new(
        router,
        Arc::clone(&dispatcher),
        Arc::clone(&store),
        builtin_runbooks(),
    );
    Fixture { engine, fetch, store, dispatcher }
}

#[tokio::test]
async fn unknown_category_is_rejected() {
    let f = fixture();
    let err = f.engine.execute_diagnostic("ghost", &json!({}), None).await.unwrap_err();
    assert!(matches!(err, RunbookError::UnknownCategory(_)));
}

#[tokio::test]
async fn missing_required_params_are_rejected_before_any_probe() {
    let f = fixture();
    let err =
        f.engine.execute_diagnostic("service_health", &json!({}), Some("srv1")).await.unwrap_err();
    match err {
        RunbookError::MissingParams(names) => assert_eq!(names, "service"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(f.store.audit_since(0, 10).unwrap().is_empty());
}

#[tokio::test]
async fn connectivity_runbook_produces_findings_from_probe_results() {
    let f = fixture();
    f.fetch.push_json(200, json!({"origin": "1.2.3.4"}));

    let result = f.engine.execute_diagnostic("connectivity", &json!({}), None).await.unwrap();
    assert_eq!(result.category, "connectivity");
    assert_eq!(result.summary.probes_run, 1);
    assert_eq!(result.summary.probes_succeeded, 1);
    assert_eq!(result.findings[0].severity, Severity::Info);
    assert!(result.probe_results.contains_key("httpbin.ip"));
}

#[tokio::test]
async fn failed_probe_surfaces_as_critical_connectivity_finding() {
    let f = fixture();
    f.fetch.push_error(sonde_packs::FetchError::Network("unreachable".into()));

    let result = f.engine.execute_diagnostic("connectivity", &json!({}), None).await.unwrap();
    assert_eq!(result.summary.probes_failed, 1);
    assert_eq!(result.findings[0].severity, Severity::Critical);
}

#[tokio::test]
async fn system_health_runs_probes_even_when_agent_is_offline() {
    // Agent-scoped probes fail per-probe (recorded as results) without
    // aborting the plan.
    let f = fixture();
    let result = f
        .engine
        .execute_diagnostic("system_health", &json!({}), Some("ghost"))
        .await
        .unwrap();
    assert_eq!(result.summary.probes_run, 4);
    assert_eq!(result.summary.probes_failed, 4);
    // Each failure becomes a warning via the generic failure rule.
    assert!(result.findings.iter().all(|f| f.severity == Severity::Warning));
}

#[tokio::test]
async fn health_check_discovers_applicable_runbooks_and_skips_param_gated() {
    let f = fixture();
    // An active integration makes `connectivity` applicable.
    f.store
        .create_integration("httpbin", "httpbin", "httpbin", &json!({}), None, 1_000)
        .unwrap();
    // An online agent with the service pack makes `service_health`
    // applicable — but it requires a `service` param, so it is skipped.
    f.store
        .upsert_agent(
            "srv1",
            "linux",
            "1.0.0",
            &[PackStatus { name: "service".into(), version: "1.0.0".into(), status: "active".into() }],
            1_000,
        )
        .unwrap();
    let (tx, _rx) = tokio::sync::mpsc::channel(8);
    f.dispatcher.register_agent(
        sonde_core::AgentId::generate(),
        "srv1",
        crate::dispatcher::Sink::new(sonde_core::SocketId::new(), tx),
    );

    f.fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    let report = f.engine.health_check(None, None).await;

    assert_eq!(report.skipped, vec!["service_health"]);
    assert_eq!(report.categories.len(), 1);
    assert_eq!(report.categories[0].category, "connectivity");
    assert_eq!(report.categories[0].status, "healthy");
    assert!(!report.findings.is_empty());
}

#[tokio::test]
async fn health_check_honours_category_filter() {
    let f = fixture();
    f.store
        .create_integration("httpbin", "httpbin", "httpbin", &json!({}), None, 1_000)
        .unwrap();
    let report = f.engine.health_check(None, Some(&["service_health".to_string()])).await;
    assert!(report.categories.is_empty());
    assert!(report.skipped.is_empty());
}
