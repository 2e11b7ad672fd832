// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use sonde_core::RequestId;
use sonde_packs::FakeExec;

fn executor(exec: Arc<FakeExec>) -> Executor {
    Executor::new(
        sonde_packs::PackRegistry::local_for_agent(&Default::default()),
        exec,
        Scrubber::default(),
        "srv1",
    )
}

fn request(probe: &str) -> ProbeRequest {
    let mut r = ProbeRequest::new(probe);
    r.request_id = RequestId::from_string("req-fixed");
    r
}

#[tokio::test]
async fn success_carries_metadata_and_echoes_request_id() {
    let exec = Arc::new(FakeExec::new());
    exec.push_stdout("12345.0 5.0\n");
    let executor = executor(exec);

    let resp = executor.execute(&request("system.uptime")).await;
    assert_eq!(resp.status, ProbeStatus::Success);
    assert_eq!(resp.data["uptimeSeconds"], 12345.0);
    assert_eq!(resp.request_id, Some(RequestId::from_string("req-fixed")));
    assert_eq!(resp.metadata.pack_name, "system");
    assert_eq!(resp.metadata.capability_level, CapabilityLevel::Observe);
    assert_eq!(resp.metadata.agent_version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn unknown_pack_probe_and_malformed_names_error_structurally() {
    let executor = executor(Arc::new(FakeExec::new()));
    for probe in ["ghost.x", "system.nope", "nodots"] {
        let resp = executor.execute(&request(probe)).await;
        assert_eq!(resp.status, ProbeStatus::Error, "{probe}");
        assert!(resp.data["error"].is_string(), "{probe}");
        assert_eq!(resp.request_id, Some(RequestId::from_string("req-fixed")));
    }
}

#[tokio::test]
async fn integration_packs_do_not_run_on_agents() {
    // local_for_agent filters them; a full registry still refuses.
    let exec: Arc<dyn sonde_packs::ExecFn> = Arc::new(FakeExec::new());
    let executor = Executor::new(
        sonde_packs::PackRegistry::builtin(),
        exec,
        Scrubber::default(),
        "srv1",
    );
    let resp = executor.execute(&request("httpbin.ip")).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert!(resp.data["error"].as_str().unwrap().contains("does not run on agents"));
}

#[tokio::test]
async fn handler_failures_become_error_responses() {
    let exec = Arc::new(FakeExec::new());
    exec.push_result(Err(sonde_packs::ExecError::Timeout(5_000)));
    let executor = executor(exec);

    let resp = executor.execute(&request("system.memory")).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert!(resp.data["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn output_is_scrubbed_before_leaving() {
    let exec = Arc::new(FakeExec::new());
    // journalctl output with an embedded secret.
    exec.push_stdout("starting with DB_PASSWORD=hunter2\nready\n");
    let executor = executor(exec);

    let mut req = request("logs.systemd");
    req.params.insert("unit".into(), json!("app"));
    let resp = executor.execute(&req).await;
    assert_eq!(resp.status, ProbeStatus::Success);
    let joined = resp.data["lines"].to_string();
    assert!(!joined.contains("hunter2"));
    assert!(joined.contains("[REDACTED]"));
}

#[tokio::test]
async fn every_execution_lands_in_the_audit_ring() {
    let exec = Arc::new(FakeExec::new());
    exec.push_stdout("1.0 1.0\n");
    let executor = executor(exec);

    executor.execute(&request("system.uptime")).await;
    executor.execute(&request("ghost.x")).await;

    assert_eq!(executor.ring_len(), 2);
    assert!(executor.verify_ring().valid);
}
