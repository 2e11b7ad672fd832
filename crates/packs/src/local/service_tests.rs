// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::effects::FakeExec;
use crate::registry::{HandlerError, LocalCtx};
use std::sync::Arc;

fn handler(name: &str) -> LocalHandler {
    let pack = service_pack();
    match &pack.kind {
        PackKind::Local(handlers) => handlers[name].clone(),
        _ => unreachable!("service is a local pack"),
    }
}

#[test]
fn parses_show_properties() {
    let v = parse_show("ActiveState=active\nSubState=running\nMainPID=1234\n");
    assert_eq!(v["ActiveState"], "active");
    assert_eq!(v["MainPID"], "1234");
}

#[tokio::test]
async fn status_requires_the_service_param() {
    let exec = Arc::new(FakeExec::new());
    let err = handler("status")(LocalCtx {
        params: serde_json::json!({}),
        exec,
        timeout_ms: 10_000,
    })
    .await
    .unwrap_err();
    assert!(matches!(err, HandlerError::MissingParam(p) if p == "service"));
}

#[tokio::test]
async fn status_reports_active_state() {
    let exec = Arc::new(FakeExec::new());
    exec.push_stdout("active\n");
    exec.push_stdout("ActiveState=active\nSubState=running\n");

    let result = handler("status")(LocalCtx {
        params: serde_json::json!({"service": "nginx"}),
        exec: exec.clone(),
        timeout_ms: 10_000,
    })
    .await
    .unwrap();

    assert_eq!(result["service"], "nginx");
    assert_eq!(result["active"], true);
    assert_eq!(result["properties"]["SubState"], "running");
    assert_eq!(exec.calls()[0].1[0], "is-active");
}

#[tokio::test]
async fn list_parses_plain_units() {
    let exec = Arc::new(FakeExec::new());
    exec.push_stdout("nginx.service loaded active running\nsshd.service loaded failed failed\n");
    let result = handler("list")(LocalCtx {
        params: serde_json::json!({}),
        exec,
        timeout_ms: 15_000,
    })
    .await
    .unwrap();
    let units = result["units"].as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[1]["active"], "failed");
}
