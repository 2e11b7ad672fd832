// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn request_serializes_camel_case() {
    let mut req = ProbeRequest::new("system.disk.usage");
    req.request_id = RequestId::from_string("req-1");
    req.params.insert("all".into(), json!(true));

    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["probe"], "system.disk.usage");
    assert_eq!(v["timeoutMs"], 30_000);
    assert_eq!(v["requestId"], "req-1");
    assert_eq!(v["params"]["all"], true);
}

#[test]
fn empty_params_are_omitted() {
    let req = ProbeRequest::new("system.uptime");
    let v = serde_json::to_value(&req).unwrap();
    assert!(v.get("params").is_none());
    assert!(v.get("requester").is_none());
}

#[test]
fn error_response_wraps_message() {
    let meta = ProbeMetadata {
        agent_version: "hub".into(),
        pack_name: "httpbin".into(),
        pack_version: "1.0.0".into(),
        capability_level: CapabilityLevel::Observe,
    };
    let resp = ProbeResponse::error("httpbin.ip", "boom", 12, meta);
    assert_eq!(resp.status, ProbeStatus::Error);
    assert_eq!(resp.data["error"], "boom");
    assert!(!resp.is_success());
}

#[test]
fn status_round_trips_snake_case() {
    let v = serde_json::to_value(ProbeStatus::Timeout).unwrap();
    assert_eq!(v, "timeout");
    let back: ProbeStatus = serde_json::from_value(v).unwrap();
    assert_eq!(back, ProbeStatus::Timeout);
}

#[test]
fn capability_levels_order_by_privilege() {
    assert!(CapabilityLevel::Observe < CapabilityLevel::Act);
    assert!(CapabilityLevel::Act < CapabilityLevel::Admin);
}
