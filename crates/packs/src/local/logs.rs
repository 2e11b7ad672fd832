// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `logs` pack: bounded log tails from systemd, docker, and nginx.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use sonde_core::CapabilityLevel;

use super::{exec_err, require_str_param};
use crate::manifest::{PackManifest, ParamSchema, ProbeSpec, Requires};
use crate::registry::{HandlerError, LocalCtx, LocalHandler, Pack, PackKind};

const DEFAULT_LINES: u64 = 100;
const MAX_LINES: u64 = 1_000;

pub fn logs_pack() -> Pack {
    let manifest = PackManifest {
        name: "logs".into(),
        version: "1.0.0".into(),
        description: "Bounded log tails for common sources".into(),
        requires: Requires::default(),
        probes: vec![
            ProbeSpec {
                name: "systemd".into(),
                description: "journalctl tail for one unit".into(),
                capability: CapabilityLevel::Observe,
                params: Some(ParamSchema { required: vec!["unit".into()] }),
                timeout_ms: Some(15_000),
            },
            ProbeSpec {
                name: "docker".into(),
                description: "docker logs tail for one container".into(),
                capability: CapabilityLevel::Observe,
                params: Some(ParamSchema { required: vec!["container".into()] }),
                timeout_ms: Some(15_000),
            },
            ProbeSpec {
                name: "nginx".into(),
                description: "nginx error log tail".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(10_000),
            },
        ],
        detect: None,
        runbook: None,
        signature: None,
    };

    let mut handlers: BTreeMap<String, LocalHandler> = BTreeMap::new();
    handlers.insert("systemd".into(), systemd());
    handlers.insert("docker".into(), docker());
    handlers.insert("nginx".into(), nginx());

    Pack { manifest, kind: PackKind::Local(handlers) }
}

/// Clamp a requested line count into `[1, MAX_LINES]`.
pub(crate) fn line_count(params: &Value) -> u64 {
    params
        .get("lines")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_LINES)
        .clamp(1, MAX_LINES)
}

fn lines_value(stdout: &str) -> Value {
    let lines: Vec<&str> = stdout.lines().collect();
    json!({ "lines": lines, "count": lines.len() })
}

fn systemd() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let unit = require_str_param(&ctx.params, "unit")?;
            let n = line_count(&ctx.params);
            let args = vec![
                "-u".to_string(),
                unit,
                "-n".to_string(),
                n.to_string(),
                "--no-pager".to_string(),
                "-o".to_string(),
                "short-iso".to_string(),
            ];
            let out = ctx.exec.run("journalctl", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            Ok(lines_value(&out.stdout))
        })
    })
}

fn docker() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let container = require_str_param(&ctx.params, "container")?;
            let n = line_count(&ctx.params);
            let args =
                vec!["logs".to_string(), "--tail".to_string(), n.to_string(), container];
            let out = ctx.exec.run("docker", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            // docker writes container logs to both streams.
            let merged = format!("{}{}", out.stdout, out.stderr);
            Ok(lines_value(&merged))
        })
    })
}

fn nginx() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let file = ctx
                .params
                .get("file")
                .and_then(|v| v.as_str())
                .unwrap_or("/var/log/nginx/error.log");
            // Refuse path traversal outside the nginx log directory.
            if !file.starts_with("/var/log/nginx/") || file.contains("..") {
                return Err(HandlerError::Failed(format!("refusing to read {file}")));
            }
            let n = line_count(&ctx.params);
            let args = vec!["-n".to_string(), n.to_string(), file.to_string()];
            let out = ctx.exec.run("tail", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            Ok(lines_value(&out.stdout))
        })
    })
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
