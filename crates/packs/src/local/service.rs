// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `service` pack: systemd unit observations.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use sonde_core::CapabilityLevel;

use super::{exec_err, require_str_param};
use crate::manifest::{DetectHints, PackManifest, ParamSchema, ProbeSpec, Requires, RunbookContribution};
use crate::registry::{LocalCtx, LocalHandler, Pack, PackKind};

pub fn service_pack() -> Pack {
    let manifest = PackManifest {
        name: "service".into(),
        version: "1.0.0".into(),
        description: "systemd unit status".into(),
        requires: Requires { commands: vec!["systemctl".into()], ..Default::default() },
        probes: vec![
            ProbeSpec {
                name: "status".into(),
                description: "State of one unit via systemctl".into(),
                capability: CapabilityLevel::Observe,
                params: Some(ParamSchema { required: vec!["service".into()] }),
                timeout_ms: Some(10_000),
            },
            ProbeSpec {
                name: "list".into(),
                description: "Loaded service units".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(15_000),
            },
        ],
        detect: Some(DetectHints { commands: vec!["systemctl".into()], files: vec![] }),
        runbook: Some(RunbookContribution {
            category: "service_health".into(),
            probes: vec!["service.status".into()],
            parallel: false,
            params: Some(ParamSchema { required: vec!["service".into()] }),
        }),
        signature: None,
    };

    let mut handlers: BTreeMap<String, LocalHandler> = BTreeMap::new();
    handlers.insert("status".into(), status());
    handlers.insert("list".into(), list());

    Pack { manifest, kind: PackKind::Local(handlers) }
}

fn status() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let unit = require_str_param(&ctx.params, "service")?;
            let args = vec!["is-active".to_string(), unit.clone()];
            let active = ctx.exec.run("systemctl", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            let show_args = vec![
                "show".to_string(),
                unit.clone(),
                "--property=ActiveState,SubState,MainPID,ExecMainStartTimestamp".to_string(),
            ];
            let show =
                ctx.exec.run("systemctl", &show_args, ctx.timeout_ms).await.map_err(exec_err)?;
            Ok(json!({
                "service": unit,
                "active": active.stdout.trim() == "active",
                "state": active.stdout.trim(),
                "properties": parse_show(&show.stdout),
            }))
        })
    })
}

fn list() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let args = vec![
                "list-units".to_string(),
                "--type=service".to_string(),
                "--no-pager".to_string(),
                "--plain".to_string(),
                "--no-legend".to_string(),
            ];
            let out = ctx.exec.run("systemctl", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            let units: Vec<Value> = out
                .stdout
                .lines()
                .filter_map(|line| {
                    let cols: Vec<&str> = line.split_whitespace().collect();
                    if cols.len() < 4 {
                        return None;
                    }
                    Some(json!({
                        "unit": cols[0],
                        "load": cols[1],
                        "active": cols[2],
                        "sub": cols[3],
                    }))
                })
                .collect();
            Ok(json!({ "units": units }))
        })
    })
}

/// Parse `systemctl show --property=...` `Key=Value` lines.
pub(crate) fn parse_show(stdout: &str) -> Value {
    let mut map = serde_json::Map::new();
    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.to_string(), json!(value));
        }
    }
    Value::Object(map)
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
