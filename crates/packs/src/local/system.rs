// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `system` pack: disk, memory, load, uptime.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use sonde_core::CapabilityLevel;

use super::exec_err;
use crate::manifest::{PackManifest, ProbeSpec, Requires, RunbookContribution};
use crate::registry::{LocalCtx, LocalHandler, Pack, PackKind};

pub fn system_pack() -> Pack {
    let manifest = PackManifest {
        name: "system".into(),
        version: "1.0.0".into(),
        description: "Base host observations: disk, memory, CPU load, uptime".into(),
        requires: Requires { commands: vec!["df".into(), "free".into()], ..Default::default() },
        probes: vec![
            ProbeSpec {
                name: "disk.usage".into(),
                description: "Filesystem usage via df -P".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(10_000),
            },
            ProbeSpec {
                name: "memory".into(),
                description: "Memory usage via free -b".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(10_000),
            },
            ProbeSpec {
                name: "cpu.load".into(),
                description: "Load averages from /proc/loadavg".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(5_000),
            },
            ProbeSpec {
                name: "uptime".into(),
                description: "Seconds since boot from /proc/uptime".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(5_000),
            },
        ],
        detect: None,
        runbook: Some(RunbookContribution {
            category: "system_health".into(),
            probes: vec![
                "system.disk.usage".into(),
                "system.memory".into(),
                "system.cpu.load".into(),
                "system.uptime".into(),
            ],
            parallel: true,
            params: None,
        }),
        signature: None,
    };

    let mut handlers: BTreeMap<String, LocalHandler> = BTreeMap::new();
    handlers.insert("disk.usage".into(), disk_usage());
    handlers.insert("memory".into(), memory());
    handlers.insert("cpu.load".into(), cpu_load());
    handlers.insert("uptime".into(), uptime());

    Pack { manifest, kind: PackKind::Local(handlers) }
}

fn disk_usage() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let mut args = vec!["-P".to_string(), "-k".to_string()];
            if let Some(path) = ctx.params.get("path").and_then(|v| v.as_str()) {
                args.push(path.to_string());
            }
            let out = ctx.exec.run("df", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            Ok(parse_df(&out.stdout))
        })
    })
}

fn memory() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let args = vec!["-b".to_string()];
            let out = ctx.exec.run("free", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            Ok(parse_free(&out.stdout))
        })
    })
}

fn cpu_load() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let args = vec!["/proc/loadavg".to_string()];
            let out = ctx.exec.run("cat", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            Ok(parse_loadavg(&out.stdout))
        })
    })
}

fn uptime() -> LocalHandler {
    Arc::new(|ctx: LocalCtx| {
        Box::pin(async move {
            let args = vec!["/proc/uptime".to_string()];
            let out = ctx.exec.run("cat", &args, ctx.timeout_ms).await.map_err(exec_err)?;
            let seconds = out
                .stdout
                .split_whitespace()
                .next()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);
            Ok(json!({ "uptimeSeconds": seconds }))
        })
    })
}

/// Parse `df -P -k` output into per-filesystem rows.
pub(crate) fn parse_df(stdout: &str) -> Value {
    let rows: Vec<Value> = stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 6 {
                return None;
            }
            Some(json!({
                "filesystem": cols[0],
                "sizeKb": cols[1].parse::<u64>().unwrap_or(0),
                "usedKb": cols[2].parse::<u64>().unwrap_or(0),
                "availableKb": cols[3].parse::<u64>().unwrap_or(0),
                "usePercent": cols[4].trim_end_matches('%').parse::<u64>().unwrap_or(0),
                "mountedOn": cols[5],
            }))
        })
        .collect();
    json!({ "filesystems": rows })
}

/// Parse `free -b` output.
pub(crate) fn parse_free(stdout: &str) -> Value {
    let mut mem = json!(null);
    let mut swap = json!(null);
    for line in stdout.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() >= 4 && cols[0] == "Mem:" {
            mem = json!({
                "totalBytes": cols[1].parse::<u64>().unwrap_or(0),
                "usedBytes": cols[2].parse::<u64>().unwrap_or(0),
                "freeBytes": cols[3].parse::<u64>().unwrap_or(0),
                "availableBytes": cols.get(6).and_then(|c| c.parse::<u64>().ok()),
            });
        } else if cols.len() >= 4 && cols[0] == "Swap:" {
            swap = json!({
                "totalBytes": cols[1].parse::<u64>().unwrap_or(0),
                "usedBytes": cols[2].parse::<u64>().unwrap_or(0),
            });
        }
    }
    json!({ "memory": mem, "swap": swap })
}

/// Parse `/proc/loadavg`.
pub(crate) fn parse_loadavg(content: &str) -> Value {
    let cols: Vec<&str> = content.split_whitespace().collect();
    let load = |i: usize| cols.get(i).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
    json!({
        "load1": load(0),
        "load5": load(1),
        "load15": load(2),
    })
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
