// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The MCP tool surface.
//!
//! The MCP HTTP transport lives outside the core; these methods are the
//! contract it calls. Every response is JSON; failures carry
//! `isError: true` and a human message.

use serde_json::{json, Value};
use std::sync::Arc;

use sonde_core::{AgentStatus, ProbeStatus};
use sonde_packs::{PackKind, PackRegistry};
use sonde_storage::Store;

use crate::dispatcher::Dispatcher;
use crate::router::ProbeRouter;
use crate::runbook::RunbookEngine;

/// All diagnostic tools served to MCP clients.
pub struct ToolSurface {
    router: Arc<ProbeRouter>,
    engine: Arc<RunbookEngine>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<Store>,
    registry: Arc<PackRegistry>,
}

fn tool_error(message: impl Into<String>) -> Value {
    json!({ "isError": true, "error": message.into() })
}

fn format_ms(ms: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

impl ToolSurface {
    pub fn new(
        router: Arc<ProbeRouter>,
        engine: Arc<RunbookEngine>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<Store>,
        registry: Arc<PackRegistry>,
    ) -> Self {
        Self { router, engine, dispatcher, store, registry }
    }

    /// Resolve an agent argument, failing with the offline message when it
    /// is not currently connected.
    fn require_online(&self, agent: &str) -> Result<(), Value> {
        if self.dispatcher.resolve(agent).is_some() {
            return Ok(());
        }
        match self.store.agent_by_name(agent) {
            Ok(Some(rec)) => Err(tool_error(format!(
                "{} offline, last seen {}",
                rec.name,
                format_ms(rec.last_seen_ms)
            ))),
            _ => Err(tool_error(format!("Unknown agent '{agent}'"))),
        }
    }

    /// `probe` — a single routed probe execution.
    pub async fn probe(&self, probe: &str, params: Value, agent: Option<&str>) -> Value {
        if !self.router_is_integration(probe) {
            if let Some(agent) = agent {
                if let Err(e) = self.require_online(agent) {
                    return e;
                }
            }
        }
        match self.router.execute(probe, &params, agent, None).await {
            Ok(resp) => serde_json::to_value(&resp).unwrap_or_else(|_| tool_error("serialization failed")),
            Err(e) => tool_error(e.to_string()),
        }
    }

    fn router_is_integration(&self, probe: &str) -> bool {
        self.registry.is_integration_probe(probe)
    }

    /// `diagnose` — run one runbook category.
    pub async fn diagnose(&self, category: &str, params: Value, agent: Option<&str>) -> Value {
        match self.engine.execute_diagnostic(category, &params, agent).await {
            Ok(result) => result.to_value(),
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// `list_agents` — live view merged with stored records.
    pub fn list_agents(&self) -> Value {
        match self.store.list_agents() {
            Ok(records) => {
                let agents: Vec<Value> = records
                    .iter()
                    .map(|rec| {
                        let online = self.dispatcher.is_online(&rec.name);
                        let status = if online {
                            rec.status.to_string()
                        } else {
                            AgentStatus::Offline.to_string()
                        };
                        json!({
                            "id": rec.id,
                            "name": rec.name,
                            "os": rec.os,
                            "version": rec.version,
                            "status": status,
                            "online": online,
                            "lastSeen": format_ms(rec.last_seen_ms),
                            "packs": rec.packs,
                        })
                    })
                    .collect();
                json!({ "agents": agents })
            }
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// `agent_overview` — one agent's stored record in full.
    pub fn agent_overview(&self, agent: &str) -> Value {
        match self.store.agent_by_name(agent) {
            Ok(Some(rec)) => json!({
                "id": rec.id,
                "name": rec.name,
                "os": rec.os,
                "version": rec.version,
                "status": rec.effective_status(now_ms()).to_string(),
                "online": self.dispatcher.is_online(&rec.name),
                "lastSeen": format_ms(rec.last_seen_ms),
                "packs": rec.packs,
                "certFingerprint": rec.cert_fingerprint,
                "attestationMismatch": rec.attestation_mismatch,
            }),
            Ok(None) => tool_error(format!("Unknown agent '{agent}'")),
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// `list_capabilities` — packs, probes, and runbook categories.
    pub fn list_capabilities(&self) -> Value {
        let packs: Vec<Value> = self
            .registry
            .iter()
            .map(|pack| {
                let kind = match pack.kind {
                    PackKind::Local(_) => "local",
                    PackKind::Integration { .. } => "integration",
                };
                json!({
                    "name": pack.manifest.name,
                    "version": pack.manifest.version,
                    "description": pack.manifest.description,
                    "kind": kind,
                    "probes": pack.manifest.probes.iter().map(|p| json!({
                        "name": format!("{}.{}", pack.manifest.name, p.name),
                        "description": p.description,
                        "capability": p.capability,
                    })).collect::<Vec<_>>(),
                    "runbook": pack.manifest.runbook.as_ref().map(|r| &r.category),
                })
            })
            .collect();
        json!({ "packs": packs, "categories": self.engine.categories() })
    }

    /// `health_check` — fan-out runbook execution with a merged report.
    pub async fn health_check(&self, agent: Option<&str>, categories: Option<Vec<String>>) -> Value {
        if let Some(agent) = agent {
            if let Err(e) = self.require_online(agent) {
                return e;
            }
        }
        let report = self.engine.health_check(agent, categories.as_deref()).await;
        serde_json::to_value(&report).unwrap_or_else(|_| tool_error("serialization failed"))
    }

    /// `query_logs` — route to the logs pack or the audit reader.
    pub async fn query_logs(&self, source: &str, agent: Option<&str>, params: Value) -> Value {
        match source {
            "systemd" | "docker" | "nginx" => {
                let Some(agent) = agent else {
                    return tool_error(format!("Log source '{source}' requires an agent"));
                };
                if let Err(e) = self.require_online(agent) {
                    return e;
                }
                self.probe(&format!("logs.{source}"), params, Some(agent)).await
            }
            "audit" => {
                let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
                match self.store.recent_audit(limit.min(1_000)) {
                    Ok(entries) => json!({ "entries": entries }),
                    Err(e) => tool_error(e.to_string()),
                }
            }
            other => tool_error(format!("Unknown log source '{other}'")),
        }
    }

    /// `check_critical_path` — ordered multi-hop probe chain; reports the
    /// first broken hop.
    pub async fn check_critical_path(&self, path: &Value) -> Value {
        let hops = match parse_path(path) {
            Ok(hops) => hops,
            Err(e) => return tool_error(e),
        };
        let mut results = Vec::new();
        let mut first_broken: Option<usize> = None;
        for (i, hop) in hops.iter().enumerate() {
            let outcome = self
                .router
                .execute(&hop.probe, &hop.params, hop.agent.as_deref(), None)
                .await;
            let (status, detail) = match &outcome {
                Ok(resp) if resp.is_success() => ("ok".to_string(), Value::Null),
                Ok(resp) => (resp.status.to_string(), resp.data.clone()),
                Err(e) => ("error".to_string(), json!({"error": e.to_string()})),
            };
            let broken = status != "ok";
            results.push(json!({
                "hop": i + 1,
                "probe": hop.probe,
                "agent": hop.agent,
                "status": status,
                "detail": detail,
            }));
            if broken {
                first_broken = Some(i + 1);
                break;
            }
        }
        json!({
            "hops": results,
            "healthy": first_broken.is_none(),
            "firstBrokenHop": first_broken,
        })
    }

    /// `trending_summary` — aggregate audit reads over a trailing window.
    pub fn trending_summary(&self, hours: u64, probe: Option<&str>, agent: Option<&str>) -> Value {
        let since = now_ms().saturating_sub(hours.max(1) * 3_600_000);
        let entries = match self.store.audit_since(since, 10_000) {
            Ok(entries) => entries,
            Err(e) => return tool_error(e.to_string()),
        };
        let mut by_probe: std::collections::BTreeMap<String, (u64, u64, u64, u64)> =
            Default::default();
        for entry in &entries {
            if let Some(filter) = probe {
                if entry.probe != filter {
                    continue;
                }
            }
            if let Some(filter) = agent {
                if !matches!(&entry.source, sonde_core::AuditSource::Agent(n) if n == filter) {
                    continue;
                }
            }
            let slot = by_probe.entry(entry.probe.clone()).or_default();
            slot.0 += 1;
            slot.3 += entry.duration_ms;
            match entry.status {
                ProbeStatus::Error => slot.1 += 1,
                ProbeStatus::Timeout => slot.2 += 1,
                ProbeStatus::Success => {}
            }
        }
        let probes: Vec<Value> = by_probe
            .into_iter()
            .map(|(name, (count, errors, timeouts, total_ms))| {
                json!({
                    "probe": name,
                    "count": count,
                    "errors": errors,
                    "timeouts": timeouts,
                    "errorRate": (errors + timeouts) as f64 / count as f64,
                    "meanDurationMs": total_ms as f64 / count as f64,
                })
            })
            .collect();
        json!({ "windowHours": hours, "probes": probes })
    }
}

struct PathHop {
    probe: String,
    agent: Option<String>,
    params: Value,
}

/// A path is either `"probe1 -> probe2"` or an array of hop objects
/// `{probe, agent?, params?}`.
fn parse_path(path: &Value) -> Result<Vec<PathHop>, String> {
    let hops = match path {
        Value::String(s) => s
            .split("->")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| PathHop {
                probe: p.to_string(),
                agent: None,
                params: Value::Object(Default::default()),
            })
            .collect::<Vec<_>>(),
        Value::Array(items) => {
            let mut hops = Vec::new();
            for item in items {
                let probe = item
                    .get("probe")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "path hop missing 'probe'".to_string())?;
                hops.push(PathHop {
                    probe: probe.to_string(),
                    agent: item.get("agent").and_then(Value::as_str).map(str::to_string),
                    params: item
                        .get("params")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Default::default())),
                });
            }
            hops
        }
        _ => return Err("path must be a string or an array of hops".to_string()),
    };
    if hops.is_empty() {
        return Err("path is empty".to_string());
    }
    Ok(hops)
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
