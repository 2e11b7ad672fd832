// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Diagnostic runbooks: probe plans plus finding-synthesis rules.
//!
//! The plan half (category, probes, parallel flag, params) comes from pack
//! manifests; the rules that turn raw probe results into findings are code
//! registered here.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use sonde_core::{Finding, ProbeResponse, Severity};

use crate::manifest::ParamSchema;

/// Synthesizes findings from the raw probe result map.
pub type FindingRule =
    Arc<dyn Fn(&BTreeMap<String, ProbeResponse>) -> Vec<Finding> + Send + Sync>;

/// One executable runbook.
pub struct DiagnosticRunbook {
    pub category: String,
    /// Fully-qualified probe names in plan order.
    pub probes: Vec<String>,
    pub parallel: bool,
    pub params: ParamSchema,
    /// Pack whose presence makes this runbook applicable.
    pub source_pack: String,
    pub rules: Vec<FindingRule>,
}

impl DiagnosticRunbook {
    pub fn synthesize(&self, results: &BTreeMap<String, ProbeResponse>) -> Vec<Finding> {
        self.rules.iter().flat_map(|rule| rule(results)).collect()
    }
}

/// All built-in diagnostic runbooks.
pub fn builtin_runbooks() -> Vec<DiagnosticRunbook> {
    vec![system_health(), service_health(), connectivity()]
}

/// Shared rule: every failed probe yields a warning finding.
fn probe_failures() -> FindingRule {
    Arc::new(|results| {
        results
            .iter()
            .filter(|(_, r)| !r.is_success())
            .map(|(name, r)| Finding {
                severity: Severity::Warning,
                title: format!("Probe {name} failed"),
                detail: r
                    .data
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("no detail")
                    .to_string(),
                related_probes: vec![name.clone()],
            })
            .collect()
    })
}

fn system_health() -> DiagnosticRunbook {
    let disk_rule: FindingRule = Arc::new(|results| {
        let mut findings = Vec::new();
        let Some(resp) = results.get("system.disk.usage").filter(|r| r.is_success()) else {
            return findings;
        };
        let empty = Vec::new();
        let filesystems =
            resp.data.get("filesystems").and_then(Value::as_array).unwrap_or(&empty);
        for fs in filesystems {
            let used = fs.get("usePercent").and_then(Value::as_u64).unwrap_or(0);
            let mount = fs.get("mountedOn").and_then(Value::as_str).unwrap_or("?");
            let severity = if used >= 90 {
                Severity::Critical
            } else if used >= 80 {
                Severity::Warning
            } else {
                continue;
            };
            findings.push(Finding {
                severity,
                title: format!("Filesystem {mount} at {used}%"),
                detail: format!("{mount} has {used}% of its capacity in use"),
                related_probes: vec!["system.disk.usage".into()],
            });
        }
        findings
    });

    let memory_rule: FindingRule = Arc::new(|results| {
        let Some(resp) = results.get("system.memory").filter(|r| r.is_success()) else {
            return Vec::new();
        };
        let mem = &resp.data["memory"];
        let total = mem.get("totalBytes").and_then(Value::as_u64).unwrap_or(0);
        let available = mem
            .get("availableBytes")
            .and_then(Value::as_u64)
            .or_else(|| mem.get("freeBytes").and_then(Value::as_u64))
            .unwrap_or(0);
        if total == 0 {
            return Vec::new();
        }
        let pct_free = (available as f64 / total as f64) * 100.0;
        let severity = if pct_free < 5.0 {
            Severity::Critical
        } else if pct_free < 15.0 {
            Severity::Warning
        } else {
            return Vec::new();
        };
        vec![Finding {
            severity,
            title: format!("Memory low: {pct_free:.1}% available"),
            detail: format!("{available} of {total} bytes available"),
            related_probes: vec!["system.memory".into()],
        }]
    });

    DiagnosticRunbook {
        category: "system_health".into(),
        probes: vec![
            "system.disk.usage".into(),
            "system.memory".into(),
            "system.cpu.load".into(),
            "system.uptime".into(),
        ],
        parallel: true,
        params: ParamSchema::default(),
        source_pack: "system".into(),
        rules: vec![disk_rule, memory_rule, probe_failures()],
    }
}

fn service_health() -> DiagnosticRunbook {
    let status_rule: FindingRule = Arc::new(|results| {
        let Some(resp) = results.get("service.status").filter(|r| r.is_success()) else {
            return Vec::new();
        };
        let service =
            resp.data.get("service").and_then(Value::as_str).unwrap_or("?").to_string();
        let active = resp.data.get("active").and_then(Value::as_bool).unwrap_or(false);
        if active {
            vec![Finding {
                severity: Severity::Info,
                title: format!("Service {service} is active"),
                detail: String::new(),
                related_probes: vec!["service.status".into()],
            }]
        } else {
            let state = resp.data.get("state").and_then(Value::as_str).unwrap_or("unknown");
            vec![Finding {
                severity: Severity::Critical,
                title: format!("Service {service} is {state}"),
                detail: format!("systemctl reports {service} as {state}"),
                related_probes: vec!["service.status".into()],
            }]
        }
    });

    DiagnosticRunbook {
        category: "service_health".into(),
        probes: vec!["service.status".into()],
        parallel: false,
        params: ParamSchema { required: vec!["service".into()] },
        source_pack: "service".into(),
        rules: vec![status_rule, probe_failures()],
    }
}

fn connectivity() -> DiagnosticRunbook {
    let egress_rule: FindingRule = Arc::new(|results| {
        match results.get("httpbin.ip") {
            Some(resp) if resp.is_success() => {
                let origin = resp.data.get("origin").and_then(Value::as_str).unwrap_or("?");
                vec![Finding {
                    severity: Severity::Info,
                    title: format!("Egress reachable, origin {origin}"),
                    detail: String::new(),
                    related_probes: vec!["httpbin.ip".into()],
                }]
            }
            Some(_) => vec![Finding {
                severity: Severity::Critical,
                title: "External API unreachable".into(),
                detail: "httpbin.ip did not return a successful response".into(),
                related_probes: vec!["httpbin.ip".into()],
            }],
            None => Vec::new(),
        }
    });

    DiagnosticRunbook {
        category: "connectivity".into(),
        probes: vec!["httpbin.ip".into()],
        parallel: true,
        params: ParamSchema::default(),
        source_pack: "httpbin".into(),
        rules: vec![egress_rule],
    }
}

#[cfg(test)]
#[path = "runbook_tests.rs"]
mod tests;
