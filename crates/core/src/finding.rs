// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runbook findings and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::probe::ProbeResponse;

/// Finding severity, ordered most-severe-first for report sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// One synthesized observation from a runbook run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    /// Probes whose results produced this finding.
    #[serde(default)]
    pub related_probes: Vec<String>,
}

/// Aggregate counters for a runbook run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunbookSummary {
    pub probes_run: usize,
    pub probes_succeeded: usize,
    pub probes_failed: usize,
    pub critical_findings: usize,
    pub warning_findings: usize,
    pub info_findings: usize,
    pub total_duration_ms: u64,
    pub summary_text: String,
}

/// The full result of executing one runbook category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunbookResult {
    pub category: String,
    /// Sorted critical → warning → info.
    pub findings: Vec<Finding>,
    /// Raw per-probe results keyed by probe name.
    pub probe_results: BTreeMap<String, ProbeResponse>,
    pub summary: RunbookSummary,
}

impl RunbookResult {
    /// Sort findings most-severe-first and fill the summary counters.
    pub fn finalize(
        category: impl Into<String>,
        mut findings: Vec<Finding>,
        probe_results: BTreeMap<String, ProbeResponse>,
        total_duration_ms: u64,
    ) -> Self {
        findings.sort_by_key(|f| f.severity);
        let probes_run = probe_results.len();
        let probes_succeeded = probe_results.values().filter(|r| r.is_success()).count();
        let critical = findings.iter().filter(|f| f.severity == Severity::Critical).count();
        let warning = findings.iter().filter(|f| f.severity == Severity::Warning).count();
        let info = findings.iter().filter(|f| f.severity == Severity::Info).count();
        let category = category.into();
        let summary_text = if critical > 0 {
            format!("{category}: {critical} critical finding(s), attention required")
        } else if warning > 0 {
            format!("{category}: {warning} warning(s)")
        } else {
            format!("{category}: healthy")
        };
        Self {
            category,
            findings,
            summary: RunbookSummary {
                probes_run,
                probes_succeeded,
                probes_failed: probes_run - probes_succeeded,
                critical_findings: critical,
                warning_findings: warning,
                info_findings: info,
                total_duration_ms,
                summary_text,
            },
            probe_results,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
#[path = "finding_tests.rs"]
mod tests;
