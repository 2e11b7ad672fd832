// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runbook execution: declarative probe plans with findings aggregation.

use futures_util::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use sonde_core::{Finding, ProbeResponse, RunbookResult};
use sonde_packs::DiagnosticRunbook;
use sonde_storage::Store;

use crate::dispatcher::Dispatcher;
use crate::router::{ProbeRouter, RouterError};

/// Errors that abort a runbook before any probe runs.
#[derive(Debug, Error)]
pub enum RunbookError {
    #[error("Unknown runbook category '{0}'")]
    UnknownCategory(String),
    #[error("Missing required parameter(s): {0}")]
    MissingParams(String),
}

/// One category's status inside a health report.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCategory {
    pub category: String,
    pub status: String,
    pub summary_text: String,
}

/// The unified `health_check` report.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub categories: Vec<HealthCategory>,
    pub findings: Vec<Finding>,
    pub skipped: Vec<String>,
}

/// Executes diagnostic runbooks through the probe router.
pub struct RunbookEngine {
    router: Arc<ProbeRouter>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<Store>,
    runbooks: Vec<DiagnosticRunbook>,
}

impl RunbookEngine {
    pub fn new(
        router: Arc<ProbeRouter>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<Store>,
        runbooks: Vec<DiagnosticRunbook>,
    ) -> Self {
        Self { router, dispatcher, store, runbooks }
    }

    pub fn categories(&self) -> Vec<&str> {
        self.runbooks.iter().map(|r| r.category.as_str()).collect()
    }

    fn runbook(&self, category: &str) -> Option<&DiagnosticRunbook> {
        self.runbooks.iter().find(|r| r.category == category)
    }

    /// Execute one category with params, producing sorted findings.
    pub async fn execute_diagnostic(
        &self,
        category: &str,
        params: &Value,
        agent: Option<&str>,
    ) -> Result<RunbookResult, RunbookError> {
        let runbook = self
            .runbook(category)
            .ok_or_else(|| RunbookError::UnknownCategory(category.to_string()))?;

        let missing = runbook.params.missing(params);
        if !missing.is_empty() {
            return Err(RunbookError::MissingParams(missing.join(", ")));
        }

        let started = std::time::Instant::now();
        let mut results: BTreeMap<String, ProbeResponse> = BTreeMap::new();

        if runbook.parallel {
            let futures = runbook.probes.iter().map(|probe| {
                let router = Arc::clone(&self.router);
                let probe = probe.clone();
                let params = params.clone();
                let agent = agent.map(str::to_string);
                async move {
                    let outcome =
                        router.execute(&probe, &params, agent.as_deref(), None).await;
                    (probe, outcome)
                }
            });
            for (probe, outcome) in join_all(futures).await {
                results.insert(probe.clone(), flatten(&probe, outcome));
            }
        } else {
            // Sequential plans continue past per-probe failures; each
            // failure is recorded as a result.
            for probe in &runbook.probes {
                let outcome = self.router.execute(probe, params, agent, None).await;
                results.insert(probe.clone(), flatten(probe, outcome));
            }
        }

        let findings = runbook.synthesize(&results);
        Ok(RunbookResult::finalize(
            category,
            findings,
            results,
            started.elapsed().as_millis() as u64,
        ))
    }

    /// Which runbooks currently apply: an agent carries the pack active,
    /// or a matching integration is active.
    fn applicable(&self, agent: Option<&str>) -> Vec<&DiagnosticRunbook> {
        let agent_packs: Vec<String> = match agent {
            Some(name) => self
                .store
                .agent_by_name(name)
                .ok()
                .flatten()
                .map(|rec| {
                    rec.packs
                        .iter()
                        .filter(|p| p.status == "active")
                        .map(|p| p.name.clone())
                        .collect()
                })
                .unwrap_or_default(),
            None => {
                let mut packs = Vec::new();
                if let Ok(agents) = self.store.list_agents() {
                    for rec in agents {
                        if self.dispatcher.is_online(&rec.name) {
                            packs.extend(
                                rec.packs
                                    .iter()
                                    .filter(|p| p.status == "active")
                                    .map(|p| p.name.clone()),
                            );
                        }
                    }
                }
                packs
            }
        };

        self.runbooks
            .iter()
            .filter(|rb| {
                if agent_packs.contains(&rb.source_pack) {
                    return true;
                }
                self.store
                    .integrations_for_pack(&rb.source_pack)
                    .map(|v| !v.is_empty())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Second-order runner: run every applicable runbook that needs no
    /// user input and compose a unified report.
    pub async fn health_check(
        &self,
        agent: Option<&str>,
        categories: Option<&[String]>,
    ) -> HealthReport {
        let mut report =
            HealthReport { categories: Vec::new(), findings: Vec::new(), skipped: Vec::new() };

        let applicable = self.applicable(agent);
        for runbook in applicable {
            if let Some(filter) = categories {
                if !filter.iter().any(|c| c == &runbook.category) {
                    continue;
                }
            }
            if runbook.params.requires_input() {
                report.skipped.push(runbook.category.clone());
                continue;
            }
            match self
                .execute_diagnostic(&runbook.category, &Value::Object(Default::default()), agent)
                .await
            {
                Ok(result) => {
                    let status = if result.summary.critical_findings > 0 {
                        "critical"
                    } else if result.summary.warning_findings > 0 {
                        "warning"
                    } else {
                        "healthy"
                    };
                    report.categories.push(HealthCategory {
                        category: result.category.clone(),
                        status: status.to_string(),
                        summary_text: result.summary.summary_text.clone(),
                    });
                    report.findings.extend(result.findings);
                }
                Err(e) => {
                    tracing::warn!(category = %runbook.category, error = %e,
                        "health check category failed");
                    report.categories.push(HealthCategory {
                        category: runbook.category.clone(),
                        status: "error".to_string(),
                        summary_text: e.to_string(),
                    });
                }
            }
        }
        report.findings.sort_by_key(|f| f.severity);
        report
    }
}

/// A router-level failure still yields a per-probe result row.
fn flatten(probe: &str, outcome: Result<ProbeResponse, RouterError>) -> ProbeResponse {
    match outcome {
        Ok(resp) => resp,
        Err(e) => ProbeResponse::error(
            probe,
            e.to_string(),
            0,
            sonde_core::ProbeMetadata {
                agent_version: "hub".into(),
                pack_name: probe.split('.').next().unwrap_or("").into(),
                pack_version: String::new(),
                capability_level: sonde_core::CapabilityLevel::Observe,
            },
        ),
    }
}

#[cfg(test)]
#[path = "runbook_tests.rs"]
mod tests;
