// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `httpbin` pack: a minimal external-API integration.
//!
//! Doubles as the reference shape for integration packs: config carries a
//! base URL, credentials (when present) ride as an Authorization header,
//! and every failure surfaces as a response-like `HandlerError::Http` so
//! the executor's retry policy can classify it.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use sonde_core::CapabilityLevel;

use crate::effects::{FetchError, FetchRequest};
use crate::manifest::{PackManifest, ParamSchema, ProbeSpec, Requires, RunbookContribution};
use crate::registry::{HandlerError, IntegrationCtx, IntegrationHandler, Pack, PackKind};

const DEFAULT_BASE_URL: &str = "https://httpbin.org";

pub fn httpbin_pack() -> Pack {
    let manifest = PackManifest {
        name: "httpbin".into(),
        version: "1.0.0".into(),
        description: "HTTP echo service used for connectivity diagnostics".into(),
        requires: Requires::default(),
        probes: vec![
            ProbeSpec {
                name: "ip".into(),
                description: "Egress IP as seen by the remote".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(15_000),
            },
            ProbeSpec {
                name: "headers".into(),
                description: "Request headers as seen by the remote".into(),
                capability: CapabilityLevel::Observe,
                params: None,
                timeout_ms: Some(15_000),
            },
            ProbeSpec {
                name: "status".into(),
                description: "Echo an arbitrary status code".into(),
                capability: CapabilityLevel::Observe,
                params: Some(ParamSchema { required: vec!["code".into()] }),
                timeout_ms: Some(15_000),
            },
        ],
        detect: None,
        runbook: Some(RunbookContribution {
            category: "connectivity".into(),
            probes: vec!["httpbin.ip".into()],
            parallel: true,
            params: None,
        }),
        signature: None,
    };

    let mut handlers: BTreeMap<String, IntegrationHandler> = BTreeMap::new();
    handlers.insert("ip".into(), get_endpoint("/ip"));
    handlers.insert("headers".into(), get_endpoint("/headers"));
    handlers.insert("status".into(), status_probe());

    Pack {
        manifest,
        kind: PackKind::Integration { handlers, test_connection: Some(get_endpoint("/ip")) },
    }
}

fn base_url(config: &serde_json::Value) -> String {
    config
        .get("baseUrl")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/')
        .to_string()
}

fn fetch_err(e: FetchError) -> HandlerError {
    match e {
        FetchError::Status { status, body } => HandlerError::Http { status, message: body },
        FetchError::Cancelled => HandlerError::Cancelled,
        FetchError::Network(msg) => HandlerError::Failed(msg),
    }
}

fn authorized(mut request: FetchRequest, ctx: &IntegrationCtx) -> FetchRequest {
    let creds = ctx.credentials.lock();
    if let Some(header) = creds.as_ref().and_then(|c| c.authorization_header()) {
        request = request.with_header("Authorization", header);
    }
    request
}

fn get_endpoint(path: &'static str) -> IntegrationHandler {
    Arc::new(move |ctx: IntegrationCtx| {
        Box::pin(async move {
            let url = format!("{}{path}", base_url(&ctx.config));
            let request = authorized(FetchRequest::get(url), &ctx);
            let response = ctx.fetch.fetch(request, &ctx.cancel).await.map_err(fetch_err)?;
            if response.status >= 400 {
                return Err(HandlerError::Http {
                    status: response.status,
                    message: response.body.to_string(),
                });
            }
            Ok(response.body)
        })
    })
}

fn status_probe() -> IntegrationHandler {
    Arc::new(|ctx: IntegrationCtx| {
        Box::pin(async move {
            let code = ctx
                .params
                .get("code")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| HandlerError::MissingParam("code".into()))?;
            let url = format!("{}/status/{code}", base_url(&ctx.config));
            let request = authorized(FetchRequest::get(url), &ctx);
            let response = ctx.fetch.fetch(request, &ctx.cancel).await.map_err(fetch_err)?;
            Ok(json!({ "status": response.status }))
        })
    })
}

#[cfg(test)]
#[path = "httpbin_tests.rs"]
mod tests;
