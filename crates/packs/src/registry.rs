// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pack registry: a static map of name → pack.
//!
//! Handlers come in two variants — local (agent-side exec) and integration
//! (hub-side HTTP) — expressed as a sum type so the router can decide the
//! execution plane from the pack alone.

use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::effects::{CredentialsHandle, ExecFn, HttpFetch};
use crate::manifest::PackManifest;

/// Errors a probe handler can surface.
///
/// `Http` carries the response-like failures the retry policy inspects
/// (5xx transients, 401 for OAuth2 refresh).
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("missing required parameter: {0}")]
    MissingParam(String),
    #[error("{0}")]
    Failed(String),
    #[error("cancelled")]
    Cancelled,
}

/// Context handed to a local probe handler.
pub struct LocalCtx {
    pub params: Value,
    pub exec: Arc<dyn ExecFn>,
    pub timeout_ms: u64,
}

/// Context handed to an integration probe handler.
pub struct IntegrationCtx {
    pub params: Value,
    pub config: Value,
    pub credentials: CredentialsHandle,
    pub fetch: Arc<dyn HttpFetch>,
    pub cancel: CancellationToken,
}

pub type HandlerResult = Result<Value, HandlerError>;

/// Agent-side handler: `(params, exec)` → structured data.
pub type LocalHandler = Arc<dyn Fn(LocalCtx) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Hub-side handler: `(params, config, credentials, fetch)` → structured data.
pub type IntegrationHandler =
    Arc<dyn Fn(IntegrationCtx) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// The executable half of a pack.
pub enum PackKind {
    /// Probes shell out on the agent.
    Local(BTreeMap<String, LocalHandler>),
    /// Probes run on the hub against an external API.
    Integration {
        handlers: BTreeMap<String, IntegrationHandler>,
        test_connection: Option<IntegrationHandler>,
    },
}

/// A pack: manifest + handlers.
pub struct Pack {
    pub manifest: PackManifest,
    pub kind: PackKind,
}

impl Pack {
    pub fn is_integration(&self) -> bool {
        matches!(self.kind, PackKind::Integration { .. })
    }
}

/// Split a fully-qualified probe name into `(pack, rest)`.
pub fn split_probe_name(probe: &str) -> Option<(&str, &str)> {
    let (pack, rest) = probe.split_once('.')?;
    if pack.is_empty() || rest.is_empty() {
        return None;
    }
    Some((pack, rest))
}

/// Immutable name → pack map.
pub struct PackRegistry {
    packs: BTreeMap<String, Arc<Pack>>,
}

impl PackRegistry {
    pub fn new(packs: Vec<Pack>) -> Self {
        Self {
            packs: packs
                .into_iter()
                .map(|p| (p.manifest.name.clone(), Arc::new(p)))
                .collect(),
        }
    }

    /// The full built-in registry (local + integration packs).
    pub fn builtin() -> Self {
        let mut packs = crate::local::builtin_local_packs();
        packs.extend(crate::integration::builtin_integration_packs());
        Self::new(packs)
    }

    /// Only local packs, minus an agent's disabled set.
    pub fn local_for_agent(disabled: &std::collections::HashSet<String>) -> Self {
        let packs = crate::local::builtin_local_packs()
            .into_iter()
            .filter(|p| !disabled.contains(&p.manifest.name))
            .collect();
        Self::new(packs)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Pack>> {
        self.packs.get(name)
    }

    /// Whether a probe's leading segment names an integration pack.
    pub fn is_integration_probe(&self, probe: &str) -> bool {
        split_probe_name(probe)
            .and_then(|(pack, _)| self.packs.get(pack))
            .is_some_and(|p| p.is_integration())
    }

    /// Manifest timeout for a probe, when declared.
    pub fn probe_timeout_ms(&self, probe: &str) -> Option<u64> {
        let (pack, rest) = split_probe_name(probe)?;
        self.packs.get(pack)?.manifest.probe(rest)?.timeout_ms
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pack>> {
        self.packs.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.packs.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
