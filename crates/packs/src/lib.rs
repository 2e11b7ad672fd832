// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sonde-packs: declarative probe bundles.
//!
//! A pack is a manifest plus handlers. Local packs shell out on the agent
//! through the injected [`ExecFn`]; integration packs run on the hub and
//! call external APIs through the injected [`HttpFetch`]. Both seams exist
//! so tests can script effects without touching the host.

mod effects;
mod manifest;
mod registry;
mod requirements;
mod runbook;

pub mod integration;
pub mod local;

pub use effects::{
    CredentialsHandle, ExecError, ExecFn, ExecOutput, FetchError, FetchRequest, FetchResponse,
    HttpFetch, MAX_EXEC_OUTPUT_BYTES,
};
#[cfg(any(test, feature = "test-support"))]
pub use effects::{FakeExec, FakeFetch};
pub use manifest::{
    DetectHints, PackManifest, ParamSchema, ProbeSpec, Requires, RunbookContribution,
};
pub use registry::{
    split_probe_name, HandlerError, IntegrationCtx, IntegrationHandler, LocalCtx, LocalHandler,
    Pack, PackKind, PackRegistry,
};
pub use requirements::{missing_requirements, Host, MissingRequirements};
pub use runbook::{builtin_runbooks, DiagnosticRunbook, FindingRule};
