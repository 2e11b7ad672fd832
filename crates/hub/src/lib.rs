// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sonde-hub: the central broker.
//!
//! Accepts agent and dashboard WebSocket sessions, routes probe requests to
//! agents or server-side integrations, runs diagnostic runbooks, and serves
//! the MCP tool surface.

pub mod dispatcher;
pub mod enroll;
pub mod env;
pub mod fetch;
pub mod identity;
pub mod integration;
pub mod router;
pub mod runbook;
pub mod tls;
pub mod tools;
pub mod transport;

pub use dispatcher::{DispatchError, Dispatcher};
pub use identity::Ca;
pub use integration::IntegrationExecutor;
pub use router::{ProbeRouter, RouterError};
pub use runbook::{HealthReport, RunbookEngine, RunbookError};
pub use tools::ToolSurface;
pub use transport::{DashboardAuth, DenyAllDashboards, Transport, TransportCtx};
