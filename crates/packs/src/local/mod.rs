// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in local packs (probes shell out on the agent).

mod logs;
mod service;
mod system;

use crate::effects::ExecError;
use crate::registry::{HandlerError, Pack};

pub use logs::logs_pack;
pub use service::service_pack;
pub use system::system_pack;

/// All built-in local packs.
pub fn builtin_local_packs() -> Vec<Pack> {
    vec![system_pack(), service_pack(), logs_pack()]
}

pub(crate) fn exec_err(e: ExecError) -> HandlerError {
    match e {
        ExecError::Timeout(ms) => HandlerError::Failed(format!("command timed out after {ms}ms")),
        other => HandlerError::Failed(other.to_string()),
    }
}

/// Require a string parameter, mapping absence to the structured error.
pub(crate) fn require_str_param(params: &serde_json::Value, name: &str) -> Result<String, HandlerError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| HandlerError::MissingParam(name.to_string()))
}
