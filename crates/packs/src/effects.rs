// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injected effect seams.
//!
//! Handlers never reach I/O through global state: local probes receive an
//! [`ExecFn`] and integration probes an [`HttpFetch`], injected per call.
//! Tests exercise handlers exclusively through these seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use sonde_core::Credentials;

/// Stdout cap for local command execution.
pub const MAX_EXEC_OUTPUT_BYTES: usize = 1024 * 1024;

/// Shared, mutable credential slot. OAuth2 refresh updates the token in
/// place so subsequent calls in the same process reuse it.
pub type CredentialsHandle = Arc<Mutex<Option<Credentials>>>;

/// Errors from local command execution.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("command timed out after {0}ms")]
    Timeout(u64),
    #[error("exec failed: {0}")]
    Io(String),
}

/// Captured output of a local command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Runs a named binary with an argv list — never a shell — under a
/// deadline and the stdout cap.
#[async_trait]
pub trait ExecFn: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout_ms: u64,
    ) -> Result<ExecOutput, ExecError>;
}

/// Errors from the injected HTTP seam.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The remote answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("request cancelled")]
    Cancelled,
}

/// One outbound HTTP request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Form-encoded body (used by OAuth2 token endpoints); mutually
    /// exclusive with `body`.
    pub form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: "GET".into(), url: url.into(), headers: Vec::new(), body: None, form: None }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: "POST".into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            form: Some(form),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Parsed response body (JSON when the remote sends it, wrapped text
/// otherwise).
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Value,
}

/// The HTTP seam. Production binds this to a real client; tests inject a
/// scripted fake. Implementations must honour the cancellation token.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError>;
}

/// Scripted exec fake: returns queued outputs in order, recording calls.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeExec {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    outputs: Mutex<std::collections::VecDeque<Result<ExecOutput, ExecError>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeExec {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            outputs: Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn push_stdout(&self, stdout: &str) {
        self.outputs.lock().push_back(Ok(ExecOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }));
    }

    pub fn push_result(&self, result: Result<ExecOutput, ExecError>) {
        self.outputs.lock().push_back(result);
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeExec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ExecFn for FakeExec {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout_ms: u64,
    ) -> Result<ExecOutput, ExecError> {
        self.calls.lock().push((program.to_string(), args.to_vec()));
        self.outputs
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecOutput::default()))
    }
}

/// Scripted HTTP fake: pops queued responses, recording every request.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeFetch {
    requests: Mutex<Vec<FetchRequest>>,
    responses: Mutex<std::collections::VecDeque<Result<FetchResponse, FetchError>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeFetch {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.responses.lock().push_back(Ok(FetchResponse { status, body }));
    }

    pub fn push_error(&self, error: FetchError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl HttpFetch for FakeFetch {
    async fn fetch(
        &self,
        request: FetchRequest,
        _cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Network("no scripted response".into())))
    }
}
