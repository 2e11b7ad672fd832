// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production [`HttpFetch`] backed by reqwest.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sonde_packs::{FetchError, FetchRequest, FetchResponse, HttpFetch};

/// Hard ceiling so a handler without a manifest timeout cannot hang a
/// worker; per-probe deadlines cancel earlier via the token.
const REQUEST_CEILING: Duration = Duration::from_secs(60);

/// Real HTTP client bound to the per-probe cancellation signal.
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_CEILING)
            .user_agent(concat!("sonde-hub/", env!("CARGO_PKG_VERSION")))
            .build()
            // Builder only fails on TLS backend misconfiguration.
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for ReqwestFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn fetch(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::Network(format!("bad method {}", request.method)))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = tokio::select! {
            r = builder.send() => r.map_err(|e| FetchError::Network(e.to_string()))?,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };

        let status = response.status().as_u16();
        let text = tokio::select! {
            t = response.text() => t.map_err(|e| FetchError::Network(e.to_string()))?,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };
        let body: Value =
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));

        if status >= 400 {
            return Err(FetchError::Status { status, body: text });
        }
        Ok(FetchResponse { status, body })
    }
}
