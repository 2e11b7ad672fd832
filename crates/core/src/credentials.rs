// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credentials for server-side integrations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Credentials for one integration, varying by auth method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Credentials {
    ApiKey { key: String },
    Basic { username: String, password: String },
    Bearer { token: String },
    OAuth2 {
        access_token: String,
        refresh_token: String,
        token_url: String,
    },
    /// Device-binding blobs (e.g. a JSON device config).
    Device { config: Value },
}

impl Credentials {
    /// The Authorization header value this credential produces, if any.
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Self::ApiKey { key } => Some(format!("Bearer {key}")),
            Self::Bearer { token } => Some(format!("Bearer {token}")),
            Self::OAuth2 { access_token, .. } => Some(format!("Bearer {access_token}")),
            Self::Basic { .. } | Self::Device { .. } => None,
        }
    }
}
