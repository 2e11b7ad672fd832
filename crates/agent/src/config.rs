// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration at `~/.sonde/config.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no home directory")]
    NoHome,
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Persisted agent state. Written at enrollment, read at every start.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub hub_url: String,
    pub api_key: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,
    /// SPKI PEM for verifying hub-signed envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_key_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scrub_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub disabled_packs: HashSet<String>,
}

/// Default config directory (`~/.sonde`).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().map(|h| h.join(".sonde")).ok_or(ConfigError::NoHome)
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(config_dir()?.join("config.json"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
