// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pack manifests: the declarative half of a pack.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sonde_core::{canonical_json, CapabilityLevel};

/// Host prerequisites a pack needs before its probes can run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Requires {
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Requires {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.files.is_empty() && self.commands.is_empty()
    }
}

/// Declared parameters of a probe or runbook.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ParamSchema {
    /// Parameter names that must be present.
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParamSchema {
    /// Names of required params missing from `params`.
    pub fn missing<'a>(&'a self, params: &Value) -> Vec<&'a str> {
        self.required
            .iter()
            .filter(|name| params.get(name.as_str()).is_none())
            .map(String::as_str)
            .collect()
    }

    pub fn requires_input(&self) -> bool {
        !self.required.is_empty()
    }
}

/// One probe as declared by its pack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSpec {
    /// Name within the pack (the part after the dot).
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub capability: CapabilityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Hints for automatic pack detection on a host.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DetectHints {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A pack's contribution to the runbook engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunbookContribution {
    pub category: String,
    /// Fully-qualified probe names, in plan order.
    pub probes: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamSchema>,
}

/// The manifest of one pack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub requires: Requires,
    pub probes: Vec<ProbeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect: Option<DetectHints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook: Option<RunbookContribution>,
    /// Signature over the canonical manifest bytes (all other fields).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl PackManifest {
    /// Find a probe spec by its in-pack name.
    pub fn probe(&self, name: &str) -> Option<&ProbeSpec> {
        self.probes.iter().find(|p| p.name == name)
    }

    /// The canonical bytes a manifest signature covers: every field except
    /// the signature itself, canonically serialized.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        let value = serde_json::to_value(&unsigned).unwrap_or(Value::Null);
        canonical_json(&value).into_bytes()
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
