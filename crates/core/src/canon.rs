// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical JSON serialization.
//!
//! Signatures and cache fingerprints both hash JSON payloads, so every
//! participant must produce byte-identical serializations: UTF-8, object
//! keys sorted lexicographically at every depth, no insignificant
//! whitespace. `serde_json`'s default map type is a `BTreeMap`, which
//! already sorts keys; this module re-sorts defensively so the guarantee
//! does not depend on how a `Value` was built.

use serde_json::Value;

/// Serialize a JSON value canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_value(out, v);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::String(s) => write_string(out, s),
        // Numbers, booleans, and null already have a single serde_json form.
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's escaping of a lone string is canonical.
    out.push_str(&Value::String(s.to_string()).to_string());
}

#[cfg(test)]
#[path = "canon_tests.rs"]
mod tests;
