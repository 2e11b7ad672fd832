// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API keys: stable bearer credentials.
//!
//! A full key is `<key-id>.<secret>`; only the SHA-256 of the secret is
//! stored. Policy is an opaque JSON document interpreted by callers.

use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};

use sonde_core::KeyId;

use crate::store::{Store, StoreError};

/// Stored metadata of one API key (never the secret).
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub key_id: String,
    pub policy: Value,
    pub created_at_ms: u64,
    pub revoked: bool,
}

fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

impl Store {
    /// Mint a key with the given policy. Returns `(key_id, full_key)`;
    /// the full key is shown exactly once.
    pub fn create_api_key(
        &self,
        policy: &Value,
        now_ms: u64,
    ) -> Result<(String, String), StoreError> {
        let key_id = KeyId::new().to_string();
        let mut secret_bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = hex::encode(secret_bytes);
        let full = format!("{key_id}.{secret}");

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO api_keys (key_id, secret_hash, policy, created_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![key_id, hash_secret(&secret), policy.to_string(), now_ms as i64],
        )?;
        Ok((key_id, full))
    }

    /// Validate a presented full key; returns its record when live.
    pub fn validate_api_key(&self, full_key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        let Some((key_id, secret)) = full_key.split_once('.') else {
            return Ok(None);
        };
        let conn = self.conn.lock();
        let row: Option<(String, String, i64, Option<i64>)> = conn
            .query_row(
                "SELECT secret_hash, policy, created_at_ms, revoked_at_ms
                 FROM api_keys WHERE key_id = ?1",
                params![key_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((stored_hash, policy_json, created_at_ms, revoked_at)) = row else {
            return Ok(None);
        };
        if revoked_at.is_some() || stored_hash != hash_secret(secret) {
            return Ok(None);
        }
        Ok(Some(ApiKeyRecord {
            key_id: key_id.to_string(),
            policy: serde_json::from_str(&policy_json).unwrap_or(Value::Null),
            created_at_ms: created_at_ms as u64,
            revoked: false,
        }))
    }

    pub fn revoke_api_key(&self, key_id: &str, now_ms: u64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE api_keys SET revoked_at_ms = ?2 WHERE key_id = ?1 AND revoked_at_ms IS NULL",
            params![key_id, now_ms as i64],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
