// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub settings key-value store and CA material.

use rusqlite::{params, OptionalExtension};

use crate::store::{Store, StoreError};

/// Settings key for the version advisory baseline.
pub const LATEST_AGENT_VERSION: &str = "latest_agent_version";

impl Store {
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO hub_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT value FROM hub_settings WHERE key = ?1", params![key], |r| {
                r.get(0)
            })
            .optional()?)
    }

    /// Persist the CA pair. The private key is sealed when a hub secret is
    /// configured; stored plainly (flagged) otherwise.
    pub fn store_ca(&self, cert_pem: &str, key_pem: &str) -> Result<(), StoreError> {
        let (blob, encrypted) = match &self.secrets {
            Some(sb) => (sb.seal(key_pem.as_bytes())?, true),
            None => (key_pem.to_string(), false),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO certificate_authority (id, cert_pem, key_blob, encrypted)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE
                 SET cert_pem = excluded.cert_pem,
                     key_blob = excluded.key_blob,
                     encrypted = excluded.encrypted",
            params![cert_pem, blob, encrypted as i64],
        )?;
        Ok(())
    }

    /// Load the CA pair, unsealing the key when necessary.
    pub fn load_ca(&self) -> Result<Option<(String, String)>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT cert_pem, key_blob, encrypted FROM certificate_authority WHERE id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        drop(conn);
        let Some((cert_pem, blob, encrypted)) = row else {
            return Ok(None);
        };
        let key_pem = if encrypted != 0 {
            let Some(sb) = &self.secrets else {
                return Err(StoreError::Rejected(
                    "CA key is encrypted but no hub secret is configured".into(),
                ));
            };
            let raw = sb.open(&blob)?;
            String::from_utf8(raw).map_err(|_| StoreError::Corrupt("CA key not UTF-8".into()))?
        } else {
            blob
        };
        Ok(Some((cert_pem, key_pem)))
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
