// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable hub-side audit chain.
//!
//! Append recomputes the predecessor's hash from its stored row, so the
//! chain never depends on a cached hash column that tampering could skip.

use rusqlite::{params, OptionalExtension, Row};

use sonde_core::{entry_hash, verify_chain, AuditEntry, AuditSource, ChainCheck, ProbeStatus};

use crate::store::{Store, StoreError};

fn entry_from_row(row: &Row<'_>) -> Result<AuditEntry, rusqlite::Error> {
    let source_json: String = row.get("source")?;
    let status: String = row.get("status")?;
    Ok(AuditEntry {
        id: row.get::<_, i64>("id")? as u64,
        timestamp_ms: row.get::<_, i64>("timestamp_ms")? as u64,
        probe: row.get("probe")?,
        source: serde_json::from_str(&source_json).unwrap_or(AuditSource::Agent(String::new())),
        status: match status.as_str() {
            "success" => ProbeStatus::Success,
            "timeout" => ProbeStatus::Timeout,
            _ => ProbeStatus::Error,
        },
        duration_ms: row.get::<_, i64>("duration_ms")? as u64,
        api_key_id: row.get("api_key_id")?,
        response_digest: row.get("response_digest")?,
        prev_hash: row.get("prev_hash")?,
    })
}

impl Store {
    /// Append one probe execution to the chain.
    #[allow(clippy::too_many_arguments)]
    pub fn append_audit(
        &self,
        timestamp_ms: u64,
        probe: &str,
        source: AuditSource,
        status: ProbeStatus,
        duration_ms: u64,
        api_key_id: Option<&str>,
        response_digest: Option<&str>,
    ) -> Result<AuditEntry, StoreError> {
        let conn = self.conn.lock();
        let last: Option<AuditEntry> = conn
            .query_row("SELECT * FROM audit_log ORDER BY id DESC LIMIT 1", [], entry_from_row)
            .optional()?;
        let (next_id, prev_hash) = match &last {
            Some(prev) => (prev.id + 1, entry_hash(prev)),
            None => (1, String::new()),
        };
        let source_json =
            serde_json::to_string(&source).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let entry = AuditEntry {
            id: next_id,
            timestamp_ms,
            probe: probe.to_string(),
            source,
            status,
            duration_ms,
            api_key_id: api_key_id.map(|s| s.to_string()),
            response_digest: response_digest.map(|s| s.to_string()),
            prev_hash,
        };
        conn.execute(
            "INSERT INTO audit_log
                (id, timestamp_ms, probe, source, status, duration_ms,
                 api_key_id, response_digest, prev_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id as i64,
                entry.timestamp_ms as i64,
                entry.probe,
                source_json,
                entry.status.to_string(),
                entry.duration_ms as i64,
                entry.api_key_id,
                entry.response_digest,
                entry.prev_hash,
            ],
        )?;
        Ok(entry)
    }

    /// Entries with `timestamp_ms >= since_ms`, oldest first, capped at
    /// `limit`.
    pub fn audit_since(&self, since_ms: u64, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM audit_log WHERE timestamp_ms >= ?1 ORDER BY id LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![since_ms as i64, limit as i64], entry_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent entries, newest first.
    pub fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT * FROM audit_log ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], entry_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Walk the full stored chain.
    pub fn verify_audit_chain(&self) -> Result<ChainCheck, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM audit_log ORDER BY id")?;
        let rows = stmt.query_map([], entry_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(verify_chain(&entries))
    }

    /// Test/tamper hook: overwrite one column of one entry directly.
    #[doc(hidden)]
    pub fn raw_update_audit_status(&self, id: u64, status: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE audit_log SET status = ?2 WHERE id = ?1",
            params![id as i64, status],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
