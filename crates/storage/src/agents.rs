// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent row persistence.
//!
//! Rows are created by first registration and keyed by the human-chosen
//! name for id reuse; the core never deletes them.

use rusqlite::{params, OptionalExtension, Row};

use sonde_core::{AgentId, AgentRecord, AgentStatus, Attestation, PackStatus};

use crate::store::{Store, StoreError};

fn record_from_row(row: &Row<'_>) -> Result<AgentRecord, rusqlite::Error> {
    let packs_json: String = row.get("packs")?;
    let attestation_json: Option<String> = row.get("attestation")?;
    let status_str: String = row.get("status")?;
    Ok(AgentRecord {
        id: AgentId::from_string(row.get::<_, String>("id")?),
        name: row.get("name")?,
        os: row.get("os")?,
        version: row.get("version")?,
        packs: serde_json::from_str(&packs_json).unwrap_or_default(),
        last_seen_ms: row.get::<_, i64>("last_seen_ms")? as u64,
        status: match status_str.as_str() {
            "online" => AgentStatus::Online,
            "degraded" => AgentStatus::Degraded,
            _ => AgentStatus::Offline,
        },
        cert_fingerprint: row.get("cert_fingerprint")?,
        cert_pem: row.get("cert_pem")?,
        pub_key_pem: row.get("pub_key_pem")?,
        attestation: attestation_json.and_then(|s| serde_json::from_str(&s).ok()),
        attestation_mismatch: row.get::<_, i64>("attestation_mismatch")? != 0,
    })
}

impl Store {
    /// Create or update the row for a registering agent, reusing the
    /// stable id assigned to this name on first registration.
    pub fn upsert_agent(
        &self,
        name: &str,
        os: &str,
        version: &str,
        packs: &[PackStatus],
        now_ms: u64,
    ) -> Result<AgentRecord, StoreError> {
        let conn = self.conn.lock();
        let packs_json =
            serde_json::to_string(packs).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let existing: Option<String> = conn
            .query_row("SELECT id FROM agents WHERE name = ?1", params![name], |r| r.get(0))
            .optional()?;
        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE agents SET os = ?2, version = ?3, packs = ?4,
                            last_seen_ms = ?5, status = 'online'
                     WHERE id = ?1",
                    params![id, os, version, packs_json, now_ms as i64],
                )?;
                id
            }
            None => {
                let id = AgentId::generate().to_string();
                conn.execute(
                    "INSERT INTO agents (id, name, os, version, packs, last_seen_ms, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'online')",
                    params![id, name, os, version, packs_json, now_ms as i64],
                )?;
                id
            }
        };
        drop(conn);
        self.agent_by_id(&AgentId::from_string(id))?
            .ok_or_else(|| StoreError::Corrupt("agent row vanished after upsert".into()))
    }

    pub fn agent_by_id(&self, id: &AgentId) -> Result<Option<AgentRecord>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT * FROM agents WHERE id = ?1", params![id.as_str()], record_from_row)
            .optional()?)
    }

    pub fn agent_by_name(&self, name: &str) -> Result<Option<AgentRecord>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT * FROM agents WHERE name = ?1", params![name], record_from_row)
            .optional()?)
    }

    pub fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM agents ORDER BY name")?;
        let rows = stmt.query_map([], record_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Heartbeat: refresh last-seen without touching other fields.
    pub fn touch_agent(&self, id: &AgentId, now_ms: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE agents SET last_seen_ms = ?2 WHERE id = ?1",
            params![id.as_str(), now_ms as i64],
        )?;
        Ok(())
    }

    pub fn set_agent_status(&self, id: &AgentId, status: AgentStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE agents SET status = ?2 WHERE id = ?1",
            params![id.as_str(), status.to_string()],
        )?;
        Ok(())
    }

    /// Store a new attestation baseline and the mismatch flag.
    pub fn set_agent_attestation(
        &self,
        id: &AgentId,
        attestation: &Attestation,
        mismatch: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let json = serde_json::to_string(attestation)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        conn.execute(
            "UPDATE agents SET attestation = ?2, attestation_mismatch = ?3 WHERE id = ?1",
            params![id.as_str(), json, mismatch as i64],
        )?;
        Ok(())
    }

    /// Record issued certificate material and the envelope public key.
    pub fn set_agent_cert(
        &self,
        id: &AgentId,
        fingerprint: &str,
        cert_pem: &str,
        pub_key_pem: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE agents SET cert_fingerprint = ?2, cert_pem = ?3, pub_key_pem = ?4
             WHERE id = ?1",
            params![id.as_str(), fingerprint, cert_pem, pub_key_pem],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
