// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration registrations and their event streams.
//!
//! Credentials are sealed at rest when a hub secret is configured.
//! Deleting an integration cascades to its events (FK).

use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use sonde_core::{Credentials, IntegrationEvent, IntegrationEventType};

use crate::store::{Store, StoreError};

/// One registered integration.
#[derive(Debug, Clone)]
pub struct IntegrationRecord {
    pub id: String,
    pub pack: String,
    pub name: String,
    pub config: Value,
    pub credentials: Option<Credentials>,
    pub active: bool,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Store {
    fn credentials_blob(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Option<String>, StoreError> {
        let Some(creds) = credentials else { return Ok(None) };
        let json =
            serde_json::to_string(creds).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        match &self.secrets {
            Some(sb) => Ok(Some(format!("enc:{}", sb.seal(json.as_bytes())?))),
            None => Ok(Some(json)),
        }
    }

    fn credentials_from_blob(
        &self,
        blob: Option<String>,
    ) -> Result<Option<Credentials>, StoreError> {
        let Some(blob) = blob else { return Ok(None) };
        let json = match blob.strip_prefix("enc:") {
            Some(sealed) => {
                let Some(sb) = &self.secrets else {
                    return Err(StoreError::Rejected(
                        "credentials are encrypted but no hub secret is configured".into(),
                    ));
                };
                String::from_utf8(sb.open(sealed)?)
                    .map_err(|_| StoreError::Corrupt("credentials not UTF-8".into()))?
            }
            None => blob,
        };
        Ok(Some(
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        ))
    }

    fn integration_from_row(&self, row: &Row<'_>) -> Result<IntegrationRecord, rusqlite::Error> {
        let config_json: String = row.get("config")?;
        Ok(IntegrationRecord {
            id: row.get("id")?,
            pack: row.get("pack")?,
            name: row.get("name")?,
            config: serde_json::from_str(&config_json).unwrap_or(Value::Null),
            credentials: None, // filled by callers that need it
            active: row.get::<_, i64>("active")? != 0,
            created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
            updated_at_ms: row.get::<_, i64>("updated_at_ms")? as u64,
        })
    }

    /// Register an integration instance of a pack.
    pub fn create_integration(
        &self,
        id: &str,
        pack: &str,
        name: &str,
        config: &Value,
        credentials: Option<&Credentials>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let blob = self.credentials_blob(credentials)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO integrations
                 (id, pack, name, config, credentials_blob, active, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![id, pack, name, config.to_string(), blob, now_ms as i64],
        )?;
        Ok(())
    }

    pub fn integration(&self, id: &str) -> Result<Option<IntegrationRecord>, StoreError> {
        let row = {
            let conn = self.conn.lock();
            let rec = conn
                .query_row("SELECT * FROM integrations WHERE id = ?1", params![id], |row| {
                    let blob: Option<String> = row.get("credentials_blob")?;
                    self.integration_from_row(row).map(|rec| (rec, blob))
                })
                .optional()?;
            rec
        };
        match row {
            None => Ok(None),
            Some((mut rec, blob)) => {
                rec.credentials = self.credentials_from_blob(blob)?;
                Ok(Some(rec))
            }
        }
    }

    /// All active integrations for a pack (usually zero or one).
    pub fn integrations_for_pack(&self, pack: &str) -> Result<Vec<IntegrationRecord>, StoreError> {
        let ids: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare("SELECT id FROM integrations WHERE pack = ?1 AND active = 1")?;
            let rows = stmt.query_map(params![pack], |r| r.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };
        let mut out = Vec::new();
        for id in ids {
            if let Some(rec) = self.integration(&id)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    pub fn list_integrations(&self) -> Result<Vec<IntegrationRecord>, StoreError> {
        let ids: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT id FROM integrations ORDER BY name")?;
            let rows = stmt.query_map([], |r| r.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };
        let mut out = Vec::new();
        for id in ids {
            if let Some(rec) = self.integration(&id)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    pub fn update_integration_config(
        &self,
        id: &str,
        config: &Value,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE integrations SET config = ?2, updated_at_ms = ?3 WHERE id = ?1",
            params![id, config.to_string(), now_ms as i64],
        )?;
        Ok(())
    }

    /// Overwrite stored credentials (e.g. after an OAuth2 refresh).
    pub fn update_integration_credentials(
        &self,
        id: &str,
        credentials: &Credentials,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let blob = self.credentials_blob(Some(credentials))?;
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE integrations SET credentials_blob = ?2, updated_at_ms = ?3 WHERE id = ?1",
            params![id, blob, now_ms as i64],
        )?;
        Ok(())
    }

    /// Delete an integration; its events cascade.
    pub fn delete_integration(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM integrations WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    }

    pub fn append_integration_event(&self, event: &IntegrationEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO integration_events
                 (integration_id, timestamp_ms, event_type, status, message, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.integration_id,
                event.timestamp_ms as i64,
                event.event_type.to_string(),
                event.status,
                event.message,
                event.detail.as_ref().map(|d| d.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn integration_events(
        &self,
        integration_id: &str,
        limit: usize,
    ) -> Result<Vec<IntegrationEvent>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp_ms, event_type, status, message, detail
             FROM integration_events WHERE integration_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![integration_id, limit as i64], |row| {
            let event_type: String = row.get(1)?;
            let detail: Option<String> = row.get(4)?;
            Ok(IntegrationEvent {
                timestamp_ms: row.get::<_, i64>(0)? as u64,
                integration_id: integration_id.to_string(),
                event_type: parse_event_type(&event_type),
                status: row.get(2)?,
                message: row.get(3)?,
                detail: detail.and_then(|d| serde_json::from_str(&d).ok()),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn parse_event_type(s: &str) -> IntegrationEventType {
    match s {
        "created" => IntegrationEventType::Created,
        "config_update" => IntegrationEventType::ConfigUpdate,
        "test_connection" => IntegrationEventType::TestConnection,
        "credential_refresh" => IntegrationEventType::CredentialRefresh,
        "deleted" => IntegrationEventType::Deleted,
        _ => IntegrationEventType::ProbeExecution,
    }
}

#[cfg(test)]
#[path = "integrations_tests.rs"]
mod tests;
