// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monotone integer schema migrations.
//!
//! Each entry runs in its own transaction; `user_version` records the last
//! applied index. Append only — never edit a shipped migration.

use rusqlite::Connection;

use crate::store::StoreError;

const MIGRATIONS: &[&str] = &[
    // 1: identity plane
    "
    CREATE TABLE agents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        os TEXT NOT NULL DEFAULT '',
        version TEXT NOT NULL DEFAULT '',
        packs TEXT NOT NULL DEFAULT '[]',
        last_seen_ms INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'offline',
        cert_fingerprint TEXT,
        cert_pem TEXT,
        pub_key_pem TEXT,
        attestation TEXT,
        attestation_mismatch INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE enrollment_tokens (
        token TEXT PRIMARY KEY,
        created_at_ms INTEGER NOT NULL,
        expires_at_ms INTEGER NOT NULL,
        consumed_at_ms INTEGER,
        consumed_by TEXT
    );
    CREATE TABLE api_keys (
        key_id TEXT PRIMARY KEY,
        secret_hash TEXT NOT NULL,
        policy TEXT NOT NULL DEFAULT '{}',
        created_at_ms INTEGER NOT NULL,
        revoked_at_ms INTEGER
    );
    CREATE TABLE certificate_authority (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        cert_pem TEXT NOT NULL,
        key_blob TEXT NOT NULL,
        encrypted INTEGER NOT NULL
    );
    CREATE TABLE hub_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    ",
    // 2: audit chain
    "
    CREATE TABLE audit_log (
        id INTEGER PRIMARY KEY,
        timestamp_ms INTEGER NOT NULL,
        probe TEXT NOT NULL,
        source TEXT NOT NULL,
        status TEXT NOT NULL,
        duration_ms INTEGER NOT NULL,
        api_key_id TEXT,
        response_digest TEXT,
        prev_hash TEXT NOT NULL
    );
    CREATE INDEX idx_audit_timestamp ON audit_log (timestamp_ms);
    ",
    // 3: integrations and their event stream
    "
    CREATE TABLE integrations (
        id TEXT PRIMARY KEY,
        pack TEXT NOT NULL,
        name TEXT NOT NULL,
        config TEXT NOT NULL DEFAULT '{}',
        credentials_blob TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        created_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    );
    CREATE TABLE integration_events (
        id INTEGER PRIMARY KEY,
        integration_id TEXT NOT NULL REFERENCES integrations (id) ON DELETE CASCADE,
        timestamp_ms INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        status TEXT NOT NULL,
        message TEXT NOT NULL,
        detail TEXT
    );
    CREATE INDEX idx_integration_events ON integration_events (integration_id, timestamp_ms);
    ",
];

/// Apply all outstanding migrations.
pub(crate) fn apply(conn: &mut Connection) -> Result<(), StoreError> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!(version, "applied schema migration");
    }
    Ok(())
}

#[cfg(test)]
#[path = "migrations_tests.rs"]
mod tests;
