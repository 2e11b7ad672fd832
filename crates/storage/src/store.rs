// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store handle and connection management.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::migrations;
use crate::secretbox::{SecretBox, SecretBoxError};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("secret error: {0}")]
    Secret(#[from] SecretBoxError),
    #[error("{0}")]
    Rejected(String),
}

/// Handle to the hub's SQLite database.
///
/// Reads and writes both go through the single connection; the mutex
/// serializes writers per the storage contract.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
    /// At-rest encryption for CA keys and integration credentials.
    /// Absent when no hub-wide secret is configured.
    pub(crate) secrets: Option<SecretBox>,
}

impl Store {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path, hub_secret: Option<&str>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn, hub_secret)
    }

    /// In-memory store for tests and ephemeral hubs.
    pub fn open_in_memory(hub_secret: Option<&str>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, hub_secret)
    }

    fn init(conn: Connection, hub_secret: Option<&str>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let mut conn = conn;
        migrations::apply(&mut conn)?;
        let secrets = hub_secret.map(SecretBox::new);
        Ok(Self { conn: Mutex::new(conn), secrets })
    }

    /// Current schema version (the `user_version` pragma).
    pub fn schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(v)
    }

    /// Whether at-rest encryption is available.
    pub fn has_secret(&self) -> bool {
        self.secrets.is_some()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
