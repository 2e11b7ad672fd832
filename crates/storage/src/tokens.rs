// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-time enrollment tokens.
//!
//! Consumption is a single conditional UPDATE so two racing registrations
//! cannot both win the same token.

use rusqlite::{params, OptionalExtension};
use thiserror::Error;

use sonde_core::TokenId;

use crate::store::{Store, StoreError};

/// Why a token could not be consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("Token already used")]
    AlreadyUsed,
    #[error("Token expired")]
    Expired,
    #[error("Token not found")]
    Unknown,
}

/// Stored state of one enrollment token.
#[derive(Debug, Clone)]
pub struct EnrollmentTokenRecord {
    pub token: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub consumed_at_ms: Option<u64>,
    pub consumed_by: Option<String>,
}

impl Store {
    /// Mint a one-time token valid for `ttl_ms`.
    pub fn create_enrollment_token(&self, ttl_ms: u64, now_ms: u64) -> Result<String, StoreError> {
        let token = TokenId::new().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO enrollment_tokens (token, created_at_ms, expires_at_ms)
             VALUES (?1, ?2, ?3)",
            params![token, now_ms as i64, (now_ms + ttl_ms) as i64],
        )?;
        Ok(token)
    }

    pub fn enrollment_token(
        &self,
        token: &str,
    ) -> Result<Option<EnrollmentTokenRecord>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT token, created_at_ms, expires_at_ms, consumed_at_ms, consumed_by
                 FROM enrollment_tokens WHERE token = ?1",
                params![token],
                |row| {
                    Ok(EnrollmentTokenRecord {
                        token: row.get(0)?,
                        created_at_ms: row.get::<_, i64>(1)? as u64,
                        expires_at_ms: row.get::<_, i64>(2)? as u64,
                        consumed_at_ms: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
                        consumed_by: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    /// Non-consuming liveness check, used by the upgrade gate.
    pub fn enrollment_token_valid(&self, token: &str, now_ms: u64) -> Result<bool, StoreError> {
        Ok(self
            .enrollment_token(token)?
            .is_some_and(|t| t.consumed_at_ms.is_none() && t.expires_at_ms > now_ms))
    }

    /// Atomically consume a token, recording the consuming agent name.
    pub fn consume_enrollment_token(
        &self,
        token: &str,
        agent_name: &str,
        now_ms: u64,
    ) -> Result<Result<(), TokenRejection>, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE enrollment_tokens
             SET consumed_at_ms = ?2, consumed_by = ?3
             WHERE token = ?1 AND consumed_at_ms IS NULL AND expires_at_ms > ?2",
            params![token, now_ms as i64, agent_name],
        )?;
        if changed == 1 {
            return Ok(Ok(()));
        }
        // Losing the conditional update: explain why.
        let row: Option<(Option<i64>, i64)> = conn
            .query_row(
                "SELECT consumed_at_ms, expires_at_ms FROM enrollment_tokens WHERE token = ?1",
                params![token],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let rejection = match row {
            None => TokenRejection::Unknown,
            Some((Some(_), _)) => TokenRejection::AlreadyUsed,
            Some((None, _)) => TokenRejection::Expired,
        };
        Ok(Err(rejection))
    }
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
