// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the hub.

use std::path::PathBuf;

/// Listen port (`PORT`, default 8420).
pub fn port() -> u16 {
    std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8420)
}

/// Bind address (`HOST`, default 0.0.0.0).
pub fn host() -> String {
    std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

/// Root key for at-rest encryption (`SONDE_SECRET`).
pub fn hub_secret() -> Option<String> {
    std::env::var("SONDE_SECRET").ok().filter(|s| !s.is_empty())
}

/// Database path (`SONDE_DB_PATH`, default ./sonde.db).
pub fn db_path() -> PathBuf {
    std::env::var("SONDE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("sonde.db"))
}

/// Whether to terminate TLS (with optional client certs) on the listener
/// (`SONDE_TLS=1`). Requires a CA; without one the hub stays on plain TCP.
pub fn tls_enabled() -> bool {
    std::env::var("SONDE_TLS").is_ok_and(|s| s == "1" || s.eq_ignore_ascii_case("true"))
}
