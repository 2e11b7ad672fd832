// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub identity: the internal CA and envelope signing key.

mod ca;

pub use ca::{Ca, CaError, IssuedCert};

use std::sync::Arc;

use sonde_storage::Store;

/// Load the persisted CA, or mint one on first start.
///
/// An unreadable CA is not fatal: the hub logs and continues without mTLS
/// issuance (enrollment still mints API keys).
pub fn init_ca(store: &Store) -> Option<Arc<Ca>> {
    match store.load_ca() {
        Ok(Some((cert_pem, key_pem))) => match Ca::from_pems(&cert_pem, &key_pem) {
            Ok(ca) => Some(Arc::new(ca)),
            Err(e) => {
                tracing::error!(error = %e, "stored CA unusable; continuing without mTLS issuance");
                None
            }
        },
        Ok(None) => match Ca::create() {
            Ok(ca) => {
                if let Err(e) = store.store_ca(ca.cert_pem(), ca.key_pem()) {
                    tracing::error!(error = %e, "failed to persist new CA; continuing without mTLS issuance");
                    return None;
                }
                tracing::info!("minted hub certificate authority");
                Some(Arc::new(ca))
            }
            Err(e) => {
                tracing::error!(error = %e, "CA creation failed; continuing without mTLS issuance");
                None
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "CA unreadable; continuing without mTLS issuance");
            None
        }
    }
}
