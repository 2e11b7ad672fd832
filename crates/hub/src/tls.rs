// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS termination with optional CA-verified client certificates.
//!
//! When enabled, the listener serves a CA-issued server certificate and
//! accepts (but does not require) client certificates; a presented cert
//! must chain to the hub CA or the handshake fails, which is what lets the
//! upgrade gate trust "a client certificate was presented".

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Errors assembling the TLS listener.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("invalid PEM: {0}")]
    Pem(String),
    #[error("tls config error: {0}")]
    Config(String),
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut pem.as_bytes()).collect();
    let certs = certs.map_err(|e| TlsError::Pem(e.to_string()))?;
    if certs.is_empty() {
        return Err(TlsError::Pem("no certificates found".into()));
    }
    Ok(certs)
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| TlsError::Pem(e.to_string()))?
        .ok_or_else(|| TlsError::Pem("no private key found".into()))
}

/// Build the listener's TLS acceptor.
///
/// `ca_cert_pem` roots the optional client verifier; `server_cert_pem` /
/// `server_key_pem` are the CA-issued server identity.
pub fn acceptor(
    ca_cert_pem: &str,
    server_cert_pem: &str,
    server_key_pem: &str,
) -> Result<TlsAcceptor, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(ca_cert_pem)? {
        roots.add(cert).map_err(|e| TlsError::Config(e.to_string()))?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .allow_unauthenticated()
        .build()
        .map_err(|e| TlsError::Config(e.to_string()))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(parse_certs(server_cert_pem)?, parse_key(server_key_pem)?)
        .map_err(|e| TlsError::Config(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tests;
