// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS client configuration pinned on the hub CA.
//!
//! The CA is self-signed, so the verifier pins on it rather than on the
//! server name: certificate chain validation is delegated to webpki and
//! only a name mismatch is forgiven.

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, Error as RustlsError, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio_tungstenite::Connector;

use crate::config::AgentConfig;

/// CA-pinned verifier that tolerates server-name mismatch only.
#[derive(Debug)]
struct CaPinnedVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for CaPinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            // Pin on the CA: the chain verified, only the name differs.
            Err(RustlsError::InvalidCertificate(CertificateError::NotValidForName)) => {
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => Err(e),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn read_certs(path: &std::path::Path) -> std::io::Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read_to_string(path)?;
    rustls_pemfile::certs(&mut pem.as_bytes()).collect()
}

fn read_key(path: &std::path::Path) -> std::io::Result<PrivateKeyDer<'static>> {
    let pem = std::fs::read_to_string(path)?;
    rustls_pemfile::private_key(&mut pem.as_bytes())?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no private key"))
}

/// Build the WebSocket connector: CA-pinned mTLS when cert paths are
/// configured, default TLS otherwise (`None` lets tungstenite pick).
pub fn connector(config: &AgentConfig) -> std::io::Result<Option<Connector>> {
    let (Some(ca_path), Some(cert_path), Some(key_path)) =
        (&config.ca_cert_path, &config.cert_path, &config.key_path)
    else {
        return Ok(None);
    };

    let mut roots = RootCertStore::empty();
    for cert in read_certs(ca_path)? {
        roots
            .add(cert)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    }
    let inner = WebPkiServerVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let client_config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(CaPinnedVerifier { inner }))
        .with_client_auth_cert(read_certs(cert_path)?, read_key(key_path)?)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    Ok(Some(Connector::Rustls(Arc::new(client_config))))
}

#[cfg(test)]
#[path = "tlsclient_tests.rs"]
mod tests;
