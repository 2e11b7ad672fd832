// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal certificate authority.
//!
//! One Ed25519 key backs both roles of the hub's identity: it signs issued
//! certificates (via rcgen) and envelope payloads (via the shared Ed25519
//! canonical-payload scheme). Issued agent certificates likewise carry an
//! Ed25519 key whose PKCS#8 PEM works for TLS client auth and envelope
//! signing alike.

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use sha2::{Digest, Sha256};
use thiserror::Error;

use sonde_wire::EnvelopeKey;

const CA_COMMON_NAME: &str = "Sonde Hub CA";

/// Errors creating or using the CA.
#[derive(Debug, Error)]
pub enum CaError {
    #[error("certificate generation failed: {0}")]
    Generate(String),
    #[error("key material invalid: {0}")]
    Key(String),
}

/// Material issued for one agent at enrollment.
pub struct IssuedCert {
    pub cert_pem: String,
    /// PKCS#8 PEM of the agent's Ed25519 key (TLS client auth + envelope
    /// signing).
    pub key_pem: String,
    /// SPKI PEM of the same key, stored hub-side for signature checks.
    pub public_key_pem: String,
    /// SHA-256 hex over the certificate DER.
    pub fingerprint: String,
}

/// The hub's certificate authority.
pub struct Ca {
    cert_pem: String,
    key_pem: String,
    envelope_key: std::sync::Arc<EnvelopeKey>,
}

impl Ca {
    /// Mint a fresh self-signed CA.
    pub fn create() -> Result<Self, CaError> {
        let envelope_key = EnvelopeKey::generate();
        let key_pem = envelope_key.to_pkcs8_pem().map_err(|e| CaError::Key(e.to_string()))?;
        let key_pair = KeyPair::from_pem(&key_pem).map_err(|e| CaError::Key(e.to_string()))?;

        let mut params = CertificateParams::new(Vec::new())
            .map_err(|e| CaError::Generate(e.to_string()))?;
        params.distinguished_name.push(DnType::CommonName, CA_COMMON_NAME);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert =
            params.self_signed(&key_pair).map_err(|e| CaError::Generate(e.to_string()))?;

        Ok(Self { cert_pem: cert.pem(), key_pem, envelope_key: std::sync::Arc::new(envelope_key) })
    }

    /// Rehydrate from persisted PEMs.
    pub fn from_pems(cert_pem: &str, key_pem: &str) -> Result<Self, CaError> {
        let envelope_key =
            EnvelopeKey::from_pkcs8_pem(key_pem).map_err(|e| CaError::Key(e.to_string()))?;
        // Validate the key parses for certificate signing too.
        KeyPair::from_pem(key_pem).map_err(|e| CaError::Key(e.to_string()))?;
        Ok(Self {
            cert_pem: cert_pem.to_string(),
            key_pem: key_pem.to_string(),
            envelope_key: std::sync::Arc::new(envelope_key),
        })
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub(crate) fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// The hub's envelope-signing key.
    pub fn envelope_key(&self) -> std::sync::Arc<EnvelopeKey> {
        std::sync::Arc::clone(&self.envelope_key)
    }

    /// SPKI PEM agents use to verify hub-signed envelopes.
    pub fn hub_public_key_pem(&self) -> Result<String, CaError> {
        self.envelope_key.public_key_pem().map_err(|e| CaError::Key(e.to_string()))
    }

    /// Reconstruct the issuer signing context. The regenerated certificate
    /// shares the stored CA's subject and key, so leaves chain to the
    /// original stored root.
    fn issuer(&self) -> Result<(rcgen::Certificate, KeyPair), CaError> {
        let key_pair = KeyPair::from_pem(&self.key_pem).map_err(|e| CaError::Key(e.to_string()))?;
        let mut params = CertificateParams::new(Vec::new())
            .map_err(|e| CaError::Generate(e.to_string()))?;
        params.distinguished_name.push(DnType::CommonName, CA_COMMON_NAME);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert =
            params.self_signed(&key_pair).map_err(|e| CaError::Generate(e.to_string()))?;
        Ok((cert, key_pair))
    }

    /// Issue a leaf certificate whose subject identifies the agent name.
    pub fn issue_agent_cert(&self, agent_name: &str) -> Result<IssuedCert, CaError> {
        let agent_key = EnvelopeKey::generate();
        let key_pem = agent_key.to_pkcs8_pem().map_err(|e| CaError::Key(e.to_string()))?;
        let public_key_pem =
            agent_key.public_key_pem().map_err(|e| CaError::Key(e.to_string()))?;
        let key_pair = KeyPair::from_pem(&key_pem).map_err(|e| CaError::Key(e.to_string()))?;

        let mut params = CertificateParams::new(vec![agent_name.to_string()])
            .map_err(|e| CaError::Generate(e.to_string()))?;
        params.distinguished_name.push(DnType::CommonName, agent_name);

        let (issuer_cert, issuer_key) = self.issuer()?;
        let cert = params
            .signed_by(&key_pair, &issuer_cert, &issuer_key)
            .map_err(|e| CaError::Generate(e.to_string()))?;

        let fingerprint = hex::encode(Sha256::digest(cert.der()));
        Ok(IssuedCert { cert_pem: cert.pem(), key_pem, public_key_pem, fingerprint })
    }

    /// Issue the hub's own TLS server certificate for the given hostnames.
    pub fn issue_server_cert(&self, hosts: &[String]) -> Result<(String, String), CaError> {
        let server_key = EnvelopeKey::generate();
        let key_pem = server_key.to_pkcs8_pem().map_err(|e| CaError::Key(e.to_string()))?;
        let key_pair = KeyPair::from_pem(&key_pem).map_err(|e| CaError::Key(e.to_string()))?;

        let mut names = hosts.to_vec();
        if names.is_empty() {
            names.push("localhost".to_string());
        }
        let mut params =
            CertificateParams::new(names).map_err(|e| CaError::Generate(e.to_string()))?;
        params.distinguished_name.push(DnType::CommonName, "Sonde Hub");

        let (issuer_cert, issuer_key) = self.issuer()?;
        let cert = params
            .signed_by(&key_pair, &issuer_cert, &issuer_key)
            .map_err(|e| CaError::Generate(e.to_string()))?;
        Ok((cert.pem(), key_pem))
    }
}

#[cfg(test)]
#[path = "ca_tests.rs"]
mod tests;
