// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ed25519 envelope signatures.
//!
//! Signing covers only the `payload` subtree (id and timestamp vary per
//! frame). The bytes signed are the shared canonical serialization from
//! `sonde_core::canonical_json`; both sides must use it for signatures to
//! interoperate. Private keys travel as PKCS#8 PEM, public keys as SPKI
//! PEM.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::Value;
use thiserror::Error;

use sonde_core::canonical_json;

/// Errors producing or checking an envelope signature.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid key material: {0}")]
    Key(String),
    #[error("signature is not valid base64")]
    Encoding,
    #[error("signature verification failed")]
    Verify,
    #[error("signature required but missing")]
    Missing,
}

/// An Ed25519 keypair used for envelope signing.
pub struct EnvelopeKey {
    signing: SigningKey,
}

impl EnvelopeKey {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self { signing: SigningKey::generate(&mut rng) }
    }

    /// Load a private key from PKCS#8 PEM.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, SignError> {
        let signing =
            SigningKey::from_pkcs8_pem(pem).map_err(|e| SignError::Key(e.to_string()))?;
        Ok(Self { signing })
    }

    /// Private key as PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<String, SignError> {
        self.signing
            .to_pkcs8_pem(LineEnding::LF)
            .map(|z| z.to_string())
            .map_err(|e| SignError::Key(e.to_string()))
    }

    /// Public half as SPKI PEM.
    pub fn public_key_pem(&self) -> Result<String, SignError> {
        self.signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SignError::Key(e.to_string()))
    }

    /// Sign a payload; returns the base64 signature.
    pub fn sign(&self, payload: &Value) -> String {
        let canonical = canonical_json(payload);
        let sig = self.signing.sign(canonical.as_bytes());
        BASE64.encode(sig.to_bytes())
    }
}

/// Verify a base64 signature over a payload against an SPKI PEM public key.
pub fn verify_payload(pub_key_pem: &str, payload: &Value, signature: &str) -> Result<(), SignError> {
    if signature.is_empty() {
        return Err(SignError::Missing);
    }
    let key = VerifyingKey::from_public_key_pem(pub_key_pem)
        .map_err(|e| SignError::Key(e.to_string()))?;
    let raw = BASE64.decode(signature).map_err(|_| SignError::Encoding)?;
    let sig = Signature::from_slice(&raw).map_err(|_| SignError::Encoding)?;
    let canonical = canonical_json(payload);
    key.verify(canonical.as_bytes(), &sig).map_err(|_| SignError::Verify)
}

#[cfg(test)]
#[path = "sign_tests.rs"]
mod tests;
