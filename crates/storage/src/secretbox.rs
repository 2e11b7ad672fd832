// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! At-rest encryption for stored secrets.
//!
//! AES-256-GCM with a key derived from the hub-wide secret via scrypt
//! (N=16384, r=8, p=1). Blob layout: `salt(16) || nonce(12) || ciphertext`,
//! base64-encoded. A fresh salt and nonce are drawn per encryption.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
// scrypt N=16384 => log_n 14
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Errors sealing or opening a secret blob.
#[derive(Debug, Error)]
pub enum SecretBoxError {
    #[error("key derivation failed")]
    Derive,
    #[error("encryption failed")]
    Seal,
    #[error("decryption failed (wrong secret or corrupt blob)")]
    Open,
    #[error("malformed secret blob")]
    Format,
}

/// Symmetric sealer keyed from the hub-wide secret.
#[derive(Clone)]
pub struct SecretBox {
    secret: String,
}

impl SecretBox {
    pub fn new(hub_secret: impl Into<String>) -> Self {
        Self { secret: hub_secret.into() }
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; 32], SecretBoxError> {
        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
            .map_err(|_| SecretBoxError::Derive)?;
        let mut key = [0u8; 32];
        scrypt::scrypt(self.secret.as_bytes(), salt, &params, &mut key)
            .map_err(|_| SecretBoxError::Derive)?;
        Ok(key)
    }

    /// Encrypt plaintext into a self-describing base64 blob.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, SecretBoxError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SecretBoxError::Seal)?;

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a blob produced by [`SecretBox::seal`].
    pub fn open(&self, blob: &str) -> Result<Vec<u8>, SecretBoxError> {
        let raw = BASE64.decode(blob).map_err(|_| SecretBoxError::Format)?;
        if raw.len() < SALT_LEN + NONCE_LEN {
            return Err(SecretBoxError::Format);
        }
        let (salt, rest) = raw.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretBoxError::Open)
    }
}

#[cfg(test)]
#[path = "secretbox_tests.rs"]
mod tests;
