// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn sign_then_verify_succeeds() {
    let key = EnvelopeKey::generate();
    let payload = json!({"name": "srv1", "os": "linux"});
    let sig = key.sign(&payload);
    let pub_pem = key.public_key_pem().unwrap();
    assert!(verify_payload(&pub_pem, &payload, &sig).is_ok());
}

#[test]
fn signature_is_over_canonical_form() {
    // Key order must not matter: both spellings verify with one signature.
    let key = EnvelopeKey::generate();
    let a: serde_json::Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
    let b: serde_json::Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
    let sig = key.sign(&a);
    let pub_pem = key.public_key_pem().unwrap();
    assert!(verify_payload(&pub_pem, &b, &sig).is_ok());
}

#[test]
fn tampered_payload_fails_verification() {
    let key = EnvelopeKey::generate();
    let payload = json!({"v": 1});
    let sig = key.sign(&payload);
    let pub_pem = key.public_key_pem().unwrap();
    assert!(matches!(
        verify_payload(&pub_pem, &json!({"v": 2}), &sig),
        Err(SignError::Verify)
    ));
}

#[test]
fn empty_signature_is_missing() {
    let key = EnvelopeKey::generate();
    let pub_pem = key.public_key_pem().unwrap();
    assert!(matches!(
        verify_payload(&pub_pem, &json!({}), ""),
        Err(SignError::Missing)
    ));
}

#[test]
fn garbage_signature_is_an_encoding_error() {
    let key = EnvelopeKey::generate();
    let pub_pem = key.public_key_pem().unwrap();
    assert!(matches!(
        verify_payload(&pub_pem, &json!({}), "!!not-base64!!"),
        Err(SignError::Encoding)
    ));
}

#[test]
fn wrong_key_fails_verification() {
    let signer = EnvelopeKey::generate();
    let other = EnvelopeKey::generate();
    let payload = json!({"v": 1});
    let sig = signer.sign(&payload);
    let pub_pem = other.public_key_pem().unwrap();
    assert!(verify_payload(&pub_pem, &payload, &sig).is_err());
}

#[test]
fn private_key_round_trips_through_pem() {
    let key = EnvelopeKey::generate();
    let pem = key.to_pkcs8_pem().unwrap();
    let restored = EnvelopeKey::from_pkcs8_pem(&pem).unwrap();
    let payload = json!({"n": 42});
    let sig = restored.sign(&payload);
    assert!(verify_payload(&key.public_key_pem().unwrap(), &payload, &sig).is_ok());
}
