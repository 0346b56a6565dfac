//! Shared fixtures for license authority tests.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use keygate_license::{GenerateRequest, LicenseAuthority};
use keygate_store::Store;
use keygate_types::{DeviceFingerprint, LicenseType};
use std::sync::Arc;

/// Returns a deterministic Ed25519 signing key from a fixed seed.
pub fn test_signing_key() -> SigningKey {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    SigningKey::from_bytes(&seed)
}

/// A different key, for cross-key signature tests.
pub fn other_signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// An authority over a fresh in-memory store.
pub fn authority() -> LicenseAuthority {
    let store = Arc::new(Store::open_in_memory().unwrap());
    LicenseAuthority::new(store, test_signing_key())
}

pub fn fp(raw: &str) -> DeviceFingerprint {
    DeviceFingerprint::parse(raw).unwrap()
}

/// A standard generate request with the given activation ceiling.
pub fn standard_request(max_activations: i64) -> GenerateRequest {
    GenerateRequest {
        customer_email: "buyer@example.com".to_string(),
        customer_name: Some("Ada Buyer".to_string()),
        company_name: None,
        license_type: LicenseType::Standard,
        max_activations,
        expires_in_days: None,
    }
}
