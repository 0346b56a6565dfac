//! Activation token signing and verification.
//!
//! Tokens use the format: `base64url(payload).base64url(signature)`
//!
//! The payload is a JSON object containing:
//! - `key`: canonical license key
//! - `fp`: the device fingerprint the token was issued for
//! - `iat`: issued-at timestamp (seconds since epoch)
//! - `exp`: expiry timestamp, absent for perpetual licenses
//!
//! The signature covers `payload_b64.as_bytes()` (the base64url-encoded
//! payload string, not the decoded JSON). Holding a valid token is never
//! sufficient on its own; verification always re-reads the license so
//! revocation takes effect immediately.

use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// The signed claims inside an activation token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Canonical license key.
    pub key: String,
    /// Device fingerprint the token is bound to.
    pub fp: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiry timestamp (seconds since epoch), absent for perpetual.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// A parsed and signature-verified activation token.
#[derive(Debug, Clone)]
pub struct ActivationToken {
    raw: String,
    payload: TokenPayload,
}

impl ActivationToken {
    /// Signs a payload into a token string.
    pub fn issue(signing_key: &SigningKey, payload: &TokenPayload) -> LicenseResult<String> {
        let payload_json = serde_json::to_vec(payload)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
        let signature = signing_key.sign(payload_b64.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        Ok(format!("{payload_b64}.{sig_b64}"))
    }

    /// Parses a token string and verifies its signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the token format is invalid or signature
    /// verification fails.
    pub fn parse(token: &str, verifying_key: &VerifyingKey) -> LicenseResult<Self> {
        let token = token.trim();

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 2 {
            return Err(LicenseError::InvalidKeyFormat(
                "token must have exactly two parts separated by a dot".to_string(),
            ));
        }
        let payload_b64 = parts[0];
        let signature_b64 = parts[1];

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| LicenseError::InvalidKeyFormat(format!("invalid signature base64: {e}")))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|_| LicenseError::InvalidKeyFormat("invalid signature length".to_string()))?;

        verifying_key
            .verify(payload_b64.as_bytes(), &signature)
            .map_err(|_| LicenseError::InvalidSignature)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| LicenseError::InvalidKeyFormat(format!("invalid payload base64: {e}")))?;
        let payload: TokenPayload = serde_json::from_slice(&payload_json)
            .map_err(|e| LicenseError::InvalidPayload(format!("invalid payload JSON: {e}")))?;

        Ok(Self {
            raw: token.to_string(),
            payload,
        })
    }

    /// Returns the raw token string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the verified claims.
    #[must_use]
    pub fn payload(&self) -> &TokenPayload {
        &self.payload
    }

    /// Returns true if the token itself is expired at `now_secs`.
    #[must_use]
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.payload.exp.is_some_and(|exp| now_secs > exp)
    }
}
