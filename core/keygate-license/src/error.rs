//! Error types for the license authority.

use keygate_store::StoreError;
use keygate_types::FingerprintError;
use thiserror::Error;

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// License-authority-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Key is not 32 alphanumeric characters after normalization.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// Ed25519 signature verification failed.
    #[error("activation token signature invalid")]
    InvalidSignature,

    /// Token payload JSON is malformed or missing required fields.
    #[error("invalid token payload: {0}")]
    InvalidPayload(String),

    /// No license with this key.
    #[error("license not found")]
    NotFound,

    /// License has been revoked.
    #[error("license has been revoked")]
    Revoked,

    /// License is past its expiry instant.
    #[error("license expired on {0}")]
    Expired(String),

    /// All activation slots are bound to other devices.
    #[error("activation limit reached (max {0} devices)")]
    ActivationLimitReached(i64),

    /// The license is bound to different devices than the caller's.
    #[error("license is not bound to this device")]
    DeviceMismatch,

    /// Operation requires the admin role.
    #[error("admin role required")]
    Forbidden,

    /// Malformed generation request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed fingerprint.
    #[error("validation error: {0}")]
    Validation(#[from] FingerprintError),

    /// Key generation kept colliding with existing keys.
    #[error("could not generate a unique license key")]
    KeyCollision,

    /// Store error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
