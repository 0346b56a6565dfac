//! Error types for the trial ledger.

use keygate_store::StoreError;
use keygate_types::FingerprintError;
use thiserror::Error;

/// Result type for trial operations.
pub type TrialResult<T> = Result<T, TrialError>;

/// Trial-ledger-specific errors.
#[derive(Debug, Error)]
pub enum TrialError {
    /// No trial record, or the trial is not in a consumable state.
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// No credits remaining.
    #[error("insufficient credits")]
    InsufficientCredits,

    /// No trial record for this fingerprint.
    #[error("trial not found")]
    NotFound,

    /// Operation requires the admin role.
    #[error("admin role required")]
    Forbidden,

    /// Grant amount must be positive.
    #[error("grant amount must be positive")]
    InvalidGrantAmount,

    /// Malformed fingerprint or device signals.
    #[error("validation error: {0}")]
    Validation(#[from] FingerprintError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
