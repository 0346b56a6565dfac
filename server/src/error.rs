//! HTTP error mapping for the licensing API.
//!
//! Core errors become structured JSON failures: `{ "error": "...",
//! "message": "..." }` with a status code per category. Verification is
//! the one endpoint that never takes this path; it fails closed inside
//! the authority and always answers 200.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keygate_license::LicenseError;
use keygate_trial::TrialError;
use serde::Serialize;
use tracing::error;

/// A structured API failure.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

/// JSON body of an API failure.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: String) -> Self {
        Self {
            status,
            error,
            message,
        }
    }

    /// 400 with a caller-facing message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(error = self.error, message = %self.message, "internal error");
        }
        let body = ErrorBody {
            error: self.error,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TrialError> for ApiError {
    fn from(err: TrialError) -> Self {
        let message = err.to_string();
        match err {
            TrialError::NotEligible(_) => {
                Self::new(StatusCode::CONFLICT, "not_eligible", message)
            }
            TrialError::InsufficientCredits => {
                Self::new(StatusCode::PAYMENT_REQUIRED, "insufficient_credits", message)
            }
            TrialError::NotFound => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            TrialError::Forbidden => Self::new(StatusCode::FORBIDDEN, "forbidden", message),
            TrialError::InvalidGrantAmount | TrialError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
            }
            TrialError::Store(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        let message = err.to_string();
        match err {
            LicenseError::NotFound => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            LicenseError::Revoked => Self::new(StatusCode::CONFLICT, "revoked", message),
            LicenseError::Expired(_) => Self::new(StatusCode::CONFLICT, "expired", message),
            LicenseError::ActivationLimitReached(_) => {
                Self::new(StatusCode::CONFLICT, "activation_limit_reached", message)
            }
            LicenseError::DeviceMismatch => {
                Self::new(StatusCode::CONFLICT, "device_mismatch", message)
            }
            LicenseError::Forbidden => Self::new(StatusCode::FORBIDDEN, "forbidden", message),
            LicenseError::InvalidKeyFormat(_)
            | LicenseError::InvalidSignature
            | LicenseError::InvalidPayload(_)
            | LicenseError::InvalidRequest(_)
            | LicenseError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
            }
            LicenseError::KeyCollision
            | LicenseError::Store(_)
            | LicenseError::Serialization(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}
