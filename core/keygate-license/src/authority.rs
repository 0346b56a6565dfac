//! The license authority service.

use crate::error::{LicenseError, LicenseResult};
use crate::key;
use crate::token::{ActivationToken, TokenPayload};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use keygate_store::{ClaimOutcome, Store, StoreError};
use keygate_types::{ActorRole, DeviceFingerprint, License, LicenseId, LicenseStatus, LicenseType, Page};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts before giving up on finding a non-colliding key. With a
/// 30-character alphabet and 32 positions a second attempt is already
/// astronomically unlikely.
pub const KEY_GENERATION_ATTEMPTS: usize = 4;

/// Admin request to mint a new license.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Purchaser email.
    pub customer_email: String,
    /// Purchaser name.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Purchaser company.
    #[serde(default)]
    pub company_name: Option<String>,
    /// Commercial tier.
    pub license_type: LicenseType,
    /// Maximum distinct devices.
    pub max_activations: i64,
    /// Days until expiry; absent means perpetual.
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// Result of a successful activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationOutcome {
    /// The license after the claim.
    pub license: License,
    /// Signed activation token for offline-ish verification calls.
    pub token: String,
    /// False when this device was already bound (idempotent retry).
    pub newly_bound: bool,
}

/// Result of a verification call. Never an error: verification fails
/// closed and reports `valid: false` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    /// Whether the credential is valid for this device right now.
    pub valid: bool,
    /// Coarse refusal category when not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Tier of the verified license.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_type: Option<LicenseType>,
    /// Effective status of the verified license.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LicenseStatus>,
    /// Expiry of the verified license.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Verification {
    fn invalid(reason: &str) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            license_type: None,
            status: None,
            expires_at: None,
        }
    }
}

/// Generates, activates, verifies, and revokes licenses.
pub struct LicenseAuthority {
    store: Arc<Store>,
    signing_key: SigningKey,
}

impl LicenseAuthority {
    /// Builds an authority over the given store with the given token
    /// signing key.
    #[must_use]
    pub fn new(store: Arc<Store>, signing_key: SigningKey) -> Self {
        Self { store, signing_key }
    }

    /// The public half of the token signing key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Mints a new PENDING license (admin only).
    ///
    /// Retries internally on the astronomically unlikely key collision;
    /// [`LicenseError::KeyCollision`] only escapes when every attempt
    /// collided.
    pub fn generate(&self, role: ActorRole, request: &GenerateRequest) -> LicenseResult<License> {
        if !role.is_admin() {
            return Err(LicenseError::Forbidden);
        }
        if request.customer_email.trim().is_empty() {
            return Err(LicenseError::InvalidRequest("customer_email is empty".into()));
        }
        if request.max_activations < 1 {
            return Err(LicenseError::InvalidRequest(
                "max_activations must be at least 1".into(),
            ));
        }
        if let Some(days) = request.expires_in_days {
            if days < 1 {
                return Err(LicenseError::InvalidRequest(
                    "expires_in_days must be at least 1".into(),
                ));
            }
        }

        let now = Utc::now();
        let expires_at = request.expires_in_days.map(|days| now + Duration::days(days));

        let mut rng = rand::thread_rng();
        for _ in 0..KEY_GENERATION_ATTEMPTS {
            let license = License {
                id: LicenseId::new(),
                license_key: key::generate_key(&mut rng),
                license_type: request.license_type,
                status: LicenseStatus::Pending,
                customer_email: request.customer_email.trim().to_string(),
                customer_name: request.customer_name.clone(),
                company_name: request.company_name.clone(),
                activations: Vec::new(),
                activation_count: 0,
                max_activations: request.max_activations,
                issued_at: now,
                activated_at: None,
                expires_at,
                revoked_at: None,
                revoke_reason: None,
            };
            match self.store.insert_license(&license) {
                Ok(()) => {
                    info!(key = %license.license_key, tier = ?license.license_type, "license generated");
                    return Ok(license);
                }
                Err(StoreError::Duplicate(_)) => {
                    warn!("license key collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LicenseError::KeyCollision)
    }

    /// Activates a license on a device, binding the fingerprint and
    /// issuing a signed activation token.
    ///
    /// Idempotent per device: re-activating an already-bound fingerprint
    /// returns a fresh token without consuming another slot.
    pub fn activate(
        &self,
        key_input: &str,
        fingerprint: &DeviceFingerprint,
        hardware_signature: Option<&str>,
        method: &str,
    ) -> LicenseResult<ActivationOutcome> {
        let canonical = key::normalize_key(key_input)?;
        let now = Utc::now();

        let outcome = self.store.claim_activation(
            &canonical,
            fingerprint.as_str(),
            hardware_signature,
            method,
            now,
        )?;

        match outcome {
            ClaimOutcome::Bound {
                license,
                newly_bound,
            } => {
                let payload = TokenPayload {
                    key: canonical,
                    fp: fingerprint.as_str().to_string(),
                    iat: now.timestamp(),
                    exp: license.expires_at.map(|t| t.timestamp()),
                };
                let token = ActivationToken::issue(&self.signing_key, &payload)?;
                info!(
                    key = %license.license_key,
                    fingerprint = fingerprint.as_str(),
                    newly_bound,
                    "license activated"
                );
                Ok(ActivationOutcome {
                    license,
                    token,
                    newly_bound,
                })
            }
            ClaimOutcome::LimitReached { max_activations } => {
                Err(LicenseError::ActivationLimitReached(max_activations))
            }
            ClaimOutcome::Revoked => Err(LicenseError::Revoked),
            ClaimOutcome::Expired { expires_at } => {
                Err(LicenseError::Expired(expires_at.to_rfc3339()))
            }
            ClaimOutcome::NotFound => Err(LicenseError::NotFound),
        }
    }

    /// Verifies a credential (activation token or raw license key) for a
    /// device. Fails closed: every failure path, including internal
    /// errors, comes back as `valid: false`; details are logged
    /// server-side only.
    #[must_use]
    pub fn verify(&self, credential: &str, fingerprint: &DeviceFingerprint) -> Verification {
        match self.verify_inner(credential, fingerprint) {
            Ok(verification) => verification,
            Err(
                e @ (LicenseError::Store(_)
                | LicenseError::Serialization(_)),
            ) => {
                // Internal failure: log the cause, report plain invalid.
                warn!(error = %e, "verification failed internally");
                Verification::invalid("invalid")
            }
            Err(e) => {
                let reason = match &e {
                    LicenseError::NotFound => "not_found",
                    LicenseError::Revoked => "revoked",
                    LicenseError::Expired(_) => "expired",
                    LicenseError::DeviceMismatch => "device_mismatch",
                    LicenseError::InvalidSignature => "invalid_signature",
                    _ => "invalid",
                };
                info!(error = %e, reason, "verification refused");
                Verification::invalid(reason)
            }
        }
    }

    fn verify_inner(
        &self,
        credential: &str,
        fingerprint: &DeviceFingerprint,
    ) -> LicenseResult<Verification> {
        let now = Utc::now();

        let canonical = if credential.contains('.') {
            let token = ActivationToken::parse(credential, &self.verifying_key())?;
            if token.payload().fp != fingerprint.as_str() {
                return Err(LicenseError::DeviceMismatch);
            }
            if token.is_expired_at(now.timestamp()) {
                return Err(LicenseError::Expired(
                    token
                        .payload()
                        .exp
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                ));
            }
            key::normalize_key(&token.payload().key)?
        } else {
            key::normalize_key(credential)?
        };

        let license = self
            .store
            .license_by_key(&canonical)?
            .ok_or(LicenseError::NotFound)?;

        match license.effective_status(now) {
            LicenseStatus::Revoked => return Err(LicenseError::Revoked),
            LicenseStatus::Expired => {
                let expires = license
                    .expires_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                return Err(LicenseError::Expired(expires));
            }
            LicenseStatus::Pending | LicenseStatus::Active => {}
        }
        if !license.is_bound_to(fingerprint.as_str()) {
            return Err(LicenseError::DeviceMismatch);
        }

        Ok(Verification {
            valid: true,
            reason: None,
            license_type: Some(license.license_type),
            status: Some(license.effective_status(now)),
            expires_at: license.expires_at,
        })
    }

    /// Revokes a license (admin only). Terminal and immediate: the next
    /// verification against the store sees it.
    pub fn revoke(&self, role: ActorRole, key_input: &str, reason: &str) -> LicenseResult<License> {
        if !role.is_admin() {
            return Err(LicenseError::Forbidden);
        }
        let canonical = key::normalize_key(key_input)?;
        let license = self
            .store
            .revoke_license(&canonical, reason, Utc::now())?
            .ok_or(LicenseError::NotFound)?;
        warn!(key = %canonical, reason, "license revoked");
        Ok(license)
    }

    /// Fetches a license by key (admin only).
    pub fn get(&self, role: ActorRole, key_input: &str) -> LicenseResult<License> {
        if !role.is_admin() {
            return Err(LicenseError::Forbidden);
        }
        let canonical = key::normalize_key(key_input)?;
        self.store
            .license_by_key(&canonical)?
            .ok_or(LicenseError::NotFound)
    }

    /// Pages through all licenses (admin only).
    pub fn list(&self, role: ActorRole, page: Page) -> LicenseResult<Vec<License>> {
        if !role.is_admin() {
            return Err(LicenseError::Forbidden);
        }
        Ok(self.store.list_licenses(page)?)
    }
}
