//! Request handlers for the licensing API.
//!
//! Bodies are deserialized into typed requests before anything reaches
//! the core, and the bearer token is resolved to an [`ActorRole`] once
//! per request; core services see only validated input and an explicit
//! role.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use keygate_license::{format_display, GenerateRequest, Verification};
use keygate_trial::{Eligibility, TrialStats};
use keygate_types::{
    ActorRole, CreditLedgerEntry, DeviceFingerprint, DeviceSignals, License, Page, TrialRecord,
    DEFAULT_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Resolves the caller's role from the Authorization header.
fn role_from(headers: &HeaderMap, state: &AppState) -> ActorRole {
    let supplied = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match supplied {
        Some(token)
            if !state.admin_token.is_empty()
                && constant_time_eq(token.as_bytes(), state.admin_token.as_bytes()) =>
        {
            ActorRole::Admin
        }
        _ => ActorRole::Client,
    }
}

fn parse_fingerprint(raw: &str) -> Result<DeviceFingerprint, ApiError> {
    DeviceFingerprint::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageParams {
    page: Option<u32>,
    per_page: Option<u32>,
}

impl PageParams {
    fn to_page(&self) -> Page {
        Page::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

// ── Trial endpoints ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TrialCheckRequest {
    device_fingerprint: String,
    #[serde(flatten)]
    signals: DeviceSignals,
}

pub async fn trial_check(
    State(state): State<AppState>,
    Json(req): Json<TrialCheckRequest>,
) -> Result<Json<Eligibility>, ApiError> {
    let fingerprint = parse_fingerprint(&req.device_fingerprint)?;
    let eligibility = state.ledger.check_eligibility(&fingerprint, &req.signals)?;
    Ok(Json(eligibility))
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    device_fingerprint: String,
    action: String,
    #[serde(default)]
    reference_id: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

pub async fn trial_consume(
    State(state): State<AppState>,
    Json(req): Json<ConsumeRequest>,
) -> Result<Json<CreditLedgerEntry>, ApiError> {
    let fingerprint = parse_fingerprint(&req.device_fingerprint)?;
    let entry = state.ledger.consume_credit(
        &fingerprint,
        &req.action,
        req.reference_id.as_deref(),
        req.metadata.as_ref(),
    )?;
    Ok(Json(entry))
}

pub async fn trial_stats(
    State(state): State<AppState>,
    Path(device_fingerprint): Path<String>,
) -> Result<Json<TrialStats>, ApiError> {
    let fingerprint = parse_fingerprint(&device_fingerprint)?;
    let stats = state.ledger.stats(&fingerprint)?;
    Ok(Json(stats))
}

// ── License endpoints ────────────────────────────────────────────

/// License payload with the human-entry key rendering alongside the
/// canonical one.
#[derive(Debug, Serialize)]
pub struct LicenseResponse {
    #[serde(flatten)]
    license: License,
    license_key_display: String,
}

impl From<License> for LicenseResponse {
    fn from(license: License) -> Self {
        let license_key_display = format_display(&license.license_key);
        Self {
            license,
            license_key_display,
        }
    }
}

pub async fn license_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let role = role_from(&headers, &state);
    let license = state.authority.generate(role, &req)?;
    Ok(Json(license.into()))
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    license_key: String,
    device_fingerprint: String,
    #[serde(default)]
    hardware_signature: Option<String>,
    #[serde(default = "default_activation_method")]
    activation_method: String,
}

fn default_activation_method() -> String {
    "online".to_string()
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    license: LicenseResponse,
    token: String,
    newly_bound: bool,
}

pub async fn license_activate(
    State(state): State<AppState>,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>, ApiError> {
    let fingerprint = parse_fingerprint(&req.device_fingerprint)?;
    let outcome = state.authority.activate(
        &req.license_key,
        &fingerprint,
        req.hardware_signature.as_deref(),
        &req.activation_method,
    )?;
    Ok(Json(ActivateResponse {
        license: outcome.license.into(),
        token: outcome.token,
        newly_bound: outcome.newly_bound,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Activation token from a prior activation.
    #[serde(default, alias = "jwt_token")]
    token: Option<String>,
    /// Raw license key, accepted as a fallback credential.
    #[serde(default)]
    license_key: Option<String>,
    device_fingerprint: String,
}

/// Always answers 200: a verification refusal is a result, not an
/// error, and the host application must never crash on it.
pub async fn license_verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Json<Verification> {
    let refused = |reason: &str| Verification {
        valid: false,
        reason: Some(reason.to_string()),
        license_type: None,
        status: None,
        expires_at: None,
    };
    let Ok(fingerprint) = DeviceFingerprint::parse(&req.device_fingerprint) else {
        return Json(refused("invalid"));
    };
    let Some(credential) = req.token.as_deref().or(req.license_key.as_deref()) else {
        return Json(refused("invalid"));
    };
    Json(state.authority.verify(credential, &fingerprint))
}

pub async fn license_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(license_key): Path<String>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let role = role_from(&headers, &state);
    let license = state.authority.get(role, &license_key)?;
    Ok(Json(license.into()))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    reason: String,
}

pub async fn license_revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(license_key): Path<String>,
    Json(req): Json<RevokeRequest>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let role = role_from(&headers, &state);
    let license = state.authority.revoke(role, &license_key, &req.reason)?;
    Ok(Json(license.into()))
}

// ── Admin endpoints ──────────────────────────────────────────────

pub async fn admin_trials(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<TrialRecord>>, ApiError> {
    let role = role_from(&headers, &state);
    let trials = state.ledger.list_trials(role, params.to_page())?;
    Ok(Json(trials))
}

pub async fn admin_licenses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<LicenseResponse>>, ApiError> {
    let role = role_from(&headers, &state);
    let licenses = state.authority.list(role, params.to_page())?;
    Ok(Json(licenses.into_iter().map(Into::into).collect()))
}

pub async fn admin_suspicious(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<TrialRecord>>, ApiError> {
    let role = role_from(&headers, &state);
    let trials = state.ledger.list_suspicious(role, params.to_page())?;
    Ok(Json(trials))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    device_fingerprint: String,
    amount: i64,
    #[serde(default = "default_grant_action")]
    action: String,
}

fn default_grant_action() -> String {
    "admin_grant".to_string()
}

pub async fn admin_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GrantRequest>,
) -> Result<Json<TrialRecord>, ApiError> {
    let role = role_from(&headers, &state);
    let fingerprint = parse_fingerprint(&req.device_fingerprint)?;
    let record = state
        .ledger
        .grant_credits(role, &fingerprint, req.amount, &req.action)?;
    Ok(Json(record))
}
