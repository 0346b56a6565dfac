//! Shared state and HTTP router for the Keygate licensing server.

pub mod error;
mod handlers;

use axum::routing::{get, post};
use axum::Router;
use keygate_license::LicenseAuthority;
use keygate_trial::TrialLedger;
use std::sync::Arc;

/// Shared per-request state.
#[derive(Clone)]
pub struct AppState {
    /// Trial credit ledger service.
    pub ledger: Arc<TrialLedger>,
    /// License authority service.
    pub authority: Arc<LicenseAuthority>,
    /// Bearer token that grants the admin role.
    pub admin_token: Arc<String>,
}

impl AppState {
    /// Builds the shared state.
    #[must_use]
    pub fn new(ledger: Arc<TrialLedger>, authority: Arc<LicenseAuthority>, admin_token: String) -> Self {
        Self {
            ledger,
            authority,
            admin_token: Arc::new(admin_token),
        }
    }
}

/// Builds the licensing API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/licensing/trial/check", post(handlers::trial_check))
        .route("/licensing/trial/consume", post(handlers::trial_consume))
        .route(
            "/licensing/trial/stats/{device_fingerprint}",
            get(handlers::trial_stats),
        )
        .route("/licensing/license/generate", post(handlers::license_generate))
        .route("/licensing/license/activate", post(handlers::license_activate))
        .route("/licensing/license/verify", post(handlers::license_verify))
        .route("/licensing/license/{license_key}", get(handlers::license_get))
        .route(
            "/licensing/license/{license_key}/revoke",
            post(handlers::license_revoke),
        )
        .route("/licensing/admin/trials", get(handlers::admin_trials))
        .route("/licensing/admin/licenses", get(handlers::admin_licenses))
        .route("/licensing/admin/suspicious", get(handlers::admin_suspicious))
        .route("/licensing/admin/grant", post(handlers::admin_grant))
        .with_state(state)
}
