use chrono::{Duration, Utc};
use keygate_types::{License, LicenseActivation, LicenseId, LicenseStatus, LicenseType};

fn base_license() -> License {
    License {
        id: LicenseId::new(),
        license_key: "ABCDEFGHJKMNPQRSTUVWXYZ234567892".to_string(),
        license_type: LicenseType::Standard,
        status: LicenseStatus::Pending,
        customer_email: "buyer@example.com".to_string(),
        customer_name: None,
        company_name: None,
        activations: Vec::new(),
        activation_count: 0,
        max_activations: 1,
        issued_at: Utc::now(),
        activated_at: None,
        expires_at: None,
        revoked_at: None,
        revoke_reason: None,
    }
}

// ── Effective status derivation ──────────────────────────────────

#[test]
fn perpetual_pending_stays_pending() {
    let license = base_license();
    assert_eq!(license.effective_status(Utc::now()), LicenseStatus::Pending);
}

#[test]
fn expiry_is_derived_not_stored() {
    let mut license = base_license();
    license.status = LicenseStatus::Active;
    license.expires_at = Some(Utc::now() - Duration::days(1));
    // Stored status is untouched; readers see Expired.
    assert_eq!(license.status, LicenseStatus::Active);
    assert_eq!(license.effective_status(Utc::now()), LicenseStatus::Expired);
}

#[test]
fn future_expiry_is_not_expired() {
    let mut license = base_license();
    license.status = LicenseStatus::Active;
    license.expires_at = Some(Utc::now() + Duration::days(30));
    assert_eq!(license.effective_status(Utc::now()), LicenseStatus::Active);
}

#[test]
fn revocation_wins_over_expiry() {
    let mut license = base_license();
    license.status = LicenseStatus::Revoked;
    license.expires_at = Some(Utc::now() - Duration::days(1));
    assert_eq!(license.effective_status(Utc::now()), LicenseStatus::Revoked);
}

// ── Device binding ───────────────────────────────────────────────

#[test]
fn is_bound_to_matches_activations() {
    let mut license = base_license();
    license.activations.push(LicenseActivation {
        device_fingerprint: "dev-A".to_string(),
        hardware_signature: None,
        method: "online".to_string(),
        activated_at: Utc::now(),
    });
    assert!(license.is_bound_to("dev-A"));
    assert!(!license.is_bound_to("dev-B"));
}

// ── Enum storage strings ─────────────────────────────────────────

#[test]
fn status_storage_roundtrip() {
    for status in [
        LicenseStatus::Pending,
        LicenseStatus::Active,
        LicenseStatus::Expired,
        LicenseStatus::Revoked,
    ] {
        assert_eq!(LicenseStatus::from_str_opt(status.as_str()), Some(status));
    }
    assert_eq!(LicenseStatus::from_str_opt("BOGUS"), None);
}

#[test]
fn type_storage_roundtrip() {
    for tier in [
        LicenseType::Standard,
        LicenseType::Professional,
        LicenseType::Enterprise,
    ] {
        assert_eq!(LicenseType::from_str_opt(tier.as_str()), Some(tier));
    }
}

#[test]
fn status_serde_is_screaming_snake() {
    let json = serde_json::to_string(&LicenseStatus::Revoked).unwrap();
    assert_eq!(json, "\"REVOKED\"");
}
