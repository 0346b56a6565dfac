//! License records and their state machine.
//!
//! Stored states are PENDING, ACTIVE, REVOKED. EXPIRED is derived at
//! read time from `expires_at` so expiry is never a destructive
//! transition; expired licenses remain inspectable.

use crate::ids::LicenseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commercial tier of a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseType {
    /// Single-seat standard license.
    Standard,
    /// Professional tier.
    Professional,
    /// Enterprise tier.
    Enterprise,
}

impl LicenseType {
    /// Canonical storage string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Professional => "PROFESSIONAL",
            Self::Enterprise => "ENTERPRISE",
        }
    }

    /// Parses the canonical storage string.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "STANDARD" => Some(Self::Standard),
            "PROFESSIONAL" => Some(Self::Professional),
            "ENTERPRISE" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

/// State of a license. `Expired` is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    /// Issued but never activated.
    Pending,
    /// Activated on at least one device.
    Active,
    /// Past `expires_at` (derived at read time).
    Expired,
    /// Terminally revoked by an admin.
    Revoked,
}

impl LicenseStatus {
    /// Canonical storage string. `Expired` is never written.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
        }
    }

    /// Parses the canonical storage string.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "ACTIVE" => Some(Self::Active),
            "EXPIRED" => Some(Self::Expired),
            "REVOKED" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// One device binding of a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseActivation {
    /// Fingerprint of the bound device.
    pub device_fingerprint: String,
    /// Hardware signature reported at activation time.
    pub hardware_signature: Option<String>,
    /// How the activation happened (e.g. "online", "manual").
    pub method: String,
    /// When the device was bound.
    pub activated_at: DateTime<Utc>,
}

/// A purchased license, bound to up to `max_activations` devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Internal identifier.
    pub id: LicenseId,
    /// Canonical 32-character uppercase alphanumeric key.
    pub license_key: String,
    /// Commercial tier.
    pub license_type: LicenseType,
    /// Stored state (Pending, Active, or Revoked).
    pub status: LicenseStatus,
    /// Purchaser email.
    pub customer_email: String,
    /// Purchaser name.
    pub customer_name: Option<String>,
    /// Purchaser company.
    pub company_name: Option<String>,
    /// Devices this license is currently bound to.
    pub activations: Vec<LicenseActivation>,
    /// Number of distinct devices bound so far.
    pub activation_count: i64,
    /// Maximum distinct devices allowed.
    pub max_activations: i64,
    /// When the license was generated.
    pub issued_at: DateTime<Utc>,
    /// First successful activation, if any.
    pub activated_at: Option<DateTime<Utc>>,
    /// Expiry instant; None means perpetual.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the license was revoked, if ever.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Admin-supplied revocation reason.
    pub revoke_reason: Option<String>,
}

impl License {
    /// Returns true if the license is revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.status == LicenseStatus::Revoked
    }

    /// Returns true if `now` is past the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    /// The status as seen by readers: revocation wins, then expiry,
    /// then the stored state.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> LicenseStatus {
        if self.status == LicenseStatus::Revoked {
            LicenseStatus::Revoked
        } else if self.is_expired_at(now) {
            LicenseStatus::Expired
        } else {
            self.status
        }
    }

    /// Returns true if this fingerprint is already bound.
    #[must_use]
    pub fn is_bound_to(&self, fingerprint: &str) -> bool {
        self.activations
            .iter()
            .any(|a| a.device_fingerprint == fingerprint)
    }
}
