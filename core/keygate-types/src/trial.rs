//! Trial records and the append-only credit ledger.

use crate::ids::{LedgerEntryId, TrialGuestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a trial record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialStatus {
    /// Trial has credits remaining and may consume.
    Active,
    /// All allocated credits consumed; activation required to continue.
    Exhausted,
    /// Suspended by anomaly policy or admin action; no consumption.
    Suspended,
}

impl TrialStatus {
    /// Returns true if the trial may consume credits.
    #[must_use]
    pub fn can_consume(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Canonical storage string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Exhausted => "EXHAUSTED",
            Self::Suspended => "SUSPENDED",
        }
    }

    /// Parses the canonical storage string.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "EXHAUSTED" => Some(Self::Exhausted),
            "SUSPENDED" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// One trial per (device_fingerprint, hardware_signature) pair.
///
/// `credits_used` is a materialized view over the ledger; the store
/// updates both inside one transaction so they never drift. Records are
/// retained forever for audit and anti-abuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Opaque id issued to the client.
    pub trial_guest_id: TrialGuestId,
    /// The client-computed device fingerprint.
    pub device_fingerprint: String,
    /// The composite hardware signature reported at creation.
    pub hardware_signature: String,
    /// Current lifecycle state.
    pub status: TrialStatus,
    /// Credits allocated at creation (plus any admin grants).
    pub credits_allocated: i64,
    /// Credits consumed so far.
    pub credits_used: i64,
    /// Whether VM heuristics matched this device.
    pub is_vm_detected: bool,
    /// Whether suspicion heuristics flagged this device.
    pub is_suspicious: bool,
    /// First time this device was seen.
    pub first_seen_at: DateTime<Utc>,
    /// Most recent eligibility check or consumption.
    pub last_seen_at: DateTime<Utc>,
    /// When the trial period started.
    pub trial_started_at: DateTime<Utc>,
}

impl TrialRecord {
    /// Credits still available. Never negative.
    #[must_use]
    pub fn credits_remaining(&self) -> i64 {
        self.credits_allocated - self.credits_used
    }
}

/// Kind of a credit ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    /// A billable action consumed one credit (amount −1).
    Consume,
    /// Admin granted additional credits (positive amount).
    Grant,
    /// Admin correction (signed amount).
    Adjust,
}

impl LedgerEntryType {
    /// Canonical storage string for this entry type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consume => "CONSUME",
            Self::Grant => "GRANT",
            Self::Adjust => "ADJUST",
        }
    }

    /// Parses the canonical storage string.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "CONSUME" => Some(Self::Consume),
            "GRANT" => Some(Self::Grant),
            "ADJUST" => Some(Self::Adjust),
            _ => None,
        }
    }
}

/// Immutable record of one credit movement. Append-only; the ledger is
/// the source of truth for a trial's balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    /// Entry identifier.
    pub id: LedgerEntryId,
    /// Trial this entry belongs to.
    pub trial_guest_id: TrialGuestId,
    /// CONSUME, GRANT, or ADJUST.
    pub entry_type: LedgerEntryType,
    /// Signed credit amount (CONSUME is −1).
    pub amount: i64,
    /// Operation name reported by the caller (e.g. "create_invoice").
    pub action: String,
    /// Caller-supplied idempotency key, unique per trial when present.
    pub reference_id: Option<String>,
    /// Optional caller metadata, stored verbatim.
    pub metadata: Option<serde_json::Value>,
    /// When the entry was appended.
    pub created_at: DateTime<Utc>,
}
