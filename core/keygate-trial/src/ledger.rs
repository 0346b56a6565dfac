//! The trial ledger service.

use crate::anomaly::{self, AnomalyConfig, AnomalyContext, AnomalyReport};
use crate::error::{TrialError, TrialResult};
use chrono::{Duration, Utc};
use keygate_store::{ConsumeOutcome, GrantOutcome, Store};
use keygate_types::{
    ActorRole, CreditLedgerEntry, DeviceFingerprint, DeviceSignals, Page, TrialGuestId,
    TrialRecord, TrialStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Trial ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Credits allocated to a newly created trial.
    pub credits_allocated: i64,
    /// Ledger entries returned by the stats read.
    pub recent_entries_limit: u32,
    /// Escalation policy layered over the anomaly detector.
    pub policy: TrialPolicy,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            credits_allocated: 50,
            recent_entries_limit: 20,
            policy: TrialPolicy::default(),
        }
    }
}

/// What the service does with anomaly findings beyond annotation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrialPolicy {
    /// Suspend an active trial as soon as suspicion heuristics fire.
    /// Off by default: detection stays advisory unless ops opts in.
    pub auto_suspend_suspicious: bool,
}

/// Outcome of an eligibility check, shaped for the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eligibility {
    /// Whether the trial may consume credits right now.
    pub eligible: bool,
    /// Machine-readable refusal reason, when not eligible.
    pub reason: Option<String>,
    /// Human-readable summary.
    pub message: String,
    /// Opaque id the client stores and reports back.
    pub trial_guest_id: Option<TrialGuestId>,
    /// Balance after this check.
    pub credits_remaining: Option<i64>,
    /// Current trial status.
    pub status: TrialStatus,
    /// True once the trial is exhausted and a license is the way forward.
    pub requires_activation: bool,
    /// Advisory VM flag.
    pub is_vm_detected: bool,
    /// Advisory suspicion flag.
    pub is_suspicious: bool,
}

/// Read-only trial snapshot with recent ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialStats {
    /// The trial record.
    #[serde(flatten)]
    pub record: TrialRecord,
    /// Balance derived from the record.
    pub credits_remaining: i64,
    /// Recent ledger entries, newest first.
    pub credit_ledger: Vec<CreditLedgerEntry>,
}

/// The trial credit ledger service.
///
/// Owns eligibility, consumption, stats, and the admin reads over trial
/// records. All state lives in the injected [`Store`].
pub struct TrialLedger {
    store: Arc<Store>,
    config: TrialConfig,
    anomaly: AnomalyConfig,
}

impl TrialLedger {
    /// Builds a ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<Store>, config: TrialConfig, anomaly: AnomalyConfig) -> Self {
        Self {
            store,
            config,
            anomaly,
        }
    }

    /// Checks (and on first sight, establishes) trial eligibility for a
    /// device. Touches `last_seen_at` and refreshes anomaly annotation
    /// on every call.
    pub fn check_eligibility(
        &self,
        fingerprint: &DeviceFingerprint,
        signals: &DeviceSignals,
    ) -> TrialResult<Eligibility> {
        signals.validate()?;
        let now = Utc::now();

        let existing = self
            .store
            .trial_by_pair(fingerprint.as_str(), &signals.hardware_signature)?;

        let record = match existing {
            Some(record) => {
                self.store.touch_last_seen(record.trial_guest_id, now)?;
                let report = self.assess(signals, &record)?;
                self.annotate(&record, &report)?;
                let status = self.escalate(&record, &report)?;
                TrialRecord {
                    status,
                    last_seen_at: now,
                    is_vm_detected: record.is_vm_detected || report.vm_detected,
                    is_suspicious: record.is_suspicious || report.suspicious,
                    ..record
                }
            }
            None => self.create_trial(fingerprint, signals)?,
        };

        Ok(self.eligibility_of(&record))
    }

    /// Consumes one credit for a billable action.
    ///
    /// Consumption reports only the fingerprint, so when a fingerprint
    /// has trials under several hardware signatures the charge goes to
    /// the newest trial (latest `first_seen_at`), matching what the
    /// most recent eligibility check established.
    ///
    /// Passing the same `reference_id` twice returns the original entry
    /// without a second charge.
    pub fn consume_credit(
        &self,
        fingerprint: &DeviceFingerprint,
        action: &str,
        reference_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> TrialResult<CreditLedgerEntry> {
        let now = Utc::now();
        let outcome = self.store.consume_credit(
            fingerprint.as_str(),
            action,
            reference_id,
            metadata,
            now,
        )?;

        match outcome {
            ConsumeOutcome::Applied { entry, record } => {
                info!(
                    fingerprint = fingerprint.as_str(),
                    action,
                    remaining = record.credits_remaining(),
                    "credit consumed"
                );
                // Velocity can only be re-assessed after the append.
                let window = Duration::seconds(self.anomaly.velocity_window_secs);
                let consumes = self
                    .store
                    .consumes_since(record.trial_guest_id, now - window)?;
                let report = anomaly::assess_velocity(consumes, &self.anomaly);
                if report.suspicious {
                    self.annotate(&record, &report)?;
                    self.escalate(&record, &report)?;
                }
                Ok(entry)
            }
            ConsumeOutcome::Duplicate { entry, .. } => Ok(entry),
            ConsumeOutcome::InsufficientCredits => Err(TrialError::InsufficientCredits),
            ConsumeOutcome::NotActive(status) => Err(TrialError::NotEligible(format!(
                "trial is {}",
                status.as_str()
            ))),
            ConsumeOutcome::NotFound => {
                Err(TrialError::NotEligible("no trial for this device".into()))
            }
        }
    }

    /// Read-only snapshot of a trial and its recent ledger. Does not
    /// touch `last_seen_at`; observation is not usage.
    pub fn stats(&self, fingerprint: &DeviceFingerprint) -> TrialResult<TrialStats> {
        let record = self
            .store
            .trial_by_fingerprint(fingerprint.as_str())?
            .ok_or(TrialError::NotFound)?;
        let credit_ledger = self
            .store
            .recent_entries(record.trial_guest_id, self.config.recent_entries_limit)?;
        Ok(TrialStats {
            credits_remaining: record.credits_remaining(),
            record,
            credit_ledger,
        })
    }

    /// Grants extra credits to a trial (admin support action). Re-opens
    /// an exhausted trial when the balance becomes positive.
    pub fn grant_credits(
        &self,
        role: ActorRole,
        fingerprint: &DeviceFingerprint,
        amount: i64,
        action: &str,
    ) -> TrialResult<TrialRecord> {
        if !role.is_admin() {
            return Err(TrialError::Forbidden);
        }
        if amount <= 0 {
            return Err(TrialError::InvalidGrantAmount);
        }
        match self
            .store
            .grant_credits(fingerprint.as_str(), amount, action, Utc::now())?
        {
            GrantOutcome::Applied { record, .. } => {
                info!(
                    fingerprint = fingerprint.as_str(),
                    amount, "credits granted"
                );
                Ok(record)
            }
            GrantOutcome::NotFound => Err(TrialError::NotFound),
        }
    }

    /// Pages through all trials (admin read).
    pub fn list_trials(&self, role: ActorRole, page: Page) -> TrialResult<Vec<TrialRecord>> {
        if !role.is_admin() {
            return Err(TrialError::Forbidden);
        }
        Ok(self.store.list_trials(page)?)
    }

    /// Pages through anomaly-flagged trials (admin read).
    pub fn list_suspicious(&self, role: ActorRole, page: Page) -> TrialResult<Vec<TrialRecord>> {
        if !role.is_admin() {
            return Err(TrialError::Forbidden);
        }
        Ok(self.store.list_suspicious_trials(page)?)
    }

    fn create_trial(
        &self,
        fingerprint: &DeviceFingerprint,
        signals: &DeviceSignals,
    ) -> TrialResult<TrialRecord> {
        let now = Utc::now();
        let prefix = anomaly::signature_prefix(&signals.hardware_signature, &self.anomaly);
        let context = AnomalyContext {
            sibling_trials: self.store.trials_with_signature_prefix(prefix)?,
            consumes_in_window: 0,
        };
        let report = anomaly::assess(signals, &context, &self.anomaly);

        let record = TrialRecord {
            trial_guest_id: TrialGuestId::new(),
            device_fingerprint: fingerprint.as_str().to_string(),
            hardware_signature: signals.hardware_signature.clone(),
            status: TrialStatus::Active,
            credits_allocated: self.config.credits_allocated,
            credits_used: 0,
            is_vm_detected: report.vm_detected,
            is_suspicious: report.suspicious,
            first_seen_at: now,
            last_seen_at: now,
            trial_started_at: now,
        };
        self.store.insert_trial(&record)?;
        info!(
            fingerprint = fingerprint.as_str(),
            guest = %record.trial_guest_id,
            credits = record.credits_allocated,
            vm = report.vm_detected,
            suspicious = report.suspicious,
            "trial created"
        );
        if !report.reasons.is_empty() {
            warn!(guest = %record.trial_guest_id, reasons = ?report.reasons, "anomaly flags at creation");
        }
        Ok(record)
    }

    fn assess(&self, signals: &DeviceSignals, record: &TrialRecord) -> TrialResult<AnomalyReport> {
        let prefix = anomaly::signature_prefix(&record.hardware_signature, &self.anomaly);
        let window = Duration::seconds(self.anomaly.velocity_window_secs);
        let context = AnomalyContext {
            sibling_trials: self.store.trials_with_signature_prefix(prefix)?,
            consumes_in_window: self
                .store
                .consumes_since(record.trial_guest_id, Utc::now() - window)?,
        };
        Ok(anomaly::assess(signals, &context, &self.anomaly))
    }

    fn annotate(&self, record: &TrialRecord, report: &AnomalyReport) -> TrialResult<()> {
        if report.vm_detected || report.suspicious {
            self.store
                .set_anomaly_flags(record.trial_guest_id, report.vm_detected, report.suspicious)?;
            warn!(guest = %record.trial_guest_id, reasons = ?report.reasons, "anomaly flags updated");
        }
        Ok(())
    }

    /// Applies the escalation policy, returning the trial's status after
    /// any transition.
    fn escalate(&self, record: &TrialRecord, report: &AnomalyReport) -> TrialResult<TrialStatus> {
        if self.config.policy.auto_suspend_suspicious
            && report.suspicious
            && record.status == TrialStatus::Active
        {
            self.store
                .set_trial_status(record.trial_guest_id, TrialStatus::Suspended)?;
            warn!(guest = %record.trial_guest_id, "trial auto-suspended by policy");
            return Ok(TrialStatus::Suspended);
        }
        Ok(record.status)
    }

    fn eligibility_of(&self, record: &TrialRecord) -> Eligibility {
        let remaining = record.credits_remaining();
        match record.status {
            TrialStatus::Active => Eligibility {
                eligible: true,
                reason: None,
                message: format!("trial active, {remaining} credits remaining"),
                trial_guest_id: Some(record.trial_guest_id),
                credits_remaining: Some(remaining),
                status: record.status,
                requires_activation: false,
                is_vm_detected: record.is_vm_detected,
                is_suspicious: record.is_suspicious,
            },
            TrialStatus::Exhausted => Eligibility {
                eligible: false,
                reason: Some("trial_exhausted".into()),
                message: "trial credits exhausted; activate a license to continue".into(),
                trial_guest_id: Some(record.trial_guest_id),
                credits_remaining: Some(0),
                status: record.status,
                requires_activation: true,
                is_vm_detected: record.is_vm_detected,
                is_suspicious: record.is_suspicious,
            },
            TrialStatus::Suspended => Eligibility {
                eligible: false,
                reason: Some("trial_suspended".into()),
                message: "trial suspended; contact support".into(),
                trial_guest_id: Some(record.trial_guest_id),
                credits_remaining: Some(remaining),
                status: record.status,
                requires_activation: false,
                is_vm_detected: record.is_vm_detected,
                is_suspicious: record.is_suspicious,
            },
        }
    }
}
