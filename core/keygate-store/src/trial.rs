//! Trial record and credit ledger persistence.
//!
//! `consume_credit` is the hot spot: the balance check, idempotency
//! lookup, counter update, and ledger append all happen inside one
//! immediate transaction so concurrent callers can never both spend the
//! last credit.

use crate::error::{StoreError, StoreResult};
use crate::{parse_ts, Store};
use chrono::{DateTime, Utc};
use keygate_types::{
    CreditLedgerEntry, LedgerEntryId, LedgerEntryType, Page, TrialGuestId, TrialRecord,
    TrialStatus,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

/// Result of an atomic credit consumption attempt.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// A credit was consumed and the ledger entry appended.
    Applied {
        /// The appended CONSUME entry.
        entry: CreditLedgerEntry,
        /// The trial record after the decrement.
        record: TrialRecord,
    },
    /// The reference id was already processed; nothing changed.
    Duplicate {
        /// The previously appended entry.
        entry: CreditLedgerEntry,
        /// The unchanged trial record.
        record: TrialRecord,
    },
    /// No credits remaining (the trial is or just became EXHAUSTED).
    InsufficientCredits,
    /// The trial is suspended; consumption is refused outright.
    NotActive(TrialStatus),
    /// No trial record for this fingerprint.
    NotFound,
}

/// Result of an admin credit grant.
#[derive(Debug)]
pub enum GrantOutcome {
    /// Credits were granted.
    Applied {
        /// The trial record after the grant.
        record: TrialRecord,
        /// The appended GRANT entry.
        entry: CreditLedgerEntry,
    },
    /// No trial record for this fingerprint.
    NotFound,
}

const TRIAL_COLS: &str = "trial_guest_id, device_fingerprint, hardware_signature, status, \
     credits_allocated, credits_used, is_vm_detected, is_suspicious, \
     first_seen_at, last_seen_at, trial_started_at";

const ENTRY_COLS: &str =
    "id, trial_guest_id, entry_type, amount, action, reference_id, metadata, created_at";

impl Store {
    /// Looks up a trial by its exact (fingerprint, hardware signature) pair.
    pub fn trial_by_pair(
        &self,
        fingerprint: &str,
        hardware_signature: &str,
    ) -> StoreResult<Option<TrialRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {TRIAL_COLS} FROM trial_records \
             WHERE device_fingerprint = ?1 AND hardware_signature = ?2"
        );
        conn.query_row(&sql, params![fingerprint, hardware_signature], trial_row)
            .optional()?
            .map(raw_to_trial)
            .transpose()
    }

    /// Looks up the most recent trial for a fingerprint.
    pub fn trial_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<TrialRecord>> {
        let conn = self.lock()?;
        trial_by_fingerprint_on(&conn, fingerprint)
    }

    /// Inserts a freshly created trial record.
    pub fn insert_trial(&self, record: &TrialRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO trial_records ({TRIAL_COLS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        );
        conn.execute(
            &sql,
            params![
                record.trial_guest_id.to_string(),
                record.device_fingerprint,
                record.hardware_signature,
                record.status.as_str(),
                record.credits_allocated,
                record.credits_used,
                record.is_vm_detected,
                record.is_suspicious,
                record.first_seen_at.to_rfc3339(),
                record.last_seen_at.to_rfc3339(),
                record.trial_started_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::Duplicate(format!(
                    "trial for ({}, {})",
                    record.device_fingerprint, record.hardware_signature
                ))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    /// Updates `last_seen_at` for a trial (eligibility-check side effect).
    pub fn touch_last_seen(
        &self,
        guest: TrialGuestId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE trial_records SET last_seen_at = ?2 WHERE trial_guest_id = ?1",
            params![guest.to_string(), now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Persists anomaly annotation flags. Flags only ratchet upward so a
    /// later clean check never clears a previous detection.
    pub fn set_anomaly_flags(
        &self,
        guest: TrialGuestId,
        vm_detected: bool,
        suspicious: bool,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE trial_records \
             SET is_vm_detected = MAX(is_vm_detected, ?2), \
                 is_suspicious = MAX(is_suspicious, ?3) \
             WHERE trial_guest_id = ?1",
            params![guest.to_string(), vm_detected, suspicious],
        )?;
        Ok(())
    }

    /// Sets the trial status (anomaly escalation or admin action).
    pub fn set_trial_status(&self, guest: TrialGuestId, status: TrialStatus) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE trial_records SET status = ?2 WHERE trial_guest_id = ?1",
            params![guest.to_string(), status.as_str()],
        )?;
        Ok(())
    }

    /// Atomically consumes one credit for the trial behind `fingerprint`.
    ///
    /// The whole read-check-write runs inside a single immediate
    /// transaction. A supplied `reference_id` that was already processed
    /// short-circuits to [`ConsumeOutcome::Duplicate`] without touching
    /// the balance.
    pub fn consume_credit(
        &self,
        fingerprint: &str,
        action: &str,
        reference_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(record) = trial_by_fingerprint_on(&tx, fingerprint)? else {
            return Ok(ConsumeOutcome::NotFound);
        };
        // EXHAUSTED is not short-circuited here: it falls through to the
        // guarded update below and reports InsufficientCredits.
        if record.status == TrialStatus::Suspended {
            return Ok(ConsumeOutcome::NotActive(record.status));
        }

        let guest = record.trial_guest_id.to_string();

        if let Some(ref_id) = reference_id {
            let sql = format!(
                "SELECT {ENTRY_COLS} FROM credit_ledger \
                 WHERE trial_guest_id = ?1 AND reference_id = ?2"
            );
            if let Some(raw) = tx
                .query_row(&sql, params![guest, ref_id], entry_row)
                .optional()?
            {
                debug!(reference_id = ref_id, "duplicate consume, returning prior entry");
                return Ok(ConsumeOutcome::Duplicate {
                    entry: raw_to_entry(raw)?,
                    record,
                });
            }
        }

        // Compare-and-decrement: the WHERE clause refuses the update when
        // no credits remain, so the balance can never go negative.
        let updated = tx.execute(
            "UPDATE trial_records \
             SET credits_used = credits_used + 1, \
                 status = CASE WHEN credits_used + 1 >= credits_allocated \
                               THEN 'EXHAUSTED' ELSE status END, \
                 last_seen_at = ?2 \
             WHERE trial_guest_id = ?1 \
               AND status = 'ACTIVE' \
               AND credits_used < credits_allocated",
            params![guest, now.to_rfc3339()],
        )?;
        if updated == 0 {
            return Ok(ConsumeOutcome::InsufficientCredits);
        }

        let entry = CreditLedgerEntry {
            id: LedgerEntryId::new(),
            trial_guest_id: record.trial_guest_id,
            entry_type: LedgerEntryType::Consume,
            amount: -1,
            action: action.to_string(),
            reference_id: reference_id.map(str::to_string),
            metadata: metadata.cloned(),
            created_at: now,
        };
        insert_entry_on(&tx, &entry)?;

        let record = trial_by_fingerprint_on(&tx, fingerprint)?
            .ok_or_else(|| StoreError::Corrupt("trial vanished mid-transaction".into()))?;
        tx.commit()?;
        Ok(ConsumeOutcome::Applied { entry, record })
    }

    /// Grants additional credits to a trial (admin support action).
    ///
    /// Raises `credits_allocated`, appends a GRANT entry, and re-opens
    /// an EXHAUSTED trial whose balance becomes positive. Suspended
    /// trials stay suspended.
    pub fn grant_credits(
        &self,
        fingerprint: &str,
        amount: i64,
        action: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<GrantOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(record) = trial_by_fingerprint_on(&tx, fingerprint)? else {
            return Ok(GrantOutcome::NotFound);
        };
        let guest = record.trial_guest_id.to_string();

        tx.execute(
            "UPDATE trial_records \
             SET credits_allocated = credits_allocated + ?2, \
                 status = CASE WHEN status = 'EXHAUSTED' \
                                AND credits_used < credits_allocated + ?2 \
                               THEN 'ACTIVE' ELSE status END \
             WHERE trial_guest_id = ?1",
            params![guest, amount],
        )?;

        let entry = CreditLedgerEntry {
            id: LedgerEntryId::new(),
            trial_guest_id: record.trial_guest_id,
            entry_type: LedgerEntryType::Grant,
            amount,
            action: action.to_string(),
            reference_id: None,
            metadata: None,
            created_at: now,
        };
        insert_entry_on(&tx, &entry)?;

        let record = trial_by_fingerprint_on(&tx, fingerprint)?
            .ok_or_else(|| StoreError::Corrupt("trial vanished mid-transaction".into()))?;
        tx.commit()?;
        Ok(GrantOutcome::Applied { record, entry })
    }

    /// Most recent ledger entries for a trial, newest first.
    pub fn recent_entries(
        &self,
        guest: TrialGuestId,
        limit: u32,
    ) -> StoreResult<Vec<CreditLedgerEntry>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {ENTRY_COLS} FROM credit_ledger \
             WHERE trial_guest_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![guest.to_string(), limit], entry_row)?;
        let mut entries = Vec::new();
        for raw in rows {
            entries.push(raw_to_entry(raw?)?);
        }
        Ok(entries)
    }

    /// Counts CONSUME entries for a trial since an instant (velocity input).
    pub fn consumes_since(
        &self,
        guest: TrialGuestId,
        since: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let conn = self.lock()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM credit_ledger \
             WHERE trial_guest_id = ?1 AND entry_type = 'CONSUME' AND created_at >= ?2",
            params![guest.to_string(), since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Counts distinct trials whose hardware signature starts with `prefix`
    /// (fingerprint-reuse input for the anomaly detector).
    pub fn trials_with_signature_prefix(&self, prefix: &str) -> StoreResult<u32> {
        let conn = self.lock()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(DISTINCT trial_guest_id) FROM trial_records \
             WHERE substr(hardware_signature, 1, ?2) = ?1",
            // SQLite substr counts characters, not bytes.
            params![prefix, prefix.chars().count() as i64],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Pages through all trial records, newest first.
    pub fn list_trials(&self, page: Page) -> StoreResult<Vec<TrialRecord>> {
        self.list_trials_where("1 = 1", page)
    }

    /// Pages through trials flagged by the anomaly detector.
    pub fn list_suspicious_trials(&self, page: Page) -> StoreResult<Vec<TrialRecord>> {
        self.list_trials_where("is_suspicious = 1 OR is_vm_detected = 1", page)
    }

    fn list_trials_where(&self, filter: &str, page: Page) -> StoreResult<Vec<TrialRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {TRIAL_COLS} FROM trial_records WHERE {filter} \
             ORDER BY first_seen_at DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![page.limit(), page.offset()], trial_row)?;
        let mut records = Vec::new();
        for raw in rows {
            records.push(raw_to_trial(raw?)?);
        }
        Ok(records)
    }
}

fn trial_by_fingerprint_on(
    conn: &Connection,
    fingerprint: &str,
) -> StoreResult<Option<TrialRecord>> {
    let sql = format!(
        "SELECT {TRIAL_COLS} FROM trial_records \
         WHERE device_fingerprint = ?1 \
         ORDER BY first_seen_at DESC LIMIT 1"
    );
    conn.query_row(&sql, params![fingerprint], trial_row)
        .optional()?
        .map(raw_to_trial)
        .transpose()
}

fn insert_entry_on(conn: &Connection, entry: &CreditLedgerEntry) -> StoreResult<()> {
    let metadata = entry
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let sql = format!(
        "INSERT INTO credit_ledger ({ENTRY_COLS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    );
    conn.execute(
        &sql,
        params![
            entry.id.to_string(),
            entry.trial_guest_id.to_string(),
            entry.entry_type.as_str(),
            entry.amount,
            entry.action,
            entry.reference_id,
            metadata,
            entry.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| {
        if StoreError::is_unique_violation(&e) {
            StoreError::Duplicate(format!("ledger reference {:?}", entry.reference_id))
        } else {
            e.into()
        }
    })?;
    Ok(())
}

// Raw row tuples, converted to domain types outside the rusqlite closure
// so parse failures surface as StoreError::Corrupt.

type RawTrial = (
    String,
    String,
    String,
    String,
    i64,
    i64,
    bool,
    bool,
    String,
    String,
    String,
);

fn trial_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTrial> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn raw_to_trial(raw: RawTrial) -> StoreResult<TrialRecord> {
    let (guest, fp, hw, status, allocated, used, vm, sus, first, last, started) = raw;
    Ok(TrialRecord {
        trial_guest_id: TrialGuestId::parse(&guest)
            .map_err(|e| StoreError::Corrupt(format!("bad trial guest id {guest:?}: {e}")))?,
        device_fingerprint: fp,
        hardware_signature: hw,
        status: TrialStatus::from_str_opt(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("bad trial status {status:?}")))?,
        credits_allocated: allocated,
        credits_used: used,
        is_vm_detected: vm,
        is_suspicious: sus,
        first_seen_at: parse_ts(&first)?,
        last_seen_at: parse_ts(&last)?,
        trial_started_at: parse_ts(&started)?,
    })
}

type RawEntry = (
    String,
    String,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn raw_to_entry(raw: RawEntry) -> StoreResult<CreditLedgerEntry> {
    let (id, guest, kind, amount, action, reference_id, metadata, created) = raw;
    Ok(CreditLedgerEntry {
        id: LedgerEntryId::parse(&id)
            .map_err(|e| StoreError::Corrupt(format!("bad ledger entry id {id:?}: {e}")))?,
        trial_guest_id: TrialGuestId::parse(&guest)
            .map_err(|e| StoreError::Corrupt(format!("bad trial guest id {guest:?}: {e}")))?,
        entry_type: LedgerEntryType::from_str_opt(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("bad entry type {kind:?}")))?,
        amount,
        action,
        reference_id,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        created_at: parse_ts(&created)?,
    })
}
