//! License persistence and the activation claim transaction.

use crate::error::{StoreError, StoreResult};
use crate::{parse_ts, parse_ts_opt, Store};
use chrono::{DateTime, Utc};
use keygate_types::{License, LicenseActivation, LicenseId, LicenseStatus, LicenseType, Page};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

/// Result of an atomic activation claim.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The device is bound (either just now or from before).
    Bound {
        /// The license after the claim.
        license: License,
        /// False when this device was already bound (idempotent retry).
        newly_bound: bool,
    },
    /// All activation slots taken by other devices.
    LimitReached {
        /// The license's activation ceiling.
        max_activations: i64,
    },
    /// The license is revoked.
    Revoked,
    /// The license is past its expiry instant.
    Expired {
        /// When it expired.
        expires_at: DateTime<Utc>,
    },
    /// No license with this key.
    NotFound,
}

const LICENSE_COLS: &str = "id, license_key, license_type, status, customer_email, \
     customer_name, company_name, activation_count, max_activations, \
     issued_at, activated_at, expires_at, revoked_at, revoke_reason";

impl Store {
    /// Inserts a freshly generated license.
    ///
    /// Returns [`StoreError::Duplicate`] when the key collides with an
    /// existing one; the authority retries with a new key.
    pub fn insert_license(&self, license: &License) -> StoreResult<()> {
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO licenses ({LICENSE_COLS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        );
        conn.execute(
            &sql,
            params![
                license.id.to_string(),
                license.license_key,
                license.license_type.as_str(),
                license.status.as_str(),
                license.customer_email,
                license.customer_name,
                license.company_name,
                license.activation_count,
                license.max_activations,
                license.issued_at.to_rfc3339(),
                license.activated_at.map(|t| t.to_rfc3339()),
                license.expires_at.map(|t| t.to_rfc3339()),
                license.revoked_at.map(|t| t.to_rfc3339()),
                license.revoke_reason,
            ],
        )
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::Duplicate(format!("license key {}", license.license_key))
            } else {
                e.into()
            }
        })?;
        info!(key = %license.license_key, "license inserted");
        Ok(())
    }

    /// Looks up a license by canonical key, with its device bindings.
    pub fn license_by_key(&self, canonical_key: &str) -> StoreResult<Option<License>> {
        let conn = self.lock()?;
        license_by_key_on(&conn, canonical_key)
    }

    /// Atomically claims an activation slot for a device.
    ///
    /// Revocation, expiry, the already-bound check, and the slot count
    /// check all run against current rows inside one immediate
    /// transaction; two racers at the last slot cannot both bind.
    pub fn claim_activation(
        &self,
        canonical_key: &str,
        fingerprint: &str,
        hardware_signature: Option<&str>,
        method: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(license) = license_by_key_on(&tx, canonical_key)? else {
            return Ok(ClaimOutcome::NotFound);
        };
        if license.is_revoked() {
            return Ok(ClaimOutcome::Revoked);
        }
        if license.is_expired_at(now) {
            // expires_at is Some whenever is_expired_at holds.
            let expires_at = license.expires_at.unwrap_or(now);
            return Ok(ClaimOutcome::Expired { expires_at });
        }
        if license.is_bound_to(fingerprint) {
            debug!(key = canonical_key, "device already bound, idempotent claim");
            return Ok(ClaimOutcome::Bound {
                license,
                newly_bound: false,
            });
        }
        if license.activation_count >= license.max_activations {
            return Ok(ClaimOutcome::LimitReached {
                max_activations: license.max_activations,
            });
        }

        tx.execute(
            "INSERT INTO license_activations \
             (license_id, device_fingerprint, hardware_signature, method, activated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                license.id.to_string(),
                fingerprint,
                hardware_signature,
                method,
                now.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE licenses \
             SET activation_count = activation_count + 1, \
                 status = 'ACTIVE', \
                 activated_at = COALESCE(activated_at, ?2) \
             WHERE id = ?1",
            params![license.id.to_string(), now.to_rfc3339()],
        )?;

        let license = license_by_key_on(&tx, canonical_key)?
            .ok_or_else(|| StoreError::Corrupt("license vanished mid-transaction".into()))?;
        tx.commit()?;
        info!(key = canonical_key, count = license.activation_count, "device bound");
        Ok(ClaimOutcome::Bound {
            license,
            newly_bound: true,
        })
    }

    /// Marks a license revoked. Returns the updated license, or None if
    /// the key is unknown. Idempotent: revoking twice keeps the first
    /// revocation's timestamp and reason.
    pub fn revoke_license(
        &self,
        canonical_key: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<License>> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE licenses \
             SET status = 'REVOKED', \
                 revoked_at = COALESCE(revoked_at, ?2), \
                 revoke_reason = COALESCE(revoke_reason, ?3) \
             WHERE license_key = ?1",
            params![canonical_key, now.to_rfc3339(), reason],
        )?;
        license_by_key_on(&conn, canonical_key)
    }

    /// Pages through all licenses, newest first.
    pub fn list_licenses(&self, page: Page) -> StoreResult<Vec<License>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {LICENSE_COLS} FROM licenses \
             ORDER BY issued_at DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![page.limit(), page.offset()], license_row)?;
        let mut raws = Vec::new();
        for raw in rows {
            raws.push(raw?);
        }
        drop(stmt);
        let mut licenses = Vec::new();
        for raw in raws {
            let mut license = raw_to_license(raw)?;
            license.activations = activations_on(&conn, &license.id.to_string())?;
            licenses.push(license);
        }
        Ok(licenses)
    }
}

fn license_by_key_on(conn: &Connection, canonical_key: &str) -> StoreResult<Option<License>> {
    let sql = format!("SELECT {LICENSE_COLS} FROM licenses WHERE license_key = ?1");
    let raw = conn
        .query_row(&sql, params![canonical_key], license_row)
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut license = raw_to_license(raw)?;
    license.activations = activations_on(conn, &license.id.to_string())?;
    Ok(Some(license))
}

fn activations_on(conn: &Connection, license_id: &str) -> StoreResult<Vec<LicenseActivation>> {
    let mut stmt = conn.prepare(
        "SELECT device_fingerprint, hardware_signature, method, activated_at \
         FROM license_activations WHERE license_id = ?1 ORDER BY activated_at",
    )?;
    let rows = stmt.query_map(params![license_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut activations = Vec::new();
    for raw in rows {
        let (fp, hw, method, at) = raw?;
        activations.push(LicenseActivation {
            device_fingerprint: fp,
            hardware_signature: hw,
            method,
            activated_at: parse_ts(&at)?,
        });
    }
    Ok(activations)
}

type RawLicense = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn license_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLicense> {
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
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

fn raw_to_license(raw: RawLicense) -> StoreResult<License> {
    let (
        id,
        key,
        kind,
        status,
        email,
        name,
        company,
        count,
        max,
        issued,
        activated,
        expires,
        revoked,
        reason,
    ) = raw;
    Ok(License {
        id: LicenseId::parse(&id)
            .map_err(|e| StoreError::Corrupt(format!("bad license id {id:?}: {e}")))?,
        license_key: key,
        license_type: LicenseType::from_str_opt(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("bad license type {kind:?}")))?,
        status: LicenseStatus::from_str_opt(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("bad license status {status:?}")))?,
        customer_email: email,
        customer_name: name,
        company_name: company,
        activations: Vec::new(),
        activation_count: count,
        max_activations: max,
        issued_at: parse_ts(&issued)?,
        activated_at: parse_ts_opt(activated)?,
        expires_at: parse_ts_opt(expires)?,
        revoked_at: parse_ts_opt(revoked)?,
        revoke_reason: reason,
    })
}
