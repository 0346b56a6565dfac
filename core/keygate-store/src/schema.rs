//! Schema bootstrap for the Keygate store.
//!
//! Tables:
//! - `trial_records`: one row per (fingerprint, hardware signature)
//! - `credit_ledger`: append-only credit movements
//! - `licenses`: one row per issued license
//! - `license_activations`: one row per bound device

use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trial_records (
    trial_guest_id     TEXT PRIMARY KEY,
    device_fingerprint TEXT NOT NULL,
    hardware_signature TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'ACTIVE',
    credits_allocated  INTEGER NOT NULL,
    credits_used       INTEGER NOT NULL DEFAULT 0
        CHECK (credits_used >= 0 AND credits_used <= credits_allocated),
    is_vm_detected     INTEGER NOT NULL DEFAULT 0,
    is_suspicious      INTEGER NOT NULL DEFAULT 0,
    first_seen_at      TEXT NOT NULL,
    last_seen_at       TEXT NOT NULL,
    trial_started_at   TEXT NOT NULL,
    UNIQUE (device_fingerprint, hardware_signature)
);

CREATE INDEX IF NOT EXISTS idx_trial_fingerprint
    ON trial_records (device_fingerprint);

CREATE INDEX IF NOT EXISTS idx_trial_suspicious
    ON trial_records (is_suspicious) WHERE is_suspicious = 1;

CREATE TABLE IF NOT EXISTS credit_ledger (
    id             TEXT PRIMARY KEY,
    trial_guest_id TEXT NOT NULL REFERENCES trial_records (trial_guest_id),
    entry_type     TEXT NOT NULL,
    amount         INTEGER NOT NULL,
    action         TEXT NOT NULL,
    reference_id   TEXT,
    metadata       TEXT,
    created_at     TEXT NOT NULL,
    UNIQUE (trial_guest_id, reference_id)
);

CREATE INDEX IF NOT EXISTS idx_ledger_trial
    ON credit_ledger (trial_guest_id, created_at);

CREATE TABLE IF NOT EXISTS licenses (
    id               TEXT PRIMARY KEY,
    license_key      TEXT NOT NULL UNIQUE,
    license_type     TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'PENDING',
    customer_email   TEXT NOT NULL,
    customer_name    TEXT,
    company_name     TEXT,
    activation_count INTEGER NOT NULL DEFAULT 0
        CHECK (activation_count >= 0 AND activation_count <= max_activations),
    max_activations  INTEGER NOT NULL,
    issued_at        TEXT NOT NULL,
    activated_at     TEXT,
    expires_at       TEXT,
    revoked_at       TEXT,
    revoke_reason    TEXT
);

CREATE TABLE IF NOT EXISTS license_activations (
    license_id         TEXT NOT NULL REFERENCES licenses (id),
    device_fingerprint TEXT NOT NULL,
    hardware_signature TEXT,
    method             TEXT NOT NULL,
    activated_at       TEXT NOT NULL,
    PRIMARY KEY (license_id, device_fingerprint)
);
";

/// Creates all tables and indexes if they do not exist yet.
pub fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
