//! Trial credit ledger and anomaly detection for Keygate.
//!
//! This crate holds:
//! - [`TrialLedger`]: eligibility checks, idempotent credit consumption,
//!   read-only stats, admin grants and listings
//! - [`anomaly`]: pure heuristics producing advisory VM/suspicion flags
//!
//! # Design Principles
//!
//! - **Ledger is truth**: every credit movement is an append-only entry;
//!   the trial record's counters are a materialized view kept in the
//!   same transaction
//! - **Never negative**: consumption is an atomic compare-and-decrement
//!   in the store; the balance cannot go below zero under concurrency
//! - **Retry safe**: callers supply a `reference_id` and duplicated
//!   deliveries return the prior entry instead of double-charging
//! - **Advisory anomalies**: detection annotates, it never blocks on its
//!   own; escalation is a policy switch layered on top

pub mod anomaly;
mod error;
mod ledger;

pub use anomaly::{AnomalyConfig, AnomalyContext, AnomalyReport};
pub use error::{TrialError, TrialResult};
pub use ledger::{Eligibility, TrialConfig, TrialLedger, TrialPolicy, TrialStats};
