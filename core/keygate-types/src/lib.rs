//! Core type definitions for the Keygate trial and licensing engine.
//!
//! Everything the store and service crates share lives here:
//! identifier newtypes, the device fingerprint contract, trial and
//! ledger records, license records, and the actor-role / pagination
//! types used by admin reads.

mod auth;
mod fingerprint;
mod ids;
mod license;
mod trial;

pub use auth::{ActorRole, Page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use fingerprint::{
    DeviceFingerprint, DeviceSignals, FingerprintError, MAX_FINGERPRINT_LEN, MAX_SIGNAL_LEN,
};
pub use ids::{LedgerEntryId, LicenseId, TrialGuestId};
pub use license::{License, LicenseActivation, LicenseStatus, LicenseType};
pub use trial::{CreditLedgerEntry, LedgerEntryType, TrialRecord, TrialStatus};
