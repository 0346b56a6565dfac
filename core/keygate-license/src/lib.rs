//! License authority for Keygate.
//!
//! This crate handles:
//! - License key generation, normalization, and display formatting
//! - Device-bound activation with an activation-count ceiling
//! - Ed25519-signed activation tokens
//! - Fail-closed verification and immediate revocation
//!
//! # Design Principles
//!
//! - **Fail closed**: `verify` never errors to the caller; any ambiguity
//!   or internal failure is reported as not valid
//! - **Revocation is live**: every verification reads the store, so a
//!   revoked license is refused on the very next call
//! - **Idempotent activation**: re-activating an already-bound device
//!   succeeds without consuming another slot
//!
//! # License Key Format
//!
//! Keys are 32 canonical uppercase alphanumeric characters, shown to
//! humans as four hyphenated groups of eight. Lookups normalize by
//! stripping separators and upper-casing.

mod authority;
mod error;
mod key;
mod token;

pub use authority::{
    ActivationOutcome, GenerateRequest, LicenseAuthority, Verification, KEY_GENERATION_ATTEMPTS,
};
pub use error::{LicenseError, LicenseResult};
pub use key::{format_display, generate_key, normalize_key, CANONICAL_KEY_LEN, KEY_GROUP_LEN};
pub use token::{ActivationToken, TokenPayload};
