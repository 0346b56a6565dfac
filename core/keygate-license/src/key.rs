//! License key generation, normalization, and display formatting.
//!
//! Canonical form is 32 uppercase alphanumeric characters with no
//! separators. Humans see `XXXXXXXX-XXXXXXXX-XXXXXXXX-XXXXXXXX`; the
//! server strips every non-alphanumeric character and upper-cases
//! before lookup, so hyphen placement and case never matter on input.

use crate::error::{LicenseError, LicenseResult};
use rand::Rng;

/// Canonical key length, without separators.
pub const CANONICAL_KEY_LEN: usize = 32;

/// Characters per hyphenated display group.
pub const KEY_GROUP_LEN: usize = 8;

/// Generation alphabet. Excludes 0/O, 1/I/L to keep hand-typed keys
/// unambiguous; normalization still accepts the full alphanumeric set.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generates a fresh canonical key from the given RNG.
#[must_use]
pub fn generate_key<R: Rng>(rng: &mut R) -> String {
    (0..CANONICAL_KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Normalizes user input to canonical form: strips every
/// non-alphanumeric character, upper-cases, and checks the length.
pub fn normalize_key(input: &str) -> LicenseResult<String> {
    let canonical: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if canonical.len() != CANONICAL_KEY_LEN {
        return Err(LicenseError::InvalidKeyFormat(format!(
            "expected {CANONICAL_KEY_LEN} alphanumeric characters, got {}",
            canonical.len()
        )));
    }
    Ok(canonical)
}

/// Renders a canonical key as four hyphenated groups of eight.
#[must_use]
pub fn format_display(canonical: &str) -> String {
    canonical
        .as_bytes()
        .chunks(KEY_GROUP_LEN)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("-")
}
