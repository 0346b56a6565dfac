//! The device fingerprint contract.
//!
//! The fingerprint is computed by the untrusted client from hardware
//! signals and supplied to the server as an opaque string. The server
//! never recomputes it; it only validates shape. Client-asserted fields
//! in [`DeviceSignals`] (platform, hostname) are anomaly-detection
//! inputs, never authorization evidence.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum accepted fingerprint length.
pub const MAX_FINGERPRINT_LEN: usize = 128;

/// Maximum accepted length for any free-text device signal.
pub const MAX_SIGNAL_LEN: usize = 256;

/// Errors produced by fingerprint shape validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    /// Fingerprint is empty.
    #[error("device fingerprint is empty")]
    Empty,

    /// Fingerprint exceeds the accepted length bound.
    #[error("device fingerprint length {0} exceeds {MAX_FINGERPRINT_LEN}")]
    Length(usize),

    /// Fingerprint contains a character outside the hash alphabet.
    #[error("device fingerprint contains invalid character {0:?}")]
    InvalidChar(char),

    /// A device signal exceeds the accepted length.
    #[error("device signal '{0}' exceeds {MAX_SIGNAL_LEN} characters")]
    SignalTooLong(&'static str),
}

/// A shape-validated device fingerprint.
///
/// Accepts the character set common to hex and base64url hash
/// renderings: ASCII alphanumerics plus `+ / = _ -`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    /// Validates and wraps a raw fingerprint string.
    ///
    /// Leading and trailing whitespace is stripped before validation.
    pub fn parse(raw: &str) -> Result<Self, FingerprintError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FingerprintError::Empty);
        }
        if raw.len() > MAX_FINGERPRINT_LEN {
            return Err(FingerprintError::Length(raw.len()));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '+' | '/' | '=' | '_' | '-'))
        {
            return Err(FingerprintError::InvalidChar(c));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceFingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceFingerprint> for String {
    fn from(fp: DeviceFingerprint) -> Self {
        fp.0
    }
}

/// Raw hardware signals reported by the client alongside its fingerprint.
///
/// Only `hardware_signature` is required; everything else is best-effort
/// and feeds the anomaly detector (missing serials on physical hardware
/// are themselves a signal).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignals {
    /// Composite hardware signature computed by the client.
    pub hardware_signature: String,
    /// Reported platform string (e.g. "win32", "darwin").
    #[serde(default)]
    pub platform: Option<String>,
    /// Reported hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Reported CPU model string.
    #[serde(default)]
    pub cpu_model: Option<String>,
    /// Hash of the primary MAC address.
    #[serde(default)]
    pub mac_hash: Option<String>,
    /// Primary disk serial, when the client could read one.
    #[serde(default)]
    pub disk_serial: Option<String>,
    /// SMBIOS / system UUID, when the client could read one.
    #[serde(default)]
    pub system_uuid: Option<String>,
}

impl DeviceSignals {
    /// Validates length bounds on every reported signal.
    pub fn validate(&self) -> Result<(), FingerprintError> {
        let fields: [(&'static str, Option<&str>); 7] = [
            ("hardware_signature", Some(self.hardware_signature.as_str())),
            ("platform", self.platform.as_deref()),
            ("hostname", self.hostname.as_deref()),
            ("cpu_model", self.cpu_model.as_deref()),
            ("mac_hash", self.mac_hash.as_deref()),
            ("disk_serial", self.disk_serial.as_deref()),
            ("system_uuid", self.system_uuid.as_deref()),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                if v.len() > MAX_SIGNAL_LEN {
                    return Err(FingerprintError::SignalTooLong(name));
                }
            }
        }
        if self.hardware_signature.trim().is_empty() {
            return Err(FingerprintError::Empty);
        }
        Ok(())
    }
}
