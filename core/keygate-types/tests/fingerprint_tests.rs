use keygate_types::{
    DeviceFingerprint, DeviceSignals, FingerprintError, MAX_FINGERPRINT_LEN, MAX_SIGNAL_LEN,
};

// ── DeviceFingerprint shape validation ───────────────────────────

#[test]
fn accepts_hex_style() {
    let fp = DeviceFingerprint::parse("a3f9c2e811d04b55").unwrap();
    assert_eq!(fp.as_str(), "a3f9c2e811d04b55");
}

#[test]
fn accepts_base64url_style() {
    assert!(DeviceFingerprint::parse("qf8Zb-_=Hh2k").is_ok());
}

#[test]
fn accepts_short_opaque_ids() {
    assert!(DeviceFingerprint::parse("abc123").is_ok());
}

#[test]
fn trims_whitespace() {
    let fp = DeviceFingerprint::parse("  abc123  ").unwrap();
    assert_eq!(fp.as_str(), "abc123");
}

#[test]
fn rejects_empty() {
    assert_eq!(DeviceFingerprint::parse(""), Err(FingerprintError::Empty));
    assert_eq!(DeviceFingerprint::parse("   "), Err(FingerprintError::Empty));
}

#[test]
fn rejects_overlong() {
    let long = "a".repeat(MAX_FINGERPRINT_LEN + 1);
    assert_eq!(
        DeviceFingerprint::parse(&long),
        Err(FingerprintError::Length(MAX_FINGERPRINT_LEN + 1))
    );
}

#[test]
fn accepts_max_length() {
    let max = "a".repeat(MAX_FINGERPRINT_LEN);
    assert!(DeviceFingerprint::parse(&max).is_ok());
}

#[test]
fn rejects_foreign_characters() {
    assert_eq!(
        DeviceFingerprint::parse("abc 123"),
        Err(FingerprintError::InvalidChar(' '))
    );
    assert_eq!(
        DeviceFingerprint::parse("abc;rm"),
        Err(FingerprintError::InvalidChar(';'))
    );
    assert!(DeviceFingerprint::parse("abc\u{1F600}").is_err());
}

#[test]
fn serde_rejects_invalid() {
    let result: Result<DeviceFingerprint, _> = serde_json::from_str("\"has spaces\"");
    assert!(result.is_err());
}

#[test]
fn serde_roundtrip() {
    let fp = DeviceFingerprint::parse("abc123def").unwrap();
    let json = serde_json::to_string(&fp).unwrap();
    let back: DeviceFingerprint = serde_json::from_str(&json).unwrap();
    assert_eq!(fp, back);
}

// ── DeviceSignals validation ─────────────────────────────────────

#[test]
fn signals_require_hardware_signature() {
    let signals = DeviceSignals {
        hardware_signature: "  ".to_string(),
        ..DeviceSignals::default()
    };
    assert_eq!(signals.validate(), Err(FingerprintError::Empty));
}

#[test]
fn signals_reject_overlong_field() {
    let signals = DeviceSignals {
        hardware_signature: "hw-sig".to_string(),
        hostname: Some("h".repeat(MAX_SIGNAL_LEN + 1)),
        ..DeviceSignals::default()
    };
    assert_eq!(
        signals.validate(),
        Err(FingerprintError::SignalTooLong("hostname"))
    );
}

#[test]
fn signals_accept_minimal() {
    let signals = DeviceSignals {
        hardware_signature: "hw-sig".to_string(),
        ..DeviceSignals::default()
    };
    assert!(signals.validate().is_ok());
}

#[test]
fn signals_deserialize_with_missing_optionals() {
    let signals: DeviceSignals =
        serde_json::from_str(r#"{"hardware_signature":"hw-1"}"#).unwrap();
    assert_eq!(signals.hardware_signature, "hw-1");
    assert!(signals.platform.is_none());
    assert!(signals.disk_serial.is_none());
}
