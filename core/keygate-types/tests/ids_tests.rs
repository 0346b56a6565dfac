use keygate_types::{LedgerEntryId, LicenseId, TrialGuestId};
use std::collections::HashSet;
use std::str::FromStr;

// ── TrialGuestId ─────────────────────────────────────────────────

#[test]
fn trial_guest_id_new_is_unique() {
    let a = TrialGuestId::new();
    let b = TrialGuestId::new();
    assert_ne!(a, b);
}

#[test]
fn trial_guest_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    let id = TrialGuestId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn trial_guest_id_display_and_parse() {
    let id = TrialGuestId::new();
    let s = id.to_string();
    let parsed = TrialGuestId::parse(&s).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn trial_guest_id_from_str() {
    let id = TrialGuestId::new();
    let parsed = TrialGuestId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn trial_guest_id_parse_invalid() {
    assert!(TrialGuestId::parse("not-a-uuid").is_err());
}

#[test]
fn trial_guest_id_hash_and_eq() {
    let id = TrialGuestId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id); // duplicate
    assert_eq!(set.len(), 1);
}

#[test]
fn trial_guest_id_serde_transparent() {
    let id = TrialGuestId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let parsed: TrialGuestId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}

// ── LedgerEntryId / LicenseId ────────────────────────────────────

#[test]
fn ledger_entry_id_roundtrip() {
    let id = LedgerEntryId::new();
    let parsed = LedgerEntryId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn license_id_roundtrip() {
    let id = LicenseId::new();
    let parsed = LicenseId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn ids_are_time_ordered() {
    // UUID v7 embeds a timestamp, so later ids sort after earlier ones.
    let a = LedgerEntryId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = LedgerEntryId::new();
    assert!(a.as_uuid() < b.as_uuid());
}
