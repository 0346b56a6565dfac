mod common;

use common::{clean_signals, fp, ledger, ledger_with, vm_signals};
use keygate_trial::{AnomalyConfig, TrialConfig, TrialError, TrialPolicy};
use keygate_types::{ActorRole, Page, TrialStatus};
use pretty_assertions::assert_eq;

// ── Eligibility ──────────────────────────────────────────────────

#[test]
fn first_check_creates_active_trial() {
    let ledger = ledger();
    let elig = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    assert!(elig.eligible);
    assert_eq!(elig.status, TrialStatus::Active);
    assert_eq!(elig.credits_remaining, Some(50));
    assert!(elig.trial_guest_id.is_some());
    assert!(!elig.requires_activation);
    assert!(!elig.is_vm_detected);
    assert!(!elig.is_suspicious);
}

#[test]
fn repeat_check_reuses_trial() {
    let ledger = ledger();
    let first = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    ledger
        .consume_credit(&fp("abc123"), "create_invoice", None, None)
        .unwrap();
    let second = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    assert_eq!(second.trial_guest_id, first.trial_guest_id);
    assert_eq!(second.credits_remaining, Some(49));
}

#[test]
fn new_hardware_signature_is_a_new_trial() {
    let ledger = ledger();
    let first = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    let second = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("b"))
        .unwrap();
    assert_ne!(second.trial_guest_id, first.trial_guest_id);
    assert_eq!(second.credits_remaining, Some(50));
}

#[test]
fn oversized_signal_rejected() {
    let ledger = ledger();
    let mut signals = clean_signals("a");
    signals.hostname = Some("h".repeat(300));
    let err = ledger.check_eligibility(&fp("abc123"), &signals).unwrap_err();
    assert!(matches!(err, TrialError::Validation(_)));
}

// ── Consumption ──────────────────────────────────────────────────

#[test]
fn consume_appends_ledger_entry() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    let entry = ledger
        .consume_credit(
            &fp("abc123"),
            "create_invoice",
            Some("inv-001"),
            Some(&serde_json::json!({"invoice_total": 12.5})),
        )
        .unwrap();
    assert_eq!(entry.amount, -1);
    assert_eq!(entry.action, "create_invoice");
    assert_eq!(entry.reference_id.as_deref(), Some("inv-001"));
}

#[test]
fn duplicate_reference_charged_once() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    let first = ledger
        .consume_credit(&fp("abc123"), "create_invoice", Some("inv-001"), None)
        .unwrap();
    let second = ledger
        .consume_credit(&fp("abc123"), "create_invoice", Some("inv-001"), None)
        .unwrap();
    assert_eq!(second.id, first.id);
    let stats = ledger.stats(&fp("abc123")).unwrap();
    assert_eq!(stats.credits_remaining, 49);
}

#[test]
fn consume_without_trial_refused() {
    let ledger = ledger();
    let err = ledger
        .consume_credit(&fp("ghost"), "export", None, None)
        .unwrap_err();
    assert!(matches!(err, TrialError::NotEligible(_)));
}

#[test]
fn exhaustion_walk_flips_to_requires_activation() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    for i in 0..50 {
        ledger
            .consume_credit(&fp("abc123"), "export", Some(&format!("ref-{i}")), None)
            .unwrap();
    }
    let err = ledger
        .consume_credit(&fp("abc123"), "export", None, None)
        .unwrap_err();
    assert!(matches!(err, TrialError::InsufficientCredits));

    let elig = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    assert!(!elig.eligible);
    assert_eq!(elig.status, TrialStatus::Exhausted);
    assert_eq!(elig.reason.as_deref(), Some("trial_exhausted"));
    assert_eq!(elig.credits_remaining, Some(0));
    assert!(elig.requires_activation);
}

// ── Stats ────────────────────────────────────────────────────────

#[test]
fn stats_reports_balance_and_ledger() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    for i in 0..3 {
        ledger
            .consume_credit(&fp("abc123"), "export", Some(&format!("r{i}")), None)
            .unwrap();
    }
    let stats = ledger.stats(&fp("abc123")).unwrap();
    assert_eq!(stats.credits_remaining, 47);
    assert_eq!(stats.record.credits_used, 3);
    assert_eq!(stats.credit_ledger.len(), 3);
    assert_eq!(stats.credit_ledger[0].action, "export");
}

#[test]
fn stats_does_not_touch_last_seen() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    let before = ledger.stats(&fp("abc123")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let after = ledger.stats(&fp("abc123")).unwrap();
    assert_eq!(after.record.last_seen_at, before.record.last_seen_at);
}

#[test]
fn stats_unknown_fingerprint_not_found() {
    let ledger = ledger();
    let err = ledger.stats(&fp("ghost")).unwrap_err();
    assert!(matches!(err, TrialError::NotFound));
}

#[test]
fn stats_limits_recent_entries() {
    let ledger = ledger_with(
        TrialConfig {
            recent_entries_limit: 5,
            ..TrialConfig::default()
        },
        AnomalyConfig::default(),
    );
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    for i in 0..8 {
        ledger
            .consume_credit(&fp("abc123"), "export", Some(&format!("r{i}")), None)
            .unwrap();
    }
    let stats = ledger.stats(&fp("abc123")).unwrap();
    assert_eq!(stats.credit_ledger.len(), 5);
    assert_eq!(stats.record.credits_used, 8);
}

// ── Grants ───────────────────────────────────────────────────────

#[test]
fn grant_reopens_exhausted_trial() {
    let ledger = ledger_with(
        TrialConfig {
            credits_allocated: 2,
            ..TrialConfig::default()
        },
        AnomalyConfig::default(),
    );
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    for i in 0..2 {
        ledger
            .consume_credit(&fp("abc123"), "export", Some(&format!("r{i}")), None)
            .unwrap();
    }
    let record = ledger
        .grant_credits(ActorRole::Admin, &fp("abc123"), 10, "support_topup")
        .unwrap();
    assert_eq!(record.status, TrialStatus::Active);
    assert_eq!(record.credits_remaining(), 10);

    let entry = ledger
        .consume_credit(&fp("abc123"), "export", None, None)
        .unwrap();
    assert_eq!(entry.amount, -1);
}

#[test]
fn grant_requires_admin() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    let err = ledger
        .grant_credits(ActorRole::Client, &fp("abc123"), 10, "support_topup")
        .unwrap_err();
    assert!(matches!(err, TrialError::Forbidden));
}

#[test]
fn grant_rejects_non_positive_amounts() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    for amount in [0, -5] {
        let err = ledger
            .grant_credits(ActorRole::Admin, &fp("abc123"), amount, "support_topup")
            .unwrap_err();
        assert!(matches!(err, TrialError::InvalidGrantAmount));
    }
}

// ── Admin listings ───────────────────────────────────────────────

#[test]
fn listings_gate_on_role() {
    let ledger = ledger();
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    ledger
        .check_eligibility(&fp("def456"), &vm_signals("b"))
        .unwrap();

    let all = ledger.list_trials(ActorRole::Admin, Page::default()).unwrap();
    assert_eq!(all.len(), 2);
    let flagged = ledger
        .list_suspicious(ActorRole::Admin, Page::default())
        .unwrap();
    assert_eq!(flagged.len(), 1);
    assert!(flagged[0].is_vm_detected);

    assert!(matches!(
        ledger.list_trials(ActorRole::Client, Page::default()),
        Err(TrialError::Forbidden)
    ));
    assert!(matches!(
        ledger.list_suspicious(ActorRole::Client, Page::default()),
        Err(TrialError::Forbidden)
    ));
}

// ── Escalation policy ────────────────────────────────────────────

#[test]
fn auto_suspend_fires_on_repeat_check() {
    let anomaly = AnomalyConfig {
        max_sibling_trials: 1,
        ..AnomalyConfig::default()
    };
    let ledger = ledger_with(
        TrialConfig {
            policy: TrialPolicy {
                auto_suspend_suspicious: true,
            },
            ..TrialConfig::default()
        },
        anomaly,
    );
    // Sibling counting happens before the insert, so creation itself
    // stays clean.
    let first = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    assert!(first.eligible);

    // The next check escalates under the policy.
    let second = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    assert!(!second.eligible);
    assert_eq!(second.status, TrialStatus::Suspended);
    assert_eq!(second.reason.as_deref(), Some("trial_suspended"));

    let err = ledger
        .consume_credit(&fp("abc123"), "export", None, None)
        .unwrap_err();
    assert!(matches!(err, TrialError::NotEligible(_)));
}

#[test]
fn suspicion_stays_advisory_without_policy() {
    let anomaly = AnomalyConfig {
        max_sibling_trials: 1,
        ..AnomalyConfig::default()
    };
    let ledger = ledger_with(TrialConfig::default(), anomaly);
    ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    let second = ledger
        .check_eligibility(&fp("abc123"), &clean_signals("a"))
        .unwrap();
    assert!(second.eligible);
    assert!(second.is_suspicious);
}
