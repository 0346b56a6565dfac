//! Shared fixtures for trial ledger tests.

#![allow(dead_code)]

use keygate_store::Store;
use keygate_trial::{AnomalyConfig, TrialConfig, TrialLedger};
use keygate_types::{DeviceFingerprint, DeviceSignals};
use std::sync::Arc;

/// A ledger over a fresh in-memory store with default configuration.
pub fn ledger() -> TrialLedger {
    ledger_with(TrialConfig::default(), AnomalyConfig::default())
}

pub fn ledger_with(config: TrialConfig, anomaly: AnomalyConfig) -> TrialLedger {
    let store = Arc::new(Store::open_in_memory().unwrap());
    TrialLedger::new(store, config, anomaly)
}

pub fn fp(raw: &str) -> DeviceFingerprint {
    DeviceFingerprint::parse(raw).unwrap()
}

/// Signals for a plausible physical machine. `tag` keeps hardware
/// signatures distinct across devices so sibling heuristics stay quiet.
pub fn clean_signals(tag: &str) -> DeviceSignals {
    DeviceSignals {
        hardware_signature: format!("sig-{tag}-0011223344556677"),
        platform: Some("Windows 11 Pro".to_string()),
        hostname: Some(format!("DESKTOP-{tag}")),
        cpu_model: Some("AMD Ryzen 7 5800X".to_string()),
        mac_hash: Some("9f86d081884c7d65".to_string()),
        disk_serial: Some(format!("WD-{tag}-554433")),
        system_uuid: Some(format!("uuid-{tag}")),
    }
}

/// Signals that look like a VMware guest.
pub fn vm_signals(tag: &str) -> DeviceSignals {
    DeviceSignals {
        platform: Some("VMware Virtual Platform".to_string()),
        ..clean_signals(tag)
    }
}
