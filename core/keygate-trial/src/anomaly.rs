//! Anomaly heuristics over device signals and trial history.
//!
//! Pure functions: the ledger gathers the history context and persists
//! the resulting flags. Detection is advisory; nothing in this module
//! blocks trial creation or consumption. Thresholds live in
//! [`AnomalyConfig`] rather than the code.

use keygate_types::DeviceSignals;
use serde::{Deserialize, Serialize};

/// Tunable thresholds and signature lists for anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Lower-case substrings that mark virtualized hardware.
    pub vm_markers: Vec<String>,
    /// Sliding window for consumption velocity, in seconds.
    pub velocity_window_secs: i64,
    /// Consumptions within the window above which a trial is suspicious.
    pub velocity_max: u32,
    /// Hardware-signature prefix length used for sibling matching.
    pub signature_prefix_len: usize,
    /// Distinct trials sharing a signature prefix at which the overlap
    /// becomes suspicious.
    pub max_sibling_trials: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            vm_markers: [
                "vmware",
                "virtualbox",
                "vbox",
                "qemu",
                "kvm",
                "hyper-v",
                "hyperv",
                "xen",
                "parallels",
                "bochs",
                "bhyve",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            velocity_window_secs: 300,
            velocity_max: 30,
            signature_prefix_len: 16,
            max_sibling_trials: 3,
        }
    }
}

/// History context the ledger gathers from the store before assessment.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyContext {
    /// Distinct trials whose hardware signature shares this trial's prefix.
    pub sibling_trials: u32,
    /// CONSUME entries appended within the velocity window.
    pub consumes_in_window: u32,
}

/// Outcome of an assessment. Flags are persisted on the trial record;
/// reasons are logged and surfaced to admins only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyReport {
    /// Virtualization heuristics matched.
    pub vm_detected: bool,
    /// Reuse or velocity heuristics matched.
    pub suspicious: bool,
    /// Human-readable explanations for each matched heuristic.
    pub reasons: Vec<String>,
}

/// Checks the reported signals against known virtualization markers.
///
/// Returns the matched marker description, or None. False positives are
/// acceptable; the flag is advisory.
#[must_use]
pub fn detect_vm(signals: &DeviceSignals, config: &AnomalyConfig) -> Option<String> {
    let haystacks = [
        signals.platform.as_deref(),
        signals.hostname.as_deref(),
        signals.cpu_model.as_deref(),
        Some(signals.hardware_signature.as_str()),
    ];
    for haystack in haystacks.into_iter().flatten() {
        let lower = haystack.to_lowercase();
        for marker in &config.vm_markers {
            if lower.contains(marker.as_str()) {
                return Some(format!("vm marker {marker:?} in {haystack:?}"));
            }
        }
    }
    // Physical machines normally expose at least one of these serials.
    if signals.disk_serial.is_none() && signals.system_uuid.is_none() {
        return Some("no disk serial or system uuid reported".to_string());
    }
    None
}

/// Full assessment: VM heuristics plus history-based suspicion.
#[must_use]
pub fn assess(
    signals: &DeviceSignals,
    context: &AnomalyContext,
    config: &AnomalyConfig,
) -> AnomalyReport {
    let mut report = AnomalyReport::default();

    if let Some(reason) = detect_vm(signals, config) {
        report.vm_detected = true;
        report.reasons.push(reason);
    }
    if context.sibling_trials >= config.max_sibling_trials {
        report.suspicious = true;
        report.reasons.push(format!(
            "{} trials share hardware signature prefix",
            context.sibling_trials
        ));
    }
    if context.consumes_in_window > config.velocity_max {
        report.suspicious = true;
        report.reasons.push(format!(
            "{} consumptions in {}s window (max {})",
            context.consumes_in_window, config.velocity_window_secs, config.velocity_max
        ));
    }
    report
}

/// Velocity-only check, for call sites that have no fresh device
/// signals (credit consumption reports only the fingerprint).
#[must_use]
pub fn assess_velocity(consumes_in_window: u32, config: &AnomalyConfig) -> AnomalyReport {
    let mut report = AnomalyReport::default();
    if consumes_in_window > config.velocity_max {
        report.suspicious = true;
        report.reasons.push(format!(
            "{} consumptions in {}s window (max {})",
            consumes_in_window, config.velocity_window_secs, config.velocity_max
        ));
    }
    report
}

/// The signature prefix used for sibling matching, bounded to the
/// configured length on a char boundary.
#[must_use]
pub fn signature_prefix<'a>(hardware_signature: &'a str, config: &AnomalyConfig) -> &'a str {
    let mut end = config.signature_prefix_len.min(hardware_signature.len());
    while end > 0 && !hardware_signature.is_char_boundary(end) {
        end -= 1;
    }
    &hardware_signature[..end]
}
