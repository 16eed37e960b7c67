//! Class labels for the noise classifier (§4.1, §4.3) and the default
//! emergency-sound set (§4.4).

/// Default label set, ordered so index == class id.
pub const DEFAULT_LABELS: &[&str] = &[
    "ambient",
    "traffic",
    "hvac",
    "speech",
    "alarm",
    "siren",
    "fire_alarm",
    "warning",
    "emergency",
];

/// Forced label on a silent/degenerate block (§4.2) and on a classifier
/// numeric failure (§4.3).
pub const SILENCE_LABEL: &str = "silence";
pub const UNKNOWN_LABEL: &str = "unknown";

/// Default emergency set (§4.4): any of these labels at `confidence ≥
/// θ_on` trips the emergency detector.
pub fn default_emergency_set() -> Vec<String> {
    ["alarm", "siren", "fire_alarm", "warning", "emergency"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
