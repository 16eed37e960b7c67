//! Emergency detector (C4, §4.4): a thin hysteretic policy over
//! classifier output.
//!
//! ```text
//! is_emergency = (label ∈ EMERGENCY_SET) ∧ (confidence ≥ θ_on)
//! ```
//!
//! Once true, stays true until two consecutive blocks report `confidence
//! < θ_off`, or until a hold window elapses with no further triggering
//! block — whichever comes first.

use std::collections::HashSet;

use tracing::info;

use crate::classifier::ClassificationResult;
use crate::label::default_emergency_set;

pub const DEFAULT_THETA_ON: f32 = 0.70;
pub const DEFAULT_THETA_OFF: f32 = 0.55;
pub const DEFAULT_HOLD_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct EmergencyConfig {
    pub emergency_set: HashSet<String>,
    pub theta_on: f32,
    pub theta_off: f32,
    pub hold_ms: u64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            emergency_set: default_emergency_set().into_iter().collect(),
            theta_on: DEFAULT_THETA_ON,
            theta_off: DEFAULT_THETA_OFF,
            hold_ms: DEFAULT_HOLD_MS,
        }
    }
}

/// An `emergency_start` / `emergency_end` transition event (§6 "Emergency
/// notification"), to be forwarded to `on_event` from `T_metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyTransition {
    Started,
    Ended,
}

#[derive(Debug, Clone)]
pub struct EmergencyEvent {
    pub transition: EmergencyTransition,
    pub label: String,
    pub confidence: f32,
    pub block_seq: u64,
    pub timestamp_us: u64,
}

/// Stateful hysteresis machine. One instance per session; fed one
/// classification result per block.
#[derive(Debug)]
pub struct EmergencyDetector {
    config: EmergencyConfig,
    active: bool,
    below_off_threshold_streak: u32,
    last_trigger_timestamp_us: u64,
}

impl EmergencyDetector {
    pub fn new(config: EmergencyConfig) -> Self {
        Self {
            config,
            active: false,
            below_off_threshold_streak: 0,
            last_trigger_timestamp_us: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.below_off_threshold_streak = 0;
        self.last_trigger_timestamp_us = 0;
    }

    /// Updates state from one block's classification and returns a
    /// transition event if one occurred.
    ///
    /// `result = None` is the fail-safe path (§4.4 "If the classifier or
    /// detector itself fails to produce a result ... treat is_emergency
    /// = true"): it is treated as an immediate, indefinite trigger.
    pub fn update(
        &mut self,
        result: Option<&ClassificationResult>,
        block_seq: u64,
        timestamp_us: u64,
    ) -> Option<EmergencyEvent> {
        let Some(result) = result else {
            let was_active = self.active;
            self.active = true;
            self.last_trigger_timestamp_us = timestamp_us;
            self.below_off_threshold_streak = 0;
            return (!was_active).then(|| EmergencyEvent {
                transition: EmergencyTransition::Started,
                label: "unavailable".to_string(),
                confidence: 1.0,
                block_seq,
                timestamp_us,
            });
        };

        let triggers = self.config.emergency_set.contains(&result.label) && result.confidence >= self.config.theta_on;

        if triggers {
            let was_active = self.active;
            self.active = true;
            self.below_off_threshold_streak = 0;
            self.last_trigger_timestamp_us = timestamp_us;
            if !was_active {
                info!(label = %result.label, confidence = result.confidence, "emergency detected");
                return Some(EmergencyEvent {
                    transition: EmergencyTransition::Started,
                    label: result.label.clone(),
                    confidence: result.confidence,
                    block_seq,
                    timestamp_us,
                });
            }
            return None;
        }

        if !self.active {
            return None;
        }

        if result.confidence < self.config.theta_off {
            self.below_off_threshold_streak += 1;
        } else {
            self.below_off_threshold_streak = 0;
        }

        let hold_elapsed_us = self.config.hold_ms.saturating_mul(1_000);
        let held_expired = timestamp_us.saturating_sub(self.last_trigger_timestamp_us) >= hold_elapsed_us;

        if self.below_off_threshold_streak >= 2 || held_expired {
            self.active = false;
            self.below_off_threshold_streak = 0;
            info!(label = %result.label, confidence = result.confidence, "emergency cleared");
            return Some(EmergencyEvent {
                transition: EmergencyTransition::Ended,
                label: result.label.clone(),
                confidence: result.confidence,
                block_seq,
                timestamp_us,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(label: &str, confidence: f32) -> ClassificationResult {
        ClassificationResult {
            label: label.to_string(),
            confidence,
            probs: vec![],
        }
    }

    #[test]
    fn triggers_on_emergency_label_above_theta_on() {
        let mut det = EmergencyDetector::new(EmergencyConfig::default());
        let event = det.update(Some(&result("siren", 0.8)), 1, 0);
        assert!(det.is_active());
        assert_eq!(event.unwrap().transition, EmergencyTransition::Started);
    }

    #[test]
    fn does_not_trigger_on_non_emergency_label() {
        let mut det = EmergencyDetector::new(EmergencyConfig::default());
        det.update(Some(&result("traffic", 0.99)), 1, 0);
        assert!(!det.is_active());
    }

    #[test]
    fn hysteresis_survives_a_single_dip_below_theta_off() {
        let mut det = EmergencyDetector::new(EmergencyConfig::default());
        det.update(Some(&result("siren", 0.8)), 1, 0);
        det.update(Some(&result("siren", 0.60)), 2, 10_000);
        assert!(det.is_active(), "a single confidence>theta_off dip should not clear emergency");
    }

    #[test]
    fn hysteresis_clears_after_two_consecutive_blocks_below_theta_off() {
        let mut det = EmergencyDetector::new(EmergencyConfig::default());
        det.update(Some(&result("siren", 0.8)), 1, 0);
        det.update(Some(&result("siren", 0.40)), 2, 10_000);
        let event = det.update(Some(&result("siren", 0.40)), 3, 20_000);
        assert!(!det.is_active());
        assert_eq!(event.unwrap().transition, EmergencyTransition::Ended);
    }

    #[test]
    fn alternating_confidence_does_not_toggle_at_block_rate() {
        // spec §8: confidences (0.80, 0.60, 0.80, 0.60, ...) for "siren"
        // must not toggle is_emergency at block rate.
        let mut det = EmergencyDetector::new(EmergencyConfig::default());
        let confidences = [0.80, 0.60, 0.80, 0.60, 0.80, 0.60, 0.80, 0.60];
        let mut toggled_off = false;
        for (i, &c) in confidences.iter().enumerate() {
            let ev = det.update(Some(&result("siren", c)), i as u64, i as u64 * 20_000);
            if let Some(e) = ev {
                if e.transition == EmergencyTransition::Ended {
                    toggled_off = true;
                }
            }
        }
        assert!(!toggled_off, "alternating confidences must not clear emergency at block rate");
        assert!(det.is_active());
    }

    #[test]
    fn held_emergency_expires_after_hold_window_with_no_retrigger() {
        let mut config = EmergencyConfig::default();
        config.hold_ms = 2_000;
        let mut det = EmergencyDetector::new(config);
        det.update(Some(&result("siren", 0.8)), 1, 0);
        // No further triggering block; a benign label arrives 2.5s later.
        let event = det.update(Some(&result("ambient", 0.9)), 2, 2_500_000);
        assert!(!det.is_active());
        assert_eq!(event.unwrap().transition, EmergencyTransition::Ended);
    }

    #[test]
    fn fail_safe_on_missing_result_triggers_bypass() {
        let mut det = EmergencyDetector::new(EmergencyConfig::default());
        let event = det.update(None, 1, 0);
        assert!(det.is_active());
        assert_eq!(event.unwrap().transition, EmergencyTransition::Started);
    }
}
