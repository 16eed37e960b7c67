//! Session configuration (§6 "Control operations: `initialize(config)`").
//!
//! Mirrors this workspace's own configuration convention: a `serde`-
//! serialisable struct with an explicit `Default` impl documenting each
//! field's default value, plus a [`Config::validate`] pass applied at
//! [`crate::session::Session::initialize`] time. `validate` never panics:
//! out-of-range values are clamped and logged at `warn`, except the
//! handful of fields (`sample_rate`, `block_size`, `channels`,
//! `classifier_model_path`) where an invalid value is a Configuration-kind
//! error per §7.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use anc_filters::Algorithm;

use crate::error::{Error, Result};

/// Default block size `N` (§3).
pub const DEFAULT_BLOCK_SIZE: usize = 1024;
/// Default sample rate `Fs` in Hz (§3).
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
/// Default filter length `L` (§3).
pub const DEFAULT_FILTER_LENGTH: usize = 512;
/// Default channel count (§4.5.6).
pub const DEFAULT_CHANNELS: usize = 1;
/// Default ring buffer capacity `Q` (§4.1).
pub const DEFAULT_QUEUE_CAPACITY: usize = anc_dsp::DEFAULT_CAPACITY;

/// Which adaptive algorithm backs every channel's filter (§6 config
/// option `algorithm: nlms|rls|hybrid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmChoice {
    Nlms,
    Rls,
    Hybrid,
}

impl Default for AlgorithmChoice {
    fn default() -> Self {
        AlgorithmChoice::Hybrid
    }
}

impl From<AlgorithmChoice> for Algorithm {
    fn from(choice: AlgorithmChoice) -> Self {
        match choice {
            AlgorithmChoice::Nlms => Algorithm::Nlms,
            AlgorithmChoice::Rls => Algorithm::Rls,
            AlgorithmChoice::Hybrid => Algorithm::Hybrid,
        }
    }
}

/// Emergency-detector tuning (§4.4). Nested so it can be omitted entirely
/// in a config file and fall back to the defaults documented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Labels that can trip the detector (default: `{alarm, siren,
    /// fire_alarm, warning, emergency}`).
    pub emergency_set: Vec<String>,
    /// Confidence required to trigger (default: 0.70).
    pub theta_on: f32,
    /// Confidence below which a held emergency starts clearing (default:
    /// 0.55). Must be less than `theta_on`; a violation is clamped to
    /// `theta_on - 0.01` with a `warn` log.
    pub theta_off: f32,
    /// Hold window in milliseconds before a held emergency auto-expires
    /// with no retriggering block (default: 2000).
    pub hold_ms: u64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            emergency_set: anc_classify::default_emergency_set(),
            theta_on: anc_classify::DEFAULT_THETA_ON,
            theta_off: anc_classify::DEFAULT_THETA_OFF,
            hold_ms: anc_classify::DEFAULT_HOLD_MS,
        }
    }
}

impl EmergencyConfig {
    fn validate(&mut self) {
        if !(0.0..=1.0).contains(&self.theta_on) {
            warn!(theta_on = self.theta_on, "theta_on out of [0,1], clamping");
            self.theta_on = self.theta_on.clamp(0.0, 1.0);
        }
        if self.theta_off >= self.theta_on {
            warn!(
                theta_off = self.theta_off,
                theta_on = self.theta_on,
                "theta_off must be below theta_on, clamping"
            );
            self.theta_off = (self.theta_on - 0.01).max(0.0);
        }
    }
}

/// Top-level session configuration (§6).
///
/// All components are constructed with production-sensible defaults;
/// setting `classifier_model_path` to `None` runs an untrained but
/// deterministic classifier (the "cold start" / dry-run path used by
/// tests and the `demos` binaries when no trained artifact is on disk).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sample rate `Fs` in Hz (default: 48000). Configuration-kind error
    /// if zero.
    pub sample_rate: u32,
    /// Block size `N` in samples (default: 1024). Configuration-kind
    /// error if zero.
    pub block_size: usize,
    /// Filter length `L` in taps (default: 512). Clamped to at least 1.
    pub filter_length: usize,
    /// Adaptive algorithm (default: Hybrid).
    pub algorithm: AlgorithmChoice,
    /// Channel count `C` (default: 1). Configuration-kind error if zero.
    pub channels: usize,
    /// Ring buffer capacity `Q` (default: 8). Clamped to at least 1.
    pub queue_capacity: usize,
    /// Path to a trained classifier model artifact. `None` runs the
    /// untrained deterministic classifier (§ "Supplemented Features").
    /// Configuration-kind error if `Some` and the path does not exist.
    pub classifier_model_path: Option<PathBuf>,
    /// Use the `Deep` classifier backend when the model path is set
    /// (default: false, i.e. `Shallow`).
    pub use_deep_classifier: bool,
    /// Emergency detector tuning (§4.4).
    pub emergency: EmergencyConfig,
    /// Initial anti-noise intensity gain in `[0, 1]` (default: 1.0,
    /// full ANC). See `set_intensity` (§6).
    pub initial_intensity: f32,
    /// Optional fixed per-channel output gain vector (§4.5.6
    /// beamforming config). `None` is unity gain on every channel.
    pub channel_gains: Option<Vec<f32>>,
    /// Bounded timeout the processor waits on a block before declaring
    /// starvation (default: 50ms, §4.1).
    pub pop_timeout_ms: u64,
    /// Cooperative-shutdown budget (default: 500ms, §5 "Cancellation
    /// semantics").
    pub stop_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            filter_length: DEFAULT_FILTER_LENGTH,
            algorithm: AlgorithmChoice::default(),
            channels: DEFAULT_CHANNELS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            classifier_model_path: None,
            use_deep_classifier: false,
            emergency: EmergencyConfig::default(),
            initial_intensity: 1.0,
            channel_gains: None,
            pop_timeout_ms: anc_dsp::DEFAULT_POP_TIMEOUT.as_millis() as u64,
            stop_timeout_ms: 500,
        }
    }
}

impl Config {
    /// Validates and clamps this config in place (§6, §7 "Configuration"
    /// kind). Returns an error for the handful of fields where an
    /// out-of-range or missing value cannot be safely clamped.
    pub fn validate(&mut self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(self.sample_rate));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidBlockSize(self.block_size));
        }
        if self.channels == 0 {
            return Err(Error::InvalidChannelCount(self.channels));
        }
        if let Some(path) = &self.classifier_model_path {
            if !path_exists(path) {
                return Err(Error::MissingClassifierModel(path.display().to_string()));
            }
        }

        if self.filter_length == 0 {
            warn!("filter_length clamped from 0 to 1");
            self.filter_length = 1;
        }
        if self.queue_capacity == 0 {
            warn!("queue_capacity clamped from 0 to 1");
            self.queue_capacity = 1;
        }
        if !(0.0..=1.0).contains(&self.initial_intensity) {
            warn!(intensity = self.initial_intensity, "initial_intensity out of [0,1], clamping");
            self.initial_intensity = self.initial_intensity.clamp(0.0, 1.0);
        }
        if let Some(gains) = &self.channel_gains {
            if gains.len() != self.channels {
                warn!(
                    got = gains.len(),
                    expected = self.channels,
                    "channel_gains length mismatch, discarding (falling back to unity gain)"
                );
                self.channel_gains = None;
            }
        }
        if self.pop_timeout_ms == 0 {
            warn!("pop_timeout_ms clamped from 0 to 1");
            self.pop_timeout_ms = 1;
        }
        if self.stop_timeout_ms == 0 {
            warn!("stop_timeout_ms clamped from 0 to 1");
            self.stop_timeout_ms = 1;
        }

        self.emergency.validate();
        Ok(())
    }

    /// Loads and validates a config from a JSON file (§ "Configuration"
    /// ambient stack).
    pub fn load_json(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }
}

fn path_exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_cleanly() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_sample_rate_is_configuration_error() {
        let mut config = Config {
            sample_rate: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn zero_block_size_is_configuration_error() {
        let mut config = Config {
            block_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_channels_is_configuration_error() {
        let mut config = Config {
            channels: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_classifier_model_path_is_configuration_error() {
        let mut config = Config {
            classifier_model_path: Some(PathBuf::from("/nonexistent/model.ancm")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mismatched_channel_gains_are_discarded_not_fatal() {
        let mut config = Config {
            channels: 2,
            channel_gains: Some(vec![1.0]),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.channel_gains.is_none());
    }

    #[test]
    fn theta_off_above_theta_on_is_clamped() {
        let mut config = Config {
            emergency: EmergencyConfig {
                theta_on: 0.5,
                theta_off: 0.9,
                ..EmergencyConfig::default()
            },
            ..Default::default()
        };
        config.validate().unwrap();
        assert!(config.emergency.theta_off < config.emergency.theta_on);
    }

    #[test]
    fn serde_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.sample_rate, config.sample_rate);
        assert_eq!(restored.block_size, config.block_size);
        assert_eq!(restored.algorithm, config.algorithm);
    }
}
