//! Hybrid NLMS/RLS blend (§4.5.4).
//!
//! Runs both algorithms in parallel on the same reference, each owning
//! independent weights, and convexly combines their outputs. The blend
//! weight `α` walks toward whichever branch has the lower trailing error
//! power, by a capped step, clamped to `[0.3, 0.9]` — NLMS's stability
//! floor is preserved while RLS's faster convergence is exploited when it
//! is winning.

use crate::common::{AdaptiveFilter, ProcessReport};
use crate::nlms::{Nlms, NlmsConfig};
use crate::rls::{Rls, RlsConfig};

pub const ALPHA_MIN: f32 = 0.3;
pub const ALPHA_MAX: f32 = 0.9;
pub const ALPHA_STEP: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct HybridConfig {
    pub nlms: NlmsConfig,
    pub rls: RlsConfig,
    pub alpha_init: f32,
}

impl HybridConfig {
    pub fn new(length: usize) -> Self {
        Self {
            nlms: NlmsConfig::new(length),
            rls: RlsConfig::new(length),
            alpha_init: 0.5,
        }
    }
}

/// Hybrid state (§3 "Hybrid state"): an NLMS/RLS pair plus the blend
/// weight `α`.
#[derive(Debug)]
pub struct Hybrid {
    nlms: Nlms,
    rls: Rls,
    alpha: f32,
}

impl Hybrid {
    pub fn new(config: HybridConfig) -> Self {
        Self {
            nlms: Nlms::new(config.nlms),
            rls: Rls::new(config.rls),
            alpha: config.alpha_init.clamp(ALPHA_MIN, ALPHA_MAX),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn nlms_weights(&self) -> &[f32] {
        self.nlms.weights()
    }

    pub fn rls_weights(&self) -> &[f32] {
        self.rls.weights()
    }

    /// `max(‖w_NLMS‖∞, ‖w_RLS‖∞)`, used by the cold-start / pure-tone
    /// testable properties (§8).
    pub fn weight_inf_norm(&self) -> f32 {
        let nlms_max = self.nlms.weights().iter().fold(0.0f32, |m, w| m.max(w.abs()));
        let rls_max = self.rls.weights().iter().fold(0.0f32, |m, w| m.max(w.abs()));
        nlms_max.max(rls_max)
    }

    pub fn reset(&mut self) {
        self.nlms.reset();
        self.rls.reset();
    }

    /// Overwrites the blend weight `α`, clamped to `[ALPHA_MIN, ALPHA_MAX]`.
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(ALPHA_MIN, ALPHA_MAX);
    }

    /// Overwrites the NLMS branch's weights from a restored snapshot.
    /// The Hybrid persistence format only carries the NLMS branch's
    /// weights plus `α`; the RLS branch re-converges from zero.
    pub(crate) fn load_nlms_weights(&mut self, weights: &[f32]) -> crate::error::Result<()> {
        self.nlms.load_weights(weights)
    }

    pub fn process_block(&mut self, reference: &[f32], desired: &[f32]) -> ProcessReport {
        debug_assert_eq!(reference.len(), desired.len());
        let nlms_report = self.nlms.process_block(reference, desired);
        let rls_report = self.rls.process_block(reference, desired);

        let mut anti_noise = Vec::with_capacity(reference.len());
        let mut error = Vec::with_capacity(reference.len());
        for i in 0..reference.len() {
            let blended = self.alpha * nlms_report.anti_noise[i] + (1.0 - self.alpha) * rls_report.anti_noise[i];
            anti_noise.push(blended);
            error.push(desired[i] - (-blended));
        }

        let nlms_error_power = power(&nlms_report.error);
        let rls_error_power = power(&rls_report.error);
        self.alpha = step_alpha(self.alpha, nlms_error_power, rls_error_power);

        ProcessReport {
            anti_noise,
            error,
            rollbacks_this_block: nlms_report.rollbacks_this_block.max(rls_report.rollbacks_this_block),
            rollbacks_total: nlms_report.rollbacks_total + rls_report.rollbacks_total,
            reset: nlms_report.reset || rls_report.reset,
        }
    }
}

fn power(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32
}

/// Steps `alpha` toward the branch with lower error power, by at most
/// `ALPHA_STEP`, clamped to `[ALPHA_MIN, ALPHA_MAX]`.
fn step_alpha(alpha: f32, nlms_error_power: f32, rls_error_power: f32) -> f32 {
    let step = if nlms_error_power < rls_error_power {
        ALPHA_STEP
    } else if rls_error_power < nlms_error_power {
        -ALPHA_STEP
    } else {
        0.0
    };
    (alpha + step).clamp(ALPHA_MIN, ALPHA_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_plus_noise(len: usize, freq: f32, sample_rate: f32, seed: &mut u64) -> Vec<f32> {
        (0..len)
            .map(|n| {
                *seed ^= *seed << 13;
                *seed ^= *seed >> 7;
                *seed ^= *seed << 17;
                let u = (*seed >> 11) as f64 / (1u64 << 53) as f64;
                let noise = ((u as f32) * 2.0 - 1.0) * 0.05;
                0.3 * (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate).sin() + noise
            })
            .collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn alpha_stays_within_bounds() {
        let mut hybrid = Hybrid::new(HybridConfig::new(64));
        let mut seed = 1234u64;
        for _ in 0..50 {
            let block = sine_plus_noise(256, 440.0, 48_000.0, &mut seed);
            hybrid.process_block(&block, &block);
            assert!(hybrid.alpha() >= ALPHA_MIN && hybrid.alpha() <= ALPHA_MAX);
        }
    }

    #[test]
    fn hybrid_residual_tracks_the_better_branch() {
        let sample_rate = 48_000.0;
        let mut hybrid = Hybrid::new(HybridConfig::new(128));
        let mut standalone_nlms = Nlms::new(NlmsConfig::new(128));
        let mut standalone_rls = Rls::new(RlsConfig::new(128));
        let mut seed = 99u64;

        let mut hybrid_rms = 0.0;
        let mut nlms_rms = 0.0;
        let mut rls_rms = 0.0;
        for _ in 0..(sample_rate as usize) / 256 {
            let block = sine_plus_noise(256, 440.0, sample_rate, &mut seed);
            let h = hybrid.process_block(&block, &block);
            let n = standalone_nlms.process_block(&block, &block);
            let r = standalone_rls.process_block(&block, &block);
            hybrid_rms = rms(&h.error);
            nlms_rms = rms(&n.error);
            rls_rms = rms(&r.error);
        }

        let best = nlms_rms.min(rls_rms);
        let best_db = 20.0 * (0.3 / best.max(1e-9)).log10();
        let hybrid_db = 20.0 * (0.3 / hybrid_rms.max(1e-9)).log10();
        assert!(
            hybrid_db >= best_db - 1.0,
            "hybrid {hybrid_db}dB should track the better branch {best_db}dB within 1dB"
        );
    }

    #[test]
    fn cold_start_on_silence_keeps_weights_near_zero() {
        let mut hybrid = Hybrid::new(HybridConfig::new(512));
        for _ in 0..100 {
            let block = vec![0.0f32; 1024];
            let report = hybrid.process_block(&block, &block);
            assert!(!report.reset);
        }
        assert!(hybrid.weight_inf_norm() <= 1e-3);
    }
}
