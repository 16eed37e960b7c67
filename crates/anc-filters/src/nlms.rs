//! Normalised Least Mean Squares adaptive filter (§4.5.2).
//!
//! O(L) per sample. Numerically stable; preferred for broadband,
//! stationary noise. The slower-converging, stability-floor half of the
//! hybrid blend (§4.5.4).

use tracing::{trace, warn};

use crate::common::{
    AdaptiveFilter, ProcessReport, RollbackTracker, DEFAULT_MAX_CONSECUTIVE_ROLLBACKS,
    DEFAULT_W_MAX_SQ,
};
use crate::tap_line::TapLine;

/// Tuning parameters for [`Nlms`].
#[derive(Debug, Clone, Copy)]
pub struct NlmsConfig {
    /// Filter length `L`.
    pub length: usize,
    /// Step size `μ ∈ (0, 2)`, default 0.5.
    pub mu: f32,
    /// Regularisation `ε`, default `1e-6`.
    pub epsilon: f32,
    /// Safety-gate bound on `‖w‖²`.
    pub w_max_sq: f32,
    /// Consecutive in-block rollbacks before a divergence reset.
    pub max_consecutive_rollbacks: u32,
}

impl NlmsConfig {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            mu: 0.5,
            epsilon: 1e-6,
            w_max_sq: DEFAULT_W_MAX_SQ,
            max_consecutive_rollbacks: DEFAULT_MAX_CONSECUTIVE_ROLLBACKS,
        }
    }
}

/// NLMS adaptive filter state (§3 "Filter state", §4.5.2).
#[derive(Debug)]
pub struct Nlms {
    config: NlmsConfig,
    weights: Vec<f32>,
    tap: TapLine,
    rollbacks: RollbackTracker,
}

impl Nlms {
    pub fn new(config: NlmsConfig) -> Self {
        assert!(config.length > 0, "NLMS filter length must be positive");
        Self {
            weights: vec![0.0; config.length],
            tap: TapLine::new(config.length),
            rollbacks: RollbackTracker::default(),
            config,
        }
    }

    fn reset_to_zero(&mut self) {
        self.weights.fill(0.0);
        self.tap.reset();
    }

    /// Overwrites the weight vector from a restored snapshot. The tap
    /// line and rollback history are left at their current state.
    pub(crate) fn load_weights(&mut self, weights: &[f32]) -> crate::error::Result<()> {
        if weights.len() != self.weights.len() {
            return Err(crate::error::Error::SnapshotLengthMismatch {
                expected: self.weights.len() as u32,
                snapshot: weights.len() as u32,
            });
        }
        self.weights.copy_from_slice(weights);
        Ok(())
    }
}

impl AdaptiveFilter for Nlms {
    fn length(&self) -> usize {
        self.config.length
    }

    fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn reset(&mut self) {
        self.reset_to_zero();
        self.rollbacks = RollbackTracker::default();
    }

    fn process_block(&mut self, reference: &[f32], desired: &[f32]) -> ProcessReport {
        debug_assert_eq!(reference.len(), desired.len());
        let mut anti_noise = Vec::with_capacity(reference.len());
        let mut error = Vec::with_capacity(reference.len());
        let mut reset_occurred = false;

        for (&x_n, &d_n) in reference.iter().zip(desired.iter()) {
            self.tap.push(x_n);

            let y_n = self.tap.dot(&self.weights);
            let e_n = d_n - y_n;

            let norm_sq = self.tap.norm_sq();
            let step = self.config.mu / (norm_sq + self.config.epsilon);
            let mut candidate = self.weights.clone();
            for (w, x) in candidate.iter_mut().zip(self.tap.iter()) {
                *w += step * e_n * x;
            }

            if crate::common::weights_are_safe(&candidate, self.config.w_max_sq) {
                self.weights = candidate;
                self.rollbacks.record_commit();
            } else {
                self.rollbacks.record_rollback();
                trace!(consecutive = self.rollbacks.consecutive(), "nlms rollback");
            }

            if self.rollbacks.should_reset(self.config.max_consecutive_rollbacks) {
                warn!("NLMS filter diverged; resetting to zero weights");
                self.reset_to_zero();
                reset_occurred = true;
            }

            anti_noise.push(-y_n);
            error.push(e_n);
        }

        ProcessReport {
            anti_noise,
            error,
            rollbacks_this_block: self.rollbacks.consecutive(),
            rollbacks_total: self.rollbacks.total(),
            reset: reset_occurred,
        }
    }
}
