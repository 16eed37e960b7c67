//! Multi-channel filter bank (§4.5.6): one independent adaptive filter per
//! channel, with an optional fixed per-channel gain vector for simple
//! beamforming.

use crate::common::{AdaptiveFilter, ProcessReport};
use crate::error::{Error, Result};
use crate::hybrid::{Hybrid, HybridConfig};
use crate::nlms::{Nlms, NlmsConfig};
use crate::rls::{Rls, RlsConfig};

/// Selects which algorithm backs a channel's filter (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Nlms,
    Rls,
    Hybrid,
}

/// A single channel's adaptive filter, whichever algorithm it runs.
#[derive(Debug)]
enum ChannelFilter {
    Nlms(Nlms),
    Rls(Rls),
    Hybrid(Hybrid),
}

impl ChannelFilter {
    fn new(algorithm: Algorithm, length: usize) -> Self {
        match algorithm {
            Algorithm::Nlms => ChannelFilter::Nlms(Nlms::new(NlmsConfig::new(length))),
            Algorithm::Rls => ChannelFilter::Rls(Rls::new(RlsConfig::new(length))),
            Algorithm::Hybrid => ChannelFilter::Hybrid(Hybrid::new(HybridConfig::new(length))),
        }
    }

    fn length(&self) -> usize {
        match self {
            ChannelFilter::Nlms(f) => f.length(),
            ChannelFilter::Rls(f) => f.length(),
            ChannelFilter::Hybrid(f) => f.nlms_weights().len(),
        }
    }

    fn weights(&self) -> &[f32] {
        match self {
            ChannelFilter::Nlms(f) => f.weights(),
            ChannelFilter::Rls(f) => f.weights(),
            ChannelFilter::Hybrid(f) => f.nlms_weights(),
        }
    }

    fn weight_inf_norm(&self) -> f32 {
        match self {
            ChannelFilter::Nlms(f) => f.weights().iter().fold(0.0f32, |m, w| m.max(w.abs())),
            ChannelFilter::Rls(f) => f.weights().iter().fold(0.0f32, |m, w| m.max(w.abs())),
            ChannelFilter::Hybrid(f) => f.weight_inf_norm(),
        }
    }

    fn reset(&mut self) {
        match self {
            ChannelFilter::Nlms(f) => f.reset(),
            ChannelFilter::Rls(f) => f.reset(),
            ChannelFilter::Hybrid(f) => f.reset(),
        }
    }

    fn process_block(&mut self, reference: &[f32], desired: &[f32]) -> ProcessReport {
        match self {
            ChannelFilter::Nlms(f) => f.process_block(reference, desired),
            ChannelFilter::Rls(f) => f.process_block(reference, desired),
            ChannelFilter::Hybrid(f) => f.process_block(reference, desired),
        }
    }
}

/// One channel's processed output, with the fixed per-channel gain already
/// applied to `anti_noise`.
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub anti_noise: Vec<f32>,
    pub error: Vec<f32>,
    pub rollbacks_this_block: u32,
    pub rollbacks_total: u64,
    pub reset: bool,
}

/// An independent [`ChannelFilter`] per channel, sharing one algorithm and
/// filter length, with an optional fixed per-channel output gain (§4.5.6).
#[derive(Debug)]
pub struct FilterBank {
    filters: Vec<ChannelFilter>,
    gains: Vec<f32>,
}

impl FilterBank {
    /// Creates a bank of `channels` independent filters, each of `length`
    /// taps, running `algorithm`. Gains default to unity.
    pub fn new(algorithm: Algorithm, channels: usize, length: usize) -> Result<Self> {
        if channels == 0 || length == 0 {
            return Err(Error::ZeroLength);
        }
        Ok(Self {
            filters: (0..channels).map(|_| ChannelFilter::new(algorithm, length)).collect(),
            gains: vec![1.0; channels],
        })
    }

    /// Overrides the per-channel output gain vector. Must have one entry
    /// per channel.
    pub fn set_gains(&mut self, gains: &[f32]) -> Result<()> {
        if gains.len() != self.filters.len() {
            return Err(Error::ReferenceDesiredLengthMismatch {
                reference: gains.len(),
                desired: self.filters.len(),
            });
        }
        self.gains.copy_from_slice(gains);
        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.filters.len()
    }

    pub fn length(&self) -> usize {
        self.filters.first().map(ChannelFilter::length).unwrap_or(0)
    }

    pub fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
    }

    pub fn channel_weights(&self, channel: usize) -> &[f32] {
        self.filters[channel].weights()
    }

    /// `max` over channels of each channel's `‖w‖∞`.
    pub fn weight_inf_norm(&self) -> f32 {
        self.filters.iter().fold(0.0f32, |m, f| m.max(f.weight_inf_norm()))
    }

    /// Processes one block per channel. `reference` and `desired` must each
    /// have exactly `channels()` entries, one sample slice per channel.
    pub fn process_block(&mut self, reference: &[&[f32]], desired: &[&[f32]]) -> Result<Vec<ChannelReport>> {
        if reference.len() != self.filters.len() || desired.len() != self.filters.len() {
            return Err(Error::ReferenceDesiredLengthMismatch {
                reference: reference.len(),
                desired: desired.len(),
            });
        }
        let mut reports = Vec::with_capacity(self.filters.len());
        for (i, filter) in self.filters.iter_mut().enumerate() {
            let report = filter.process_block(reference[i], desired[i]);
            let gain = self.gains[i];
            let anti_noise = report.anti_noise.iter().map(|s| s * gain).collect();
            reports.push(ChannelReport {
                anti_noise,
                error: report.error,
                rollbacks_this_block: report.rollbacks_this_block,
                rollbacks_total: report.rollbacks_total,
                reset: report.reset,
            });
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_channel_count() {
        let mut bank = FilterBank::new(Algorithm::Nlms, 2, 16).unwrap();
        let a = vec![0.0f32; 16];
        let refs: Vec<&[f32]> = vec![&a];
        let des: Vec<&[f32]> = vec![&a];
        assert!(bank.process_block(&refs, &des).is_err());
    }

    #[test]
    fn gain_scales_anti_noise_output() {
        let mut bank = FilterBank::new(Algorithm::Nlms, 1, 4).unwrap();
        bank.set_gains(&[2.0]).unwrap();
        let a = vec![0.1f32; 4];
        let refs: Vec<&[f32]> = vec![&a];
        let des: Vec<&[f32]> = vec![&a];
        let unscaled_gain_bank_reports = {
            let mut unscaled = FilterBank::new(Algorithm::Nlms, 1, 4).unwrap();
            unscaled.process_block(&refs, &des).unwrap()
        };
        let reports = bank.process_block(&refs, &des).unwrap();
        for (scaled, base) in reports[0].anti_noise.iter().zip(unscaled_gain_bank_reports[0].anti_noise.iter()) {
            assert!((scaled - 2.0 * base).abs() < 1e-5);
        }
    }

    #[test]
    fn each_channel_runs_independently() {
        let mut bank = FilterBank::new(Algorithm::Hybrid, 2, 8).unwrap();
        let loud = vec![0.5f32; 8];
        let quiet = vec![0.01f32; 8];
        let refs: Vec<&[f32]> = vec![&loud, &quiet];
        let des: Vec<&[f32]> = vec![&loud, &quiet];
        for _ in 0..20 {
            bank.process_block(&refs, &des).unwrap();
        }
        assert_ne!(bank.channel_weights(0), bank.channel_weights(1));
    }
}
