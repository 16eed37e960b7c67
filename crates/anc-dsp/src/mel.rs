//! Mel filterbank and MFCC extraction from a windowed analysis frame.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::windowing::FRAME_LEN;

/// Number of triangular mel filters spanning 0 Hz to Nyquist.
const NUM_MEL_FILTERS: usize = 26;
/// Number of MFCC coefficients retained per frame (spec §4.2).
pub const NUM_MFCC: usize = 13;
const NUM_SPECTRUM_BINS: usize = FRAME_LEN / 2 + 1;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Precomputed, sample-rate-dependent transform from an FFT magnitude
/// spectrum to 13 MFCC coefficients. Built once per [`super::features::FeatureExtractor`].
#[derive(Debug)]
pub struct MfccTransform {
    fft: Arc<dyn Fft<f32>>,
    filterbank: Vec<Vec<f32>>,
    dct_table: [[f32; NUM_MEL_FILTERS]; NUM_MFCC],
}

impl MfccTransform {
    pub fn new(sample_rate: f32) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FRAME_LEN);
        let filterbank = build_mel_filterbank(sample_rate);
        let dct_table = build_dct_table();
        Self {
            fft,
            filterbank,
            dct_table,
        }
    }

    /// Returns the magnitude spectrum (`FRAME_LEN/2 + 1` bins) and the 13
    /// MFCC coefficients for one Hann-windowed frame.
    pub fn analyze(&self, windowed_frame: &[f32; FRAME_LEN]) -> ([f32; NUM_SPECTRUM_BINS], [f32; NUM_MFCC]) {
        let mut buf: Vec<Complex<f32>> = windowed_frame.iter().map(|&s| Complex::new(s, 0.0)).collect();
        self.fft.process(&mut buf);

        let mut magnitude = [0.0f32; NUM_SPECTRUM_BINS];
        for (k, c) in magnitude.iter_mut().enumerate() {
            *c = buf[k].norm();
        }

        let mut log_energies = [0.0f32; NUM_MEL_FILTERS];
        for (m, filter) in self.filterbank.iter().enumerate() {
            let energy: f32 = filter
                .iter()
                .zip(magnitude.iter())
                .map(|(w, mag)| w * mag)
                .sum();
            log_energies[m] = (energy + 1e-10).ln();
        }

        let mut mfcc = [0.0f32; NUM_MFCC];
        for (k, row) in self.dct_table.iter().enumerate() {
            mfcc[k] = row.iter().zip(log_energies.iter()).map(|(c, e)| c * e).sum();
        }

        (magnitude, mfcc)
    }
}

fn build_mel_filterbank(sample_rate: f32) -> Vec<Vec<f32>> {
    let nyquist = sample_rate / 2.0;
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(nyquist);
    let mel_points: Vec<f32> = (0..=NUM_MEL_FILTERS + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (NUM_MEL_FILTERS + 1) as f32)
        .collect();
    let hz_points: Vec<f32> = mel_points.iter().map(|&m| mel_to_hz(m)).collect();
    let bin_points: Vec<usize> = hz_points
        .iter()
        .map(|&hz| ((FRAME_LEN as f32 + 1.0) * hz / sample_rate).floor() as usize)
        .map(|b| b.min(NUM_SPECTRUM_BINS - 1))
        .collect();

    let mut filters = Vec::with_capacity(NUM_MEL_FILTERS);
    for m in 1..=NUM_MEL_FILTERS {
        let mut filter = vec![0.0f32; NUM_SPECTRUM_BINS];
        let (left, center, right) = (bin_points[m - 1], bin_points[m], bin_points[m + 1]);
        for k in left..center {
            if center > left {
                filter[k] = (k - left) as f32 / (center - left) as f32;
            }
        }
        for k in center..right {
            if right > center {
                filter[k] = (right - k) as f32 / (right - center) as f32;
            }
        }
        filters.push(filter);
    }
    filters
}

fn build_dct_table() -> [[f32; NUM_MEL_FILTERS]; NUM_MFCC] {
    let mut table = [[0.0f32; NUM_MEL_FILTERS]; NUM_MFCC];
    for (k, row) in table.iter_mut().enumerate() {
        for (m, coeff) in row.iter_mut().enumerate() {
            *coeff = (std::f32::consts::PI / NUM_MEL_FILTERS as f32
                * (m as f32 + 0.5)
                * k as f32)
                .cos();
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_yields_finite_mfcc() {
        let transform = MfccTransform::new(48_000.0);
        let frame = [0.0f32; FRAME_LEN];
        let (spectrum, mfcc) = transform.analyze(&frame);
        assert!(spectrum.iter().all(|s| s.is_finite()));
        assert!(mfcc.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn pure_tone_has_concentrated_spectrum() {
        let transform = MfccTransform::new(48_000.0);
        let mut frame = [0.0f32; FRAME_LEN];
        for (n, s) in frame.iter_mut().enumerate() {
            *s = (2.0 * std::f32::consts::PI * 440.0 * n as f32 / 48_000.0).sin();
        }
        let (spectrum, mfcc) = transform.analyze(&frame);
        assert!(spectrum.iter().all(|s| s.is_finite()));
        assert!(mfcc.iter().all(|s| s.is_finite()));
        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let expected_bin = (440.0 * FRAME_LEN as f32 / 48_000.0).round() as usize;
        assert!(peak_bin.abs_diff(expected_bin) <= 2);
    }
}
