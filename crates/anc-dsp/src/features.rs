//! C2: the feature extractor. Turns a block of PCM into the fixed-length
//! 168-float feature vector consumed by the noise classifier (§3, §4.2).

use crate::chroma::{self, NUM_CHROMA_BINS};
use crate::mel::{MfccTransform, NUM_MFCC};
use crate::spectral;
use crate::windowing::FrameSource;

/// 13 MFCC + 13 delta-MFCC + 4 spectral streams + 12 chroma bins, each
/// summarized as (mean, std, min, max) => (13+13+4+12)*4 = 168.
pub const FEATURE_LEN: usize = 168;
const STATS_PER_STREAM: usize = 4;
const NUM_SPECTRAL_STREAMS: usize = 4;

/// A fixed-length, always-finite feature vector.
///
/// `forced_silent` mirrors the "silent feature vector" failure path of
/// §4.2: an empty block, an all-zero block, or a non-finite intermediate
/// value all collapse to the same all-zero vector with this flag set so
/// the classifier (C3) can short-circuit straight to the `silence` label
/// rather than running inference on a meaningless input.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    data: [f32; FEATURE_LEN],
    forced_silent: bool,
}

impl FeatureVector {
    pub fn silent() -> Self {
        Self {
            data: [0.0; FEATURE_LEN],
            forced_silent: true,
        }
    }

    /// Wraps a precomputed feature array, e.g. for tests in downstream
    /// crates that need a non-silent vector without running the full
    /// extraction pipeline.
    pub fn from_raw(data: [f32; FEATURE_LEN]) -> Self {
        let forced_silent = data.iter().all(|&v| v == 0.0);
        Self { data, forced_silent }
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32; FEATURE_LEN] {
        &self.data
    }

    #[inline]
    pub fn is_forced_silent(&self) -> bool {
        self.forced_silent
    }
}

/// Pure(ish) `block -> feature_vector` pipeline stage. Holds the rolling
/// frame context and precomputed mel filterbank/DCT tables across calls,
/// but every `extract` call is otherwise independent of prior results
/// beyond that windowing context and the delta-MFCC carry value.
#[derive(Debug)]
pub struct FeatureExtractor {
    frames: FrameSource,
    mfcc: MfccTransform,
    sample_rate: f32,
    prev_mfcc: [f32; NUM_MFCC],
}

impl FeatureExtractor {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            frames: FrameSource::new(),
            mfcc: MfccTransform::new(sample_rate),
            sample_rate,
            prev_mfcc: [0.0; NUM_MFCC],
        }
    }

    pub fn reset(&mut self) {
        self.frames.reset();
        self.prev_mfcc = [0.0; NUM_MFCC];
    }

    /// Extracts the 168-d feature vector for one block (§4.2).
    pub fn extract(&mut self, block: &[f32]) -> FeatureVector {
        if block.is_empty() || block.iter().all(|&s| s == 0.0) {
            return FeatureVector::silent();
        }

        let frames = self.frames.push_block(block);
        if frames.is_empty() {
            return FeatureVector::silent();
        }

        let mut mfcc_streams: [Vec<f32>; NUM_MFCC] = Default::default();
        let mut delta_streams: [Vec<f32>; NUM_MFCC] = Default::default();
        let mut centroid_stream = Vec::with_capacity(frames.len());
        let mut rolloff_stream = Vec::with_capacity(frames.len());
        let mut zcr_stream = Vec::with_capacity(frames.len());
        let mut rms_stream = Vec::with_capacity(frames.len());
        let mut chroma_streams: [Vec<f32>; NUM_CHROMA_BINS] = Default::default();

        for frame in &frames {
            let (magnitude, mfcc) = self.mfcc.analyze(&frame.windowed);
            for k in 0..NUM_MFCC {
                mfcc_streams[k].push(mfcc[k]);
                delta_streams[k].push(mfcc[k] - self.prev_mfcc[k]);
            }
            self.prev_mfcc = mfcc;

            centroid_stream.push(spectral::spectral_centroid(&magnitude, self.sample_rate));
            rolloff_stream.push(spectral::spectral_rolloff(&magnitude, self.sample_rate));
            zcr_stream.push(spectral::zero_crossing_rate(&frame.raw));
            rms_stream.push(spectral::rms(&frame.raw));

            let bins = chroma::chroma(&magnitude, self.sample_rate);
            for c in 0..NUM_CHROMA_BINS {
                chroma_streams[c].push(bins[c]);
            }
        }

        let mut data = [0.0f32; FEATURE_LEN];
        let mut cursor = 0;
        for stream in &mfcc_streams {
            write_stats(stream, &mut data[cursor..cursor + STATS_PER_STREAM]);
            cursor += STATS_PER_STREAM;
        }
        for stream in &delta_streams {
            write_stats(stream, &mut data[cursor..cursor + STATS_PER_STREAM]);
            cursor += STATS_PER_STREAM;
        }
        for stream in [&centroid_stream, &rolloff_stream, &zcr_stream, &rms_stream] {
            write_stats(stream, &mut data[cursor..cursor + STATS_PER_STREAM]);
            cursor += STATS_PER_STREAM;
        }
        for stream in &chroma_streams {
            write_stats(stream, &mut data[cursor..cursor + STATS_PER_STREAM]);
            cursor += STATS_PER_STREAM;
        }
        debug_assert_eq!(cursor, FEATURE_LEN);
        debug_assert_eq!(
            NUM_MFCC * 2 * STATS_PER_STREAM
                + NUM_SPECTRAL_STREAMS * STATS_PER_STREAM
                + NUM_CHROMA_BINS * STATS_PER_STREAM,
            FEATURE_LEN
        );

        if data.iter().any(|v| !v.is_finite()) {
            return FeatureVector::silent();
        }

        FeatureVector {
            data,
            forced_silent: false,
        }
    }
}

/// Writes `(mean, std, min, max)` of `stream` into `out`.
fn write_stats(stream: &[f32], out: &mut [f32]) {
    debug_assert_eq!(out.len(), STATS_PER_STREAM);
    if stream.is_empty() {
        out.fill(0.0);
        return;
    }
    let n = stream.len() as f32;
    let mean = stream.iter().sum::<f32>() / n;
    let variance = stream.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = variance.sqrt();
    let min = stream.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = stream.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    out[0] = mean;
    out[1] = std;
    out[2] = min;
    out[3] = max;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_block_yields_forced_silent_feature_vector() {
        let mut extractor = FeatureExtractor::new(48_000.0);
        let fv = extractor.extract(&vec![0.0; 1024]);
        assert!(fv.is_forced_silent());
        assert_eq!(fv.as_slice(), &[0.0; FEATURE_LEN]);
    }

    #[test]
    fn empty_block_yields_forced_silent_feature_vector() {
        let mut extractor = FeatureExtractor::new(48_000.0);
        let fv = extractor.extract(&[]);
        assert!(fv.is_forced_silent());
    }

    #[test]
    fn tone_block_yields_finite_non_silent_feature_vector() {
        let mut extractor = FeatureExtractor::new(48_000.0);
        let block: Vec<f32> = (0..1024)
            .map(|n| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * n as f32 / 48_000.0).sin())
            .collect();
        let fv = extractor.extract(&block);
        assert!(!fv.is_forced_silent());
        assert!(fv.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn feature_len_matches_spec_layout() {
        assert_eq!(FEATURE_LEN, 168);
    }
}
