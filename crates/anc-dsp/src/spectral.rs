//! Per-frame spectral and time-domain summary statistics (§4.2 step 3).

use crate::windowing::FRAME_LEN;

/// Rolloff percentile (§4.2): the frequency below which 85% of the
/// spectral energy is contained.
const ROLLOFF_PERCENT: f32 = 0.85;

/// Spectral centroid in Hz: the energy-weighted mean frequency of
/// `magnitude`, a `FRAME_LEN/2 + 1`-bin magnitude spectrum.
pub fn spectral_centroid(magnitude: &[f32], sample_rate: f32) -> f32 {
    let bin_hz = sample_rate / FRAME_LEN as f32;
    let mut weighted_sum = 0.0f64;
    let mut total = 0.0f64;
    for (k, &mag) in magnitude.iter().enumerate() {
        let mag = mag as f64;
        weighted_sum += mag * (k as f64 * bin_hz as f64);
        total += mag;
    }
    if total <= 0.0 {
        0.0
    } else {
        (weighted_sum / total) as f32
    }
}

/// Spectral rolloff frequency in Hz (85th percentile of cumulative energy).
pub fn spectral_rolloff(magnitude: &[f32], sample_rate: f32) -> f32 {
    let bin_hz = sample_rate / FRAME_LEN as f32;
    let total_energy: f64 = magnitude.iter().map(|&m| (m as f64) * (m as f64)).sum();
    if total_energy <= 0.0 {
        return 0.0;
    }
    let threshold = total_energy * ROLLOFF_PERCENT as f64;
    let mut cumulative = 0.0f64;
    for (k, &mag) in magnitude.iter().enumerate() {
        cumulative += (mag as f64) * (mag as f64);
        if cumulative >= threshold {
            return k as f32 * bin_hz;
        }
    }
    (magnitude.len().saturating_sub(1)) as f32 * bin_hz
}

/// Zero-crossing rate over a time-domain frame, in crossings per sample.
pub fn zero_crossing_rate(frame: &[f32; FRAME_LEN]) -> f32 {
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (FRAME_LEN - 1) as f32
}

/// Root-mean-square amplitude of a time-domain frame.
pub fn rms(frame: &[f32; FRAME_LEN]) -> f32 {
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / FRAME_LEN as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_zero_centroid_rolloff_zcr_rms() {
        let magnitude = vec![0.0f32; FRAME_LEN / 2 + 1];
        let frame = [0.0f32; FRAME_LEN];
        assert_eq!(spectral_centroid(&magnitude, 48_000.0), 0.0);
        assert_eq!(spectral_rolloff(&magnitude, 48_000.0), 0.0);
        assert_eq!(zero_crossing_rate(&frame), 0.0);
        assert_eq!(rms(&frame), 0.0);
    }

    #[test]
    fn high_frequency_tone_raises_centroid() {
        let mut low = vec![0.0f32; FRAME_LEN / 2 + 1];
        low[2] = 1.0;
        let mut high = vec![0.0f32; FRAME_LEN / 2 + 1];
        high[400] = 1.0;
        assert!(spectral_centroid(&high, 48_000.0) > spectral_centroid(&low, 48_000.0));
    }

    #[test]
    fn alternating_signal_has_high_zcr() {
        let mut frame = [0.0f32; FRAME_LEN];
        for (n, s) in frame.iter_mut().enumerate() {
            *s = if n % 2 == 0 { 1.0 } else { -1.0 };
        }
        assert!(zero_crossing_rate(&frame) > 0.9);
    }
}
