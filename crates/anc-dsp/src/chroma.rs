//! 12-bin chroma summary (§4.2 step 4): spectral energy folded into pitch
//! classes relative to A4 = 440 Hz on the equal-tempered scale.

use crate::windowing::FRAME_LEN;

pub const NUM_CHROMA_BINS: usize = 12;

const A4_HZ: f32 = 440.0;

/// Folds a magnitude spectrum into 12 pitch-class energies, normalized so
/// the bins sum to 1 (silence yields all-zero bins rather than `NaN`).
pub fn chroma(magnitude: &[f32], sample_rate: f32) -> [f32; NUM_CHROMA_BINS] {
    let bin_hz = sample_rate / FRAME_LEN as f32;
    let mut bins = [0.0f32; NUM_CHROMA_BINS];
    // Bin 0 is DC; skip it, it has no pitch class.
    for (k, &mag) in magnitude.iter().enumerate().skip(1) {
        let freq = k as f32 * bin_hz;
        if freq <= 0.0 {
            continue;
        }
        let midi = 69.0 + 12.0 * (freq / A4_HZ).log2();
        let pitch_class = midi.round().rem_euclid(12.0) as usize % NUM_CHROMA_BINS;
        bins[pitch_class] += mag * mag;
    }
    let total: f32 = bins.iter().sum();
    if total > 0.0 {
        for b in bins.iter_mut() {
            *b /= total;
        }
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_yields_all_zero_chroma() {
        let magnitude = vec![0.0f32; FRAME_LEN / 2 + 1];
        assert_eq!(chroma(&magnitude, 48_000.0), [0.0; NUM_CHROMA_BINS]);
    }

    #[test]
    fn chroma_sums_to_one_when_energy_present() {
        let mut magnitude = vec![0.0f32; FRAME_LEN / 2 + 1];
        magnitude[100] = 1.0;
        magnitude[200] = 0.5;
        let bins = chroma(&magnitude, 48_000.0);
        let sum: f32 = bins.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn a4_tone_concentrates_in_the_a_pitch_class() {
        let bin_hz = 48_000.0 / FRAME_LEN as f32;
        let mut magnitude = vec![0.0f32; FRAME_LEN / 2 + 1];
        let bin = (A4_HZ / bin_hz).round() as usize;
        magnitude[bin] = 1.0;
        let bins = chroma(&magnitude, 48_000.0);
        let (max_bin, _) = bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        // A = pitch class 9 (C=0, C#=1, ..., A=9) by construction of the
        // MIDI-number-mod-12 mapping used above.
        assert_eq!(max_bin, 9);
    }
}
