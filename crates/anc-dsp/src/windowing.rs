//! Pre-emphasis, frame windowing, and the rolling inter-block context.
//!
//! The feature extractor analyses overlapping 2048-sample frames at a 512-
//! sample hop, but blocks arrive at 1024 samples (half a frame). The frame
//! source owns a rolling tail of prior samples so every block contributes
//! whole frames without the caller needing to buffer anything itself.

use std::sync::OnceLock;

/// Frame length used for MFCC/spectral/chroma analysis.
pub const FRAME_LEN: usize = 2048;
/// Hop between successive analysis frames.
pub const HOP: usize = 512;

const PRE_EMPHASIS: f32 = 0.97;

fn hann_window() -> &'static [f32; FRAME_LEN] {
    static WINDOW: OnceLock<[f32; FRAME_LEN]> = OnceLock::new();
    WINDOW.get_or_init(|| {
        let mut w = [0.0f32; FRAME_LEN];
        let denom = (FRAME_LEN - 1) as f32;
        for (n, v) in w.iter_mut().enumerate() {
            *v = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / denom).cos();
        }
        w
    })
}

/// One 2048-sample analysis frame in two flavors: pre-emphasized only
/// (`raw`, used for time-domain statistics like ZCR/RMS that a window would
/// distort) and Hann-windowed (`windowed`, used for spectral analysis).
#[derive(Debug, Clone)]
pub struct Frame {
    pub raw: Box<[f32; FRAME_LEN]>,
    pub windowed: Box<[f32; FRAME_LEN]>,
}

/// Produces overlapping analysis frames from a stream of audio blocks,
/// maintaining pre-emphasis continuity and the rolling frame-context tail
/// across block boundaries.
#[derive(Debug)]
pub struct FrameSource {
    history: Vec<f32>,
    last_raw_sample: f32,
}

impl Default for FrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource {
    pub fn new() -> Self {
        Self {
            history: vec![0.0; FRAME_LEN - HOP],
            last_raw_sample: 0.0,
        }
    }

    /// Resets pre-emphasis and frame-context state, as if no audio had ever
    /// been seen. Used when a filter/session is reset after divergence.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Consumes one block, returning every whole analysis frame it and the
    /// rolling context together complete. Returns an empty `Vec` if the
    /// block plus context is still shorter than one frame (can only happen
    /// transiently at session start with a very small `block_size`).
    pub fn push_block(&mut self, block: &[f32]) -> Vec<Frame> {
        let mut emphasized = Vec::with_capacity(block.len());
        let mut prev = self.last_raw_sample;
        for &x in block {
            emphasized.push(x - PRE_EMPHASIS * prev);
            prev = x;
        }
        self.last_raw_sample = prev;

        let mut buf = std::mem::take(&mut self.history);
        buf.extend_from_slice(&emphasized);

        let frame_count = buf.len().saturating_sub(FRAME_LEN) / HOP + usize::from(buf.len() >= FRAME_LEN);
        let window = hann_window();
        let mut frames = Vec::with_capacity(frame_count);
        for i in 0..frame_count {
            let start = i * HOP;
            let mut raw = Box::new([0.0f32; FRAME_LEN]);
            raw.copy_from_slice(&buf[start..start + FRAME_LEN]);
            let mut windowed = raw.clone();
            for (s, w) in windowed.iter_mut().zip(window.iter()) {
                *s *= w;
            }
            frames.push(Frame { raw, windowed });
        }

        let tail_len = FRAME_LEN - HOP;
        self.history = if buf.len() > tail_len {
            buf[buf.len() - tail_len..].to_vec()
        } else {
            buf
        };
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_size_yields_two_frames_per_block() {
        let mut src = FrameSource::new();
        let block = vec![0.1f32; 1024];
        let frames = src.push_block(&block);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn silence_in_silence_out() {
        let mut src = FrameSource::new();
        let frames = src.push_block(&vec![0.0; 1024]);
        for frame in &frames {
            assert!(frame.raw.iter().all(|&s| s == 0.0));
            assert!(frame.windowed.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn reset_clears_inter_block_context() {
        let mut src = FrameSource::new();
        src.push_block(&vec![1.0; 1024]);
        src.reset();
        let frames = src.push_block(&vec![0.0; 1024]);
        // Immediately after reset, history is zeros again, so a silent
        // block still yields all-zero frames rather than carrying over the
        // pre-reset context.
        assert!(frames[0].raw.iter().all(|&s| s == 0.0));
    }
}
