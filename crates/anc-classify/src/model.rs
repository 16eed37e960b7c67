//! A small feed-forward network: the "precomputed transform (scaler) +
//! multi-layer dense network" of the Shallow backend (§4.3), and the
//! dense layers atop the Deep backend's pooled spectrogram.
//!
//! Weights are loaded from a flat binary format (mirroring `anc-filters`'
//! ANCF convention): magic `ANCM`, u16 version, u32 input width, u32
//! output width (class count), u32 layer count, then per layer `(u32
//! in_dim, u32 out_dim, f32[out_dim*in_dim] weights row-major, f32[out_dim]
//! bias)`. Every layer but the last applies ReLU; the last applies softmax.

use std::io::Read;
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};

const MAGIC: [u8; 4] = *b"ANCM";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseLayer {
    fn forward(&self, input: &Array1<f32>, apply_relu: bool) -> Array1<f32> {
        let mut out = self.weights.dot(input) + &self.bias;
        if apply_relu {
            out.mapv_inplace(|v| v.max(0.0));
        }
        out
    }
}

/// A loaded dense network: per-feature standardisation followed by `N`
/// dense layers, softmax on the final layer.
#[derive(Debug, Clone)]
pub struct DenseNetwork {
    pub input_width: usize,
    pub output_width: usize,
    mean: Array1<f32>,
    std: Array1<f32>,
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Builds an identity-scaled, random-but-deterministic network of the
    /// given shape. Used when no model file is supplied (tests, and the
    /// `demos` dry-run mode) so the classifier pipeline is still
    /// exercisable end-to-end without a trained artifact.
    pub fn untrained(input_width: usize, hidden_width: usize, output_width: usize) -> Self {
        let mut seed = 0x5eed_u64;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            ((seed >> 11) as f64 / (1u64 << 53) as f64) as f32 * 2.0 - 1.0
        };
        let hidden = Array2::from_shape_fn((hidden_width, input_width), |_| next() * 0.05);
        let hidden_bias = Array1::zeros(hidden_width);
        let output = Array2::from_shape_fn((output_width, hidden_width), |_| next() * 0.05);
        let output_bias = Array1::zeros(output_width);
        Self {
            input_width,
            output_width,
            mean: Array1::zeros(input_width),
            std: Array1::ones(input_width),
            layers: vec![
                DenseLayer { weights: hidden, bias: hidden_bias },
                DenseLayer { weights: output, bias: output_bias },
            ],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|_| Error::ModelNotFound(path.display().to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = bytes;
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(|_| Error::MalformedModel("truncated header"))?;
        if magic != MAGIC {
            return Err(Error::MalformedModel("bad magic"));
        }
        let version = read_u16(&mut cursor)?;
        if version != FORMAT_VERSION {
            return Err(Error::MalformedModel("unsupported version"));
        }
        let input_width = read_u32(&mut cursor)? as usize;
        let output_width = read_u32(&mut cursor)? as usize;
        let layer_count = read_u32(&mut cursor)? as usize;

        let mean = read_f32_vec(&mut cursor, input_width)?;
        let std = read_f32_vec(&mut cursor, input_width)?;

        let mut layers = Vec::with_capacity(layer_count);
        let mut prev_width = input_width;
        for i in 0..layer_count {
            let in_dim = read_u32(&mut cursor)? as usize;
            let out_dim = read_u32(&mut cursor)? as usize;
            if in_dim != prev_width {
                return Err(Error::LayerShapeMismatch { expected: prev_width, got: in_dim });
            }
            let weights_flat = read_f32_vec(&mut cursor, out_dim * in_dim)?;
            let weights = Array2::from_shape_vec((out_dim, in_dim), weights_flat)
                .map_err(|_| Error::MalformedModel("layer weight shape"))?;
            let bias = Array1::from_vec(read_f32_vec(&mut cursor, out_dim)?);
            layers.push(DenseLayer { weights, bias });
            prev_width = out_dim;
            let _ = i;
        }
        if prev_width != output_width {
            return Err(Error::MalformedModel("final layer width does not match declared output width"));
        }

        Ok(Self {
            input_width,
            output_width,
            mean: Array1::from_vec(mean),
            std: Array1::from_vec(std),
            layers,
        })
    }

    /// Standardises `features`, runs the dense stack, and returns a
    /// softmax probability distribution over `output_width` classes.
    pub fn predict(&self, features: &[f32]) -> Vec<f32> {
        debug_assert_eq!(features.len(), self.input_width);
        let raw = Array1::from_vec(features.to_vec());
        let mut x = (&raw - &self.mean) / self.std.mapv(|s| if s.abs() < 1e-9 { 1.0 } else { s });

        let last = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x, i != last);
        }
        softmax(x.as_slice().unwrap_or(&[]))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        let uniform = 1.0 / logits.len() as f32;
        return vec![uniform; logits.len()];
    }
    exps.iter().map(|v| v / sum).collect()
}

fn read_u16(cursor: &mut &[u8]) -> Result<u16> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(|_| Error::MalformedModel("truncated u16"))?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).map_err(|_| Error::MalformedModel("truncated u32"))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32_vec(cursor: &mut &[u8], count: usize) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let mut buf = [0u8; 4];
        cursor.read_exact(&mut buf).map_err(|_| Error::MalformedModel("truncated f32"))?;
        out.push(f32::from_le_bytes(buf));
    }
    Ok(out)
}
