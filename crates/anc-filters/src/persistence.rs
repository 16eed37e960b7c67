//! The `ANCF` binary persistence format (§6) and the [`FilterSnapshot`]
//! validation wrapper used to check a saved snapshot against a session's
//! configuration before loading it.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::filter_bank::Algorithm;
use crate::hybrid::{Hybrid, HybridConfig};
use crate::nlms::{Nlms, NlmsConfig};
use crate::rls::{Rls, RlsConfig};

const MAGIC: [u8; 4] = *b"ANCF";
const FORMAT_VERSION: u16 = 1;

const ALGORITHM_ID_NLMS: u16 = 1;
const ALGORITHM_ID_RLS: u16 = 2;
const ALGORITHM_ID_HYBRID: u16 = 3;

/// A loaded-but-unapplied snapshot of one channel's filter state, tagged
/// with the algorithm, `L`, and channel id it was captured from.
#[derive(Debug, Clone)]
pub struct FilterSnapshot {
    pub algorithm: Algorithm,
    pub length: u32,
    pub channel_id: u32,
    pub weights: Vec<f32>,
    /// Present only for RLS: the row-major `L×L` inverse-correlation
    /// matrix.
    pub p: Option<Vec<f32>>,
    /// Present only for Hybrid: the blend weight `α`.
    pub alpha: Option<f32>,
}

impl FilterSnapshot {
    /// Validates this snapshot against a session's expected filter length
    /// and channel count, per the Supplemented Features' rule that a
    /// mismatch is a Configuration-kind error, never a silent truncation.
    pub fn validate_against(&self, expected_length: u32, expected_channel_count: u32) -> Result<()> {
        if self.length != expected_length {
            return Err(Error::SnapshotLengthMismatch {
                expected: expected_length,
                snapshot: self.length,
            });
        }
        if self.channel_id >= expected_channel_count {
            return Err(Error::SnapshotChannelMismatch {
                expected: expected_channel_count,
                snapshot: self.channel_id,
            });
        }
        Ok(())
    }

    /// Serialises this snapshot to the `ANCF` binary format (§6).
    pub fn save<W: Write>(&self, mut out: W) -> Result<()> {
        out.write_all(&MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        let algorithm_id = match self.algorithm {
            Algorithm::Nlms => ALGORITHM_ID_NLMS,
            Algorithm::Rls => ALGORITHM_ID_RLS,
            Algorithm::Hybrid => ALGORITHM_ID_HYBRID,
        };
        out.write_all(&algorithm_id.to_le_bytes())?;
        out.write_all(&self.length.to_le_bytes())?;
        out.write_all(&self.channel_id.to_le_bytes())?;
        write_f32_array(&mut out, &self.weights)?;

        match self.algorithm {
            Algorithm::Nlms => {}
            Algorithm::Rls => {
                let p = self.p.as_ref().expect("RLS snapshot must carry P");
                write_f32_array(&mut out, p)?;
            }
            Algorithm::Hybrid => {
                let alpha = self.alpha.expect("Hybrid snapshot must carry alpha");
                out.write_all(&alpha.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Deserialises a snapshot previously written by [`Self::save`].
    pub fn load<R: Read>(mut input: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }
        let version = read_u16(&mut input)?;
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let algorithm_id = read_u16(&mut input)?;
        let algorithm = match algorithm_id {
            ALGORITHM_ID_NLMS => Algorithm::Nlms,
            ALGORITHM_ID_RLS => Algorithm::Rls,
            ALGORITHM_ID_HYBRID => Algorithm::Hybrid,
            other => return Err(Error::UnknownAlgorithmId(other)),
        };
        let length = read_u32(&mut input)?;
        let channel_id = read_u32(&mut input)?;
        let weights = read_f32_array(&mut input, length as usize)?;

        let (p, alpha) = match algorithm {
            Algorithm::Nlms => (None, None),
            Algorithm::Rls => {
                let p = read_f32_array(&mut input, (length as usize) * (length as usize))?;
                (Some(p), None)
            }
            Algorithm::Hybrid => {
                let alpha = read_f32(&mut input)?;
                (None, Some(alpha))
            }
        };

        Ok(Self {
            algorithm,
            length,
            channel_id,
            weights,
            p,
            alpha,
        })
    }
}

/// Captures a channel's current weights (and, for RLS/Hybrid, the
/// algorithm-specific tail) into a [`FilterSnapshot`].
pub fn snapshot_nlms(filt: &Nlms, channel_id: u32) -> FilterSnapshot {
    FilterSnapshot {
        algorithm: Algorithm::Nlms,
        length: filt.weights().len() as u32,
        channel_id,
        weights: filt.weights().to_vec(),
        p: None,
        alpha: None,
    }
}

pub fn snapshot_rls(filt: &Rls, channel_id: u32) -> FilterSnapshot {
    FilterSnapshot {
        algorithm: Algorithm::Rls,
        length: filt.weights().len() as u32,
        channel_id,
        weights: filt.weights().to_vec(),
        p: Some(filt.p_matrix().to_vec()),
        alpha: None,
    }
}

pub fn snapshot_hybrid(filt: &Hybrid, channel_id: u32) -> FilterSnapshot {
    FilterSnapshot {
        algorithm: Algorithm::Hybrid,
        length: filt.nlms_weights().len() as u32,
        channel_id,
        weights: filt.nlms_weights().to_vec(),
        p: None,
        alpha: Some(filt.alpha()),
    }
}

/// Restores an [`Nlms`] filter's weights from a validated snapshot.
pub fn restore_nlms(snapshot: &FilterSnapshot, config: NlmsConfig) -> Result<Nlms> {
    if snapshot.algorithm != Algorithm::Nlms {
        return Err(Error::AlgorithmMismatch);
    }
    let mut filt = Nlms::new(config);
    filt.load_weights(&snapshot.weights)?;
    Ok(filt)
}

pub fn restore_rls(snapshot: &FilterSnapshot, config: RlsConfig) -> Result<Rls> {
    if snapshot.algorithm != Algorithm::Rls {
        return Err(Error::AlgorithmMismatch);
    }
    let p = snapshot.p.as_ref().ok_or(Error::Truncated("missing RLS tail"))?;
    let mut filt = Rls::new(config);
    filt.load_weights_and_p(&snapshot.weights, p)?;
    Ok(filt)
}

pub fn restore_hybrid(snapshot: &FilterSnapshot, config: HybridConfig) -> Result<Hybrid> {
    if snapshot.algorithm != Algorithm::Hybrid {
        return Err(Error::AlgorithmMismatch);
    }
    let alpha = snapshot.alpha.ok_or(Error::Truncated("missing hybrid alpha"))?;
    let mut filt = Hybrid::new(config);
    filt.load_nlms_weights(&snapshot.weights)?;
    filt.set_alpha(alpha);
    Ok(filt)
}

fn write_f32_array<W: Write>(out: &mut W, values: &[f32]) -> Result<()> {
    for v in values {
        out.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_f32_array<R: Read>(input: &mut R, count: usize) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_f32(input)?);
    }
    Ok(values)
}

fn read_u16<R: Read>(input: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    input
        .read_exact(&mut buf)
        .map_err(|_| Error::Truncated("u16 field"))?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    input
        .read_exact(&mut buf)
        .map_err(|_| Error::Truncated("u32 field"))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(input: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    input
        .read_exact(&mut buf)
        .map_err(|_| Error::Truncated("f32 field"))?;
    Ok(f32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nlms_snapshot_round_trips() {
        let mut filt = Nlms::new(NlmsConfig::new(16));
        let block = vec![0.1f32; 32];
        filt.process_block(&block, &block);

        let snapshot = snapshot_nlms(&filt, 0);
        let mut buf = Vec::new();
        snapshot.save(&mut buf).unwrap();
        let loaded = FilterSnapshot::load(&buf[..]).unwrap();
        assert_eq!(loaded.weights, filt.weights().to_vec());

        let restored = restore_nlms(&loaded, NlmsConfig::new(16)).unwrap();
        assert_eq!(restored.weights(), filt.weights());
    }

    #[test]
    fn rls_snapshot_carries_p_matrix() {
        let mut filt = Rls::new(RlsConfig::new(8));
        let block = vec![0.1f32; 16];
        filt.process_block(&block, &block);

        let snapshot = snapshot_rls(&filt, 2);
        let mut buf = Vec::new();
        snapshot.save(&mut buf).unwrap();
        let loaded = FilterSnapshot::load(&buf[..]).unwrap();
        assert_eq!(loaded.p.as_ref().unwrap().len(), 8 * 8);

        let restored = restore_rls(&loaded, RlsConfig::new(8)).unwrap();
        assert_eq!(restored.p_matrix(), filt.p_matrix());
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 32];
        assert!(matches!(FilterSnapshot::load(&buf[..]), Err(Error::BadMagic)));
    }

    #[test]
    fn validate_against_rejects_length_mismatch() {
        let filt = Nlms::new(NlmsConfig::new(16));
        let snapshot = snapshot_nlms(&filt, 0);
        assert!(matches!(
            snapshot.validate_against(32, 1),
            Err(Error::SnapshotLengthMismatch { expected: 32, snapshot: 16 })
        ));
    }

    #[test]
    fn validate_against_rejects_channel_mismatch() {
        let filt = Nlms::new(NlmsConfig::new(16));
        let snapshot = snapshot_nlms(&filt, 5);
        assert!(matches!(
            snapshot.validate_against(16, 2),
            Err(Error::SnapshotChannelMismatch { expected: 2, snapshot: 5 })
        ));
    }
}
