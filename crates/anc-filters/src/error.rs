use thiserror::Error;

/// Errors raised by filter construction and snapshot persistence.
#[derive(Debug, Error)]
pub enum Error {
    #[error("filter length must be positive")]
    ZeroLength,

    #[error("block length {got} does not match filter block size {expected}")]
    BlockLengthMismatch { expected: usize, got: usize },

    #[error("reference and desired blocks have different lengths ({reference} vs {desired})")]
    ReferenceDesiredLengthMismatch { reference: usize, desired: usize },

    #[error("ANCF snapshot has bad magic bytes")]
    BadMagic,

    #[error("ANCF snapshot version {0} is not supported")]
    UnsupportedVersion(u16),

    #[error("ANCF snapshot algorithm id {0} is not recognised")]
    UnknownAlgorithmId(u16),

    #[error("snapshot algorithm does not match the filter being restored")]
    AlgorithmMismatch,

    #[error("snapshot filter length {snapshot} does not match session configuration {expected}")]
    SnapshotLengthMismatch { expected: u32, snapshot: u32 },

    #[error("snapshot channel count {snapshot} does not match session configuration {expected}")]
    SnapshotChannelMismatch { expected: u32, snapshot: u32 },

    #[error("snapshot is truncated or malformed: {0}")]
    Truncated(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
