use thiserror::Error;

/// Errors raised by the ring buffer and feature extractor.
#[derive(Debug, Error)]
pub enum Error {
    #[error("block length {got} does not match the configured block size {expected}")]
    BlockLengthMismatch { expected: usize, got: usize },

    #[error("block contains a non-finite sample at index {index}")]
    NonFiniteSample { index: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
