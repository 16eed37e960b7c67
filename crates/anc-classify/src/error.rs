use thiserror::Error;

/// Errors raised by model loading and classification.
#[derive(Debug, Error)]
pub enum Error {
    #[error("classifier model path does not exist: {0}")]
    ModelNotFound(String),

    #[error("classifier model is malformed: {0}")]
    MalformedModel(&'static str),

    #[error("model layer shape mismatch: expected input width {expected}, got {got}")]
    LayerShapeMismatch { expected: usize, got: usize },

    #[error("emergency set contains unknown label: {0}")]
    UnknownEmergencyLabel(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
