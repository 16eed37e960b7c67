//! The session-lifecycle error type and the §7 four-way error taxonomy.
//!
//! `anc_core::Error` wraps the lower crates' errors with `#[from]` and adds
//! the session/lifecycle-specific variants. Every variant answers `kind()`
//! so the pipeline supervisor can dispatch on §7's taxonomy (Transient /
//! Recoverable / Configuration / Fatal) uniformly, regardless of which
//! crate raised it.

use thiserror::Error;

/// §7's four-way error taxonomy. `Transient` and `Recoverable` never stop
/// a running session; `Configuration` fails `initialize`; `Fatal`
/// transitions the state machine to `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Recoverable,
    Configuration,
    Fatal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("dsp error: {0}")]
    Dsp(#[from] anc_dsp::Error),

    #[error("filter error: {0}")]
    Filter(#[from] anc_filters::Error),

    #[error("classifier error: {0}")]
    Classify(#[from] anc_classify::Error),

    #[error("configuration: sample_rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("configuration: block_size must be positive, got {0}")]
    InvalidBlockSize(usize),

    #[error("configuration: channels must be positive, got {0}")]
    InvalidChannelCount(usize),

    #[error("configuration: classifier model path does not exist: {0}")]
    MissingClassifierModel(String),

    #[error("configuration: device sample rate {device} does not match session sample rate {session}")]
    DeviceRateMismatch { device: u32, session: u32 },

    #[error("configuration: device block size {device} does not match session block size {session}")]
    DeviceBlockSizeMismatch { device: usize, session: usize },

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session is not running")]
    NotRunning,

    #[error("audio device failure: {0}")]
    DeviceFailure(String),

    #[error("session failed to stop within the 500ms cooperative-shutdown budget; threads detached")]
    StopTimedOut,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is malformed json: {0}")]
    ConfigJson(#[from] serde_json::Error),
}

impl Error {
    /// Classifies this error per §7. Lower-crate errors are always
    /// surfaced at `initialize` time in this codebase (model load, bad
    /// filter length), so they map to `Configuration`; anything raised
    /// mid-block by those crates is translated to a bypass decision
    /// before it ever becomes an `Error` (see `session::process_block`).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Dsp(_)
            | Error::Filter(_)
            | Error::Classify(_)
            | Error::InvalidSampleRate(_)
            | Error::InvalidBlockSize(_)
            | Error::InvalidChannelCount(_)
            | Error::MissingClassifierModel(_)
            | Error::DeviceRateMismatch { .. }
            | Error::DeviceBlockSizeMismatch { .. }
            | Error::ConfigJson(_) => ErrorKind::Configuration,

            Error::AlreadyRunning | Error::NotRunning => ErrorKind::Configuration,

            Error::DeviceFailure(_) | Error::StopTimedOut => ErrorKind::Fatal,

            Error::Io(_) => ErrorKind::Transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Recoverable
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_fail_before_start() {
        let err = Error::InvalidBlockSize(0);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.is_configuration());
    }

    #[test]
    fn device_failure_is_fatal() {
        let err = Error::DeviceFailure("usb disconnect".into());
        assert!(err.is_fatal());
    }
}
