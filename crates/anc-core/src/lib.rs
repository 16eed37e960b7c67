//! Pipeline supervisor and session state machine (C6): ties the feature
//! extraction and ring buffer of `anc-dsp`, the adaptive filter bank of
//! `anc-filters`, and the classifier/emergency detector of `anc-classify`
//! into one externally controllable session, plus the capability traits
//! a host implements to supply real audio and observe real metrics.

pub mod config;
pub mod device;
pub mod error;
pub mod mailbox;
pub mod metrics;
pub mod scripted_classifier;
pub mod session;

pub use anc_classify::{ClassificationResult, Classifier};
pub use config::{AlgorithmChoice, Config, EmergencyConfig};
pub use device::{AudioDevice, NullAudioDevice, RecordedOutputs, ScriptedAudioDevice};
pub use error::{Error, ErrorKind, Result};
pub use mailbox::{ClassifyMailbox, ClassifyRequest, DetectionPublisher, DetectionSnapshot};
pub use metrics::{
    cancellation_db, rms_to_db, EmergencyCallback, EmergencyNotification, MetricRecord,
    MetricsSink, NullMetricsSink, PipelineEvent, RecordingMetricsSink, SessionMetrics,
    SharedMetricsSink, CANCELLATION_DB_MAX,
};
pub use scripted_classifier::{scripted_classifier, ScriptedClassifier, ScriptedClassifierHandle};
pub use session::{Session, SessionState, Status};
