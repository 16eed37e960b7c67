//! Noise classifier and emergency-sound detector (C3, C4) for the ANC
//! core.

#![deny(unsafe_code)]

mod classifier;
mod emergency;
mod error;
mod label;
mod model;

pub use classifier::{
    default_deep_classifier, default_shallow_classifier, Classifier, ClassificationResult, DeepClassifier,
    ShallowClassifier, DEEP_CONTEXT_FRAMES,
};
pub use emergency::{
    EmergencyConfig, EmergencyDetector, EmergencyEvent, EmergencyTransition, DEFAULT_HOLD_MS, DEFAULT_THETA_OFF,
    DEFAULT_THETA_ON,
};
pub use error::{Error, Result};
pub use label::{default_emergency_set, DEFAULT_LABELS, SILENCE_LABEL, UNKNOWN_LABEL};
pub use model::DenseNetwork;
