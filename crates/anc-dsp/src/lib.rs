//! Block ring buffer (C1) and feature extraction (C2) for the ANC core.
//!
//! This crate is pure signal processing: it owns no threads and makes no
//! policy decisions about emergencies or filtering. [`RingBuffer`] defines
//! the block cadence between capture and processor; [`FeatureExtractor`]
//! turns a block into the 168-d feature vector the classifier consumes.

pub mod block;
pub mod chroma;
pub mod error;
pub mod features;
pub mod mel;
pub mod ring_buffer;
pub mod spectral;
pub mod windowing;

pub use block::AudioBlock;
pub use error::{Error, Result};
pub use features::{FeatureExtractor, FeatureVector, FEATURE_LEN};
pub use ring_buffer::{PopOutcome, PushOutcome, RingBuffer, DEFAULT_CAPACITY, DEFAULT_POP_TIMEOUT};
