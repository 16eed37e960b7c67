//! A [`Classifier`] whose output is driven externally rather than
//! computed from features.
//!
//! An untrained `Shallow`/`Deep` backend (the default when no
//! `classifier_model_path` is configured) has no reliable opinion on
//! synthetic test/demo audio, so it cannot be used to exercise the
//! emergency-bypass wiring (§4.6 step 2, §4.4) deterministically. This
//! classifier instead reports whatever its [`ScriptedClassifierHandle`]
//! was last told to, independent of the block it is handed — the same
//! role `ScriptedAudioDevice` plays on the device side.

use std::sync::Arc;

use parking_lot::Mutex;

use anc_classify::{ClassificationResult, Classifier};
use anc_dsp::FeatureVector;

/// Shared state between a [`ScriptedClassifier`] running on `T_classify`
/// and the [`ScriptedClassifierHandle`] a test or demo holds to drive it.
#[derive(Debug)]
struct Shared {
    current: Mutex<ClassificationResult>,
}

/// Classifies every block as whatever [`ScriptedClassifierHandle::set`]
/// last configured.
#[derive(Debug, Clone)]
pub struct ScriptedClassifier {
    shared: Arc<Shared>,
}

/// A cloneable handle to push new classification results into a running
/// [`ScriptedClassifier`] from outside `T_classify`.
#[derive(Debug, Clone)]
pub struct ScriptedClassifierHandle {
    shared: Arc<Shared>,
}

/// Builds a linked `(ScriptedClassifier, ScriptedClassifierHandle)` pair,
/// starting at `initial`.
pub fn scripted_classifier(initial: ClassificationResult) -> (ScriptedClassifier, ScriptedClassifierHandle) {
    let shared = Arc::new(Shared {
        current: Mutex::new(initial),
    });
    (
        ScriptedClassifier { shared: Arc::clone(&shared) },
        ScriptedClassifierHandle { shared },
    )
}

impl ScriptedClassifierHandle {
    /// Sets the result every subsequent `classify` call will return,
    /// until the next `set`.
    pub fn set(&self, result: ClassificationResult) {
        *self.shared.current.lock() = result;
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&mut self, _features: &FeatureVector) -> ClassificationResult {
        self.shared.current.lock().clone()
    }

    fn reset(&mut self) {}
}
