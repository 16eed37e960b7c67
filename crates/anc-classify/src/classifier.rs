//! Noise classifier (C3, §4.3): polymorphic over `Shallow` and `Deep`
//! backends behind one `Classifier` trait (§9 "express each as a
//! capability — a small trait/interface with fixed methods").

use std::collections::VecDeque;
use std::path::Path;

use anc_dsp::FeatureVector;

use crate::error::Result;
use crate::label::{DEFAULT_LABELS, SILENCE_LABEL, UNKNOWN_LABEL};
use crate::model::DenseNetwork;

/// `classify(features) -> (label, confidence, probs)` (§4.3). `probs`
/// sums to `1 ± 1e-3`; `label = argmax(probs)`; `confidence =
/// max(probs)`. Implementations must be deterministic and pure — no
/// hidden state may influence the *result* of a given input, though a
/// backend (e.g. `Deep`) may accumulate context across calls.
pub trait Classifier: Send {
    fn classify(&mut self, features: &FeatureVector) -> ClassificationResult;

    /// Resets any accumulated context (e.g. the `Deep` backend's
    /// spectrogram history).
    fn reset(&mut self);
}

/// Output of [`Classifier::classify`] (§4.1 "Detection result", minus
/// `block_seq` which the caller attaches).
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    pub probs: Vec<f32>,
}

impl ClassificationResult {
    fn from_probs(labels: &[String], probs: Vec<f32>) -> Self {
        let (best_idx, confidence) = probs
            .iter()
            .enumerate()
            .fold((0usize, f32::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
        let label = labels.get(best_idx).cloned().unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        Self { label, confidence, probs }
    }

    fn silence(num_classes: usize) -> Self {
        Self {
            label: SILENCE_LABEL.to_string(),
            confidence: 1.0,
            probs: vec![0.0; num_classes],
        }
    }

    fn unknown(num_classes: usize) -> Self {
        let uniform = if num_classes == 0 { 0.0 } else { 1.0 / num_classes as f32 };
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: uniform,
            probs: vec![uniform; num_classes],
        }
    }
}

fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

/// Shallow backend: the 168-d feature vector through a small dense
/// network (§4.3). Always available; the fallback target for `Deep`.
#[derive(Debug)]
pub struct ShallowClassifier {
    labels: Vec<String>,
    net: DenseNetwork,
}

impl ShallowClassifier {
    pub fn load(model_path: &Path, labels: Vec<String>) -> Result<Self> {
        let net = DenseNetwork::load(model_path)?;
        Ok(Self { labels, net })
    }

    /// Builds a classifier with a deterministic, untrained network —
    /// used by the `demos` dry-run mode and tests where no trained
    /// model artifact is available.
    pub fn untrained(labels: Vec<String>) -> Self {
        let net = DenseNetwork::untrained(anc_dsp::FEATURE_LEN, 64, labels.len());
        Self { labels, net }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Classifier for ShallowClassifier {
    fn classify(&mut self, features: &FeatureVector) -> ClassificationResult {
        if features.is_forced_silent() {
            return ClassificationResult::silence(self.labels.len());
        }
        let probs = self.net.predict(features.as_slice());
        if probs.iter().any(|p| !p.is_finite()) {
            return ClassificationResult::unknown(self.labels.len());
        }
        ClassificationResult::from_probs(&self.labels, probs)
    }

    fn reset(&mut self) {}
}

/// Deep backend: pools a rolling window of recent feature vectors into a
/// spectrogram-shaped context before running a deeper dense stack (§4.3
/// "used only when sufficient audio context is available; falls back to
/// Shallow on short blocks").
#[derive(Debug)]
pub struct DeepClassifier {
    labels: Vec<String>,
    context_frames: usize,
    history: VecDeque<Vec<f32>>,
    net: DenseNetwork,
    shallow_fallback: ShallowClassifier,
}

pub const DEEP_CONTEXT_FRAMES: usize = 128;

impl DeepClassifier {
    pub fn load(model_path: &Path, shallow_fallback: ShallowClassifier) -> Result<Self> {
        let labels = shallow_fallback.labels().to_vec();
        let net = DenseNetwork::load(model_path)?;
        Ok(Self {
            labels,
            context_frames: DEEP_CONTEXT_FRAMES,
            history: VecDeque::with_capacity(DEEP_CONTEXT_FRAMES),
            net,
            shallow_fallback,
        })
    }

    pub fn untrained(shallow_fallback: ShallowClassifier) -> Self {
        let labels = shallow_fallback.labels().to_vec();
        let input_width = DEEP_CONTEXT_FRAMES * anc_dsp::FEATURE_LEN;
        let net = DenseNetwork::untrained(input_width, 128, labels.len());
        Self {
            labels,
            context_frames: DEEP_CONTEXT_FRAMES,
            history: VecDeque::with_capacity(DEEP_CONTEXT_FRAMES),
            net,
            shallow_fallback,
        }
    }

    fn has_sufficient_context(&self) -> bool {
        self.history.len() >= self.context_frames
    }
}

impl Classifier for DeepClassifier {
    fn classify(&mut self, features: &FeatureVector) -> ClassificationResult {
        if features.is_forced_silent() {
            return ClassificationResult::silence(self.labels.len());
        }

        self.history.push_back(features.as_slice().to_vec());
        while self.history.len() > self.context_frames {
            self.history.pop_front();
        }

        if !self.has_sufficient_context() {
            return self.shallow_fallback.classify(features);
        }

        let flattened: Vec<f32> = self.history.iter().flatten().copied().collect();
        let probs = self.net.predict(&flattened);
        if probs.iter().any(|p| !p.is_finite()) {
            return ClassificationResult::unknown(self.labels.len());
        }
        ClassificationResult::from_probs(&self.labels, probs)
    }

    fn reset(&mut self) {
        self.history.clear();
        self.shallow_fallback.reset();
    }
}

/// Convenience constructor for the default label set, used by config
/// defaults and tests.
pub fn default_shallow_classifier() -> ShallowClassifier {
    ShallowClassifier::untrained(default_labels())
}

pub fn default_deep_classifier() -> DeepClassifier {
    DeepClassifier::untrained(default_shallow_classifier())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anc_dsp::FeatureVector;

    #[test]
    fn shallow_classifier_on_silence_forces_silence_label() {
        let mut clf = default_shallow_classifier();
        let result = clf.classify(&FeatureVector::silent());
        assert_eq!(result.label, SILENCE_LABEL);
        assert!((result.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shallow_classifier_probs_sum_to_one() {
        let mut clf = default_shallow_classifier();
        let features = FeatureVector::from_raw([0.2f32; anc_dsp::FEATURE_LEN]);
        let result = clf.classify(&features);
        let sum: f32 = result.probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
        assert_eq!(result.confidence, result.probs.iter().cloned().fold(f32::MIN, f32::max));
    }

    #[test]
    fn deep_classifier_falls_back_to_shallow_on_short_history() {
        let mut clf = default_deep_classifier();
        let features = FeatureVector::from_raw([0.1f32; anc_dsp::FEATURE_LEN]);
        // Only one call: far short of DEEP_CONTEXT_FRAMES, must fall back.
        let result = clf.classify(&features);
        assert_ne!(result.label, "");
        assert!((result.probs.iter().sum::<f32>() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn deep_classifier_runs_its_own_network_once_context_fills() {
        let mut clf = default_deep_classifier();
        let features = FeatureVector::from_raw([0.1f32; anc_dsp::FEATURE_LEN]);
        for _ in 0..DEEP_CONTEXT_FRAMES {
            clf.classify(&features);
        }
        let result = clf.classify(&features);
        assert!((result.probs.iter().sum::<f32>() - 1.0).abs() < 1e-3);
    }
}
