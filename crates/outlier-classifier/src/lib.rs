//! Outlier Classification
//!
//! The multivariate outlier model is trained elsewhere; this crate only
//! consumes it. [`OutlierClassifier`] is the seam, with an ONNX backend and a
//! rule-based backend used when the model is missing or fails.

mod chain;
mod onnx;
mod rules;

pub use chain::{ClassificationOutcome, ClassifierChain, ClassifierConfig};
pub use onnx::{OnnxClassifier, OnnxConfig};
pub use rules::{FeatureRule, ThresholdClassifier, ThresholdConfig};

use data_validator::{ValidationError, Validator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors during classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Feature {0} missing from input")]
    MissingFeature(String),
    #[error("Invalid model output: expected {expected} values, got {actual}")]
    InvalidOutput { expected: usize, actual: usize },
    #[error("Invalid classifier configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
}

/// Named feature values for one device poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Build a vector from `(name, value)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let (names, values) = pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self { names, values }
    }

    /// Check shape and values
    pub fn validate(&self, validator: &Validator) -> Result<(), ValidationError> {
        if self.names.is_empty() {
            return Err(ValidationError::MissingField("features"));
        }
        if self.names.len() != self.values.len() {
            return Err(ValidationError::InvalidFormat(format!(
                "{} feature names but {} values",
                self.names.len(),
                self.values.len()
            )));
        }
        for (name, value) in self.names.iter().zip(&self.values) {
            validator.validate_finite(name, *value)?;
        }
        Ok(())
    }

    /// Value of a named feature
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vector has no features
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Model output for one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierPrediction {
    pub is_anomaly: bool,
    pub score: f64,
    /// Confidence in the anomaly call (0.0 to 1.0)
    pub confidence: f64,
    /// Features driving the call, strongest first
    pub affected_features: Vec<String>,
}

impl OutlierPrediction {
    /// Prediction for an unremarkable input
    pub fn normal(score: f64) -> Self {
        Self {
            is_anomaly: false,
            score,
            confidence: 0.0,
            affected_features: Vec::new(),
        }
    }
}

/// Pre-trained multivariate outlier model
pub trait OutlierClassifier: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Classify one feature vector
    fn predict(&self, features: &FeatureVector) -> Result<OutlierPrediction, ClassifierError>;
}
