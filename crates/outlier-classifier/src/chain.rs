//! Primary model with rule-based fallback

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use data_validator::Validator;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    ClassifierError, FeatureVector, OnnxClassifier, OnnxConfig, OutlierClassifier,
    OutlierPrediction, ThresholdClassifier, ThresholdConfig,
};

/// Classifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model: OnnxConfig,
    pub rules: ThresholdConfig,
}

/// Result of one classification
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub prediction: OutlierPrediction,
    /// Backend that produced the prediction
    pub classifier: String,
    /// Whether the rule fallback was used
    pub used_fallback: bool,
    pub latency_us: u64,
}

/// Runs the primary classifier and falls back to rules on failure
pub struct ClassifierChain {
    primary: Option<Box<dyn OutlierClassifier>>,
    fallback: ThresholdClassifier,
    validator: Validator,
    fallback_count: AtomicU64,
}

impl ClassifierChain {
    /// Chain with an explicit primary
    pub fn new(primary: Option<Box<dyn OutlierClassifier>>, fallback: ThresholdClassifier) -> Self {
        Self {
            primary,
            fallback,
            validator: Validator::default(),
            fallback_count: AtomicU64::new(0),
        }
    }

    /// Rules only
    pub fn rules_only(fallback: ThresholdClassifier) -> Self {
        Self::new(None, fallback)
    }

    /// Build from configuration.
    ///
    /// A model that fails to load is logged and skipped; the chain then runs
    /// on rules alone.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let fallback = ThresholdClassifier::new(config.rules.clone())?;

        let primary = match &config.model.model_path {
            Some(path) => match OnnxClassifier::load(path, &config.model) {
                Ok(model) => Some(Box::new(model) as Box<dyn OutlierClassifier>),
                Err(e) => {
                    warn!("Outlier model unavailable, using rules: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self::new(primary, fallback))
    }

    /// Whether a model backend is configured
    pub fn has_model(&self) -> bool {
        self.primary.is_some()
    }

    /// Number of predictions served by the fallback
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    /// Classify one feature vector
    pub fn classify(
        &self,
        features: &FeatureVector,
    ) -> Result<ClassificationOutcome, ClassifierError> {
        features.validate(&self.validator)?;
        let start = Instant::now();

        if let Some(primary) = &self.primary {
            match primary.predict(features) {
                Ok(prediction) => {
                    let latency_us = start.elapsed().as_micros() as u64;
                    debug!("{} classified in {}us", primary.name(), latency_us);
                    return Ok(ClassificationOutcome {
                        prediction,
                        classifier: primary.name().to_string(),
                        used_fallback: false,
                        latency_us,
                    });
                }
                Err(e) => warn!("{} failed, falling back to rules: {}", primary.name(), e),
            }
        }

        let prediction = self.fallback.predict(features)?;
        if self.primary.is_some() {
            self.fallback_count.fetch_add(1, Ordering::Relaxed);
        }

        Ok(ClassificationOutcome {
            prediction,
            classifier: self.fallback.name().to_string(),
            used_fallback: self.primary.is_some(),
            latency_us: start.elapsed().as_micros() as u64,
        })
    }
}

impl std::fmt::Debug for ClassifierChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierChain")
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .field("fallback_count", &self.fallback_count())
            .finish_non_exhaustive()
    }
}
