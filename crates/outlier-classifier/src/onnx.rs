//! ONNX model backend
//!
//! The model takes a `[1, n]` f32 tensor of features in `feature_names` order
//! and returns `n` per-feature outlier contributions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::{ClassifierError, FeatureVector, OutlierClassifier, OutlierPrediction};

/// ONNX backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnnxConfig {
    /// Path to the exported model
    pub model_path: Option<PathBuf>,
    /// Feature order the model was trained with
    pub feature_names: Vec<String>,
    /// Mean contribution above which the vector is an outlier
    pub score_threshold: f64,
    /// Contribution above which a feature is reported as affected
    pub feature_threshold: f64,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            feature_names: [
                "if_in_errors",
                "if_out_errors",
                "if_in_discards",
                "crc_errors",
                "util_pct",
                "cpu_pct",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            score_threshold: 1.0,
            feature_threshold: 1.0,
        }
    }
}

/// Outlier classifier backed by an ONNX model run through tract
pub struct OnnxClassifier {
    model: TypedRunnableModel<TypedModel>,
    feature_names: Vec<String>,
    score_threshold: f64,
    feature_threshold: f64,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("feature_names", &self.feature_names)
            .field("score_threshold", &self.score_threshold)
            .finish_non_exhaustive()
    }
}

impl OnnxClassifier {
    /// Load and optimize the model at `path`
    pub fn load(path: &Path, config: &OnnxConfig) -> Result<Self, ClassifierError> {
        let dim = config.feature_names.len();
        if dim == 0 {
            return Err(ClassifierError::InvalidConfig(
                "model needs at least one feature".to_string(),
            ));
        }
        if !(config.score_threshold > 0.0 && config.feature_threshold > 0.0) {
            return Err(ClassifierError::InvalidConfig(
                "model thresholds must be positive".to_string(),
            ));
        }

        info!("Loading outlier model from {}", path.display());
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, dim]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| ClassifierError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            model,
            feature_names: config.feature_names.clone(),
            score_threshold: config.score_threshold,
            feature_threshold: config.feature_threshold,
        })
    }

    /// Reorder the input to the model's feature order
    fn input_tensor(&self, features: &FeatureVector) -> Result<Tensor, ClassifierError> {
        let values = self
            .feature_names
            .iter()
            .map(|name| {
                features
                    .get(name)
                    .map(|v| v as f32)
                    .ok_or_else(|| ClassifierError::MissingFeature(name.clone()))
            })
            .collect::<Result<Vec<f32>, _>>()?;

        tract_ndarray::Array2::from_shape_vec((1, values.len()), values)
            .map(Tensor::from)
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))
    }
}

impl OutlierClassifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn predict(&self, features: &FeatureVector) -> Result<OutlierPrediction, ClassifierError> {
        let input = self.input_tensor(features)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;

        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;
        let contributions: Vec<f64> = view.iter().map(|v| f64::from(*v)).collect();

        if contributions.len() != self.feature_names.len() {
            return Err(ClassifierError::InvalidOutput {
                expected: self.feature_names.len(),
                actual: contributions.len(),
            });
        }

        let prediction = score_contributions(
            &self.feature_names,
            &contributions,
            self.score_threshold,
            self.feature_threshold,
        );
        debug!(
            "Model score {:.3} ({} affected features)",
            prediction.score,
            prediction.affected_features.len()
        );
        Ok(prediction)
    }
}

/// Turn per-feature contributions into a prediction
fn score_contributions(
    names: &[String],
    contributions: &[f64],
    score_threshold: f64,
    feature_threshold: f64,
) -> OutlierPrediction {
    if contributions.is_empty() {
        return OutlierPrediction::normal(0.0);
    }
    let score = contributions.iter().sum::<f64>() / contributions.len() as f64;

    let mut affected: Vec<(&String, f64)> = names
        .iter()
        .zip(contributions.iter().copied())
        .filter(|(_, c)| *c > feature_threshold)
        .collect();
    affected.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let is_anomaly = score > score_threshold;
    OutlierPrediction {
        is_anomaly,
        score,
        confidence: if is_anomaly {
            (score / (2.0 * score_threshold)).clamp(0.5, 1.0)
        } else {
            0.0
        },
        affected_features: affected.into_iter().map(|(n, _)| n.clone()).collect(),
    }
}
