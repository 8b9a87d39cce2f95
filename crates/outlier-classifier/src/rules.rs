//! Rule-based outlier heuristics
//!
//! Used when no model is configured or the model fails. Each rule compares
//! one feature against a static limit.

use serde::{Deserialize, Serialize};

use crate::{ClassifierError, FeatureVector, OutlierClassifier, OutlierPrediction};

/// Static limit for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRule {
    pub feature: String,
    pub limit: f64,
}

impl FeatureRule {
    pub fn new(feature: impl Into<String>, limit: f64) -> Self {
        Self {
            feature: feature.into(),
            limit,
        }
    }
}

/// Rule set configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub rules: Vec<FeatureRule>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                FeatureRule::new("if_in_errors", 10.0),
                FeatureRule::new("if_out_errors", 10.0),
                FeatureRule::new("if_in_discards", 50.0),
                FeatureRule::new("crc_errors", 5.0),
                FeatureRule::new("util_pct", 90.0),
                FeatureRule::new("cpu_pct", 90.0),
                FeatureRule::new("oper_status_changes", 1.0),
            ],
        }
    }
}

/// Classifier that flags features exceeding their limit
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    rules: Vec<FeatureRule>,
}

impl ThresholdClassifier {
    /// Create from a rule set
    pub fn new(config: ThresholdConfig) -> Result<Self, ClassifierError> {
        if let Some(rule) = config
            .rules
            .iter()
            .find(|r| !(r.limit > 0.0 && r.limit.is_finite()))
        {
            return Err(ClassifierError::InvalidConfig(format!(
                "limit for {} must be positive, got {}",
                rule.feature, rule.limit
            )));
        }
        Ok(Self {
            rules: config.rules,
        })
    }

    /// Configured rules
    pub fn rules(&self) -> &[FeatureRule] {
        &self.rules
    }
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self {
            rules: ThresholdConfig::default().rules,
        }
    }
}

impl OutlierClassifier for ThresholdClassifier {
    fn name(&self) -> &str {
        "threshold"
    }

    fn predict(&self, features: &FeatureVector) -> Result<OutlierPrediction, ClassifierError> {
        let mut ratios: Vec<(&str, f64)> = self
            .rules
            .iter()
            .filter_map(|rule| {
                features
                    .get(&rule.feature)
                    .map(|v| (rule.feature.as_str(), v / rule.limit))
            })
            .collect();

        let score = ratios.iter().map(|(_, r)| *r).fold(0.0, f64::max);
        ratios.retain(|(_, r)| *r > 1.0);
        ratios.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        if ratios.is_empty() {
            return Ok(OutlierPrediction::normal(score));
        }

        Ok(OutlierPrediction {
            is_anomaly: true,
            score,
            confidence: (score / 2.0).clamp(0.5, 1.0),
            affected_features: ratios.into_iter().map(|(n, _)| n.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_limits() {
        let classifier = ThresholdClassifier::default();
        let features = FeatureVector::from_pairs([("if_in_errors", 2.0), ("cpu_pct", 35.0)]);

        let prediction = classifier.predict(&features).unwrap();
        assert!(!prediction.is_anomaly);
        assert_eq!(prediction.confidence, 0.0);
        assert!((prediction.score - 0.39).abs() < 0.01);
    }

    #[test]
    fn test_crc_storm_flagged() {
        let classifier = ThresholdClassifier::default();
        let features = FeatureVector::from_pairs([
            ("crc_errors", 9.0),
            ("if_in_errors", 15.0),
            ("cpu_pct", 20.0),
        ]);

        let prediction = classifier.predict(&features).unwrap();
        assert!(prediction.is_anomaly);
        // 9/5 = 1.8 beats 15/10 = 1.5
        assert_eq!(prediction.affected_features, vec!["crc_errors", "if_in_errors"]);
        assert!((prediction.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_features_ignored() {
        let classifier = ThresholdClassifier::default();
        let features = FeatureVector::from_pairs([("fan_rpm", 1e6)]);
        assert!(!classifier.predict(&features).unwrap().is_anomaly);
    }

    #[test]
    fn test_non_positive_limit_rejected() {
        let config = ThresholdConfig {
            rules: vec![FeatureRule::new("cpu_pct", 0.0)],
        };
        assert!(ThresholdClassifier::new(config).is_err());
    }
}
