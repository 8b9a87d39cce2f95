//! Multi-Series Fusion
//!
//! Weighted combination of per-series discord results into one decision for
//! a modality. Only series with an active result take part, in both the
//! weighted sum and the weight normalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::DiscordResult;
use crate::feature_bin::{ANNOUNCEMENT_SERIES, FLAP_SERIES, PATH_CHURN_SERIES, WITHDRAWAL_SERIES};
use crate::DiscordError;

/// Fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Weight per known series (sums to 1.0)
    pub weights: BTreeMap<String, f64>,
    /// Weight for series missing from `weights`
    pub default_weight: f64,
    /// Fused score above which the modality is anomalous
    pub threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        let weights = [
            (WITHDRAWAL_SERIES, 0.40),
            (ANNOUNCEMENT_SERIES, 0.25),
            (FLAP_SERIES, 0.20),
            (PATH_CHURN_SERIES, 0.15),
        ]
        .into_iter()
        .map(|(name, w)| (name.to_string(), w))
        .collect();

        Self {
            weights,
            default_weight: 0.05,
            threshold: 2.0,
        }
    }
}

impl FusionConfig {
    /// Check weights and threshold
    pub fn validate(&self) -> Result<(), DiscordError> {
        if self.weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DiscordError::InvalidConfig(
                "fusion weights must be non-negative".to_string(),
            ));
        }
        let total: f64 = self.weights.values().sum();
        if !self.weights.is_empty() && (total - 1.0).abs() > 1e-6 {
            return Err(DiscordError::InvalidConfig(format!(
                "fusion weights sum to {}, expected 1.0",
                total
            )));
        }
        if !(self.default_weight > 0.0 && self.default_weight.is_finite()) {
            return Err(DiscordError::InvalidConfig(
                "default fusion weight must be positive".to_string(),
            ));
        }
        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(DiscordError::InvalidConfig(
                "fusion threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Weight applied to a series
    pub fn weight_of(&self, series: &str) -> f64 {
        self.weights
            .get(series)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

/// Fused decision for one modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionDecision {
    pub is_anomaly: bool,
    pub confidence: f64,
    pub score: f64,
    /// Series that contributed (status active)
    pub active_series: Vec<String>,
    /// Active series that individually fired, strongest weighted contribution first
    pub discord_series: Vec<String>,
}

impl FusionDecision {
    /// Decision when no series is active
    pub fn inactive() -> Self {
        Self {
            is_anomaly: false,
            confidence: 0.0,
            score: 0.0,
            active_series: Vec::new(),
            discord_series: Vec::new(),
        }
    }

    /// Series with the largest weighted contribution among those that fired
    pub fn dominant_series(&self) -> Option<&str> {
        self.discord_series.first().map(|s| s.as_str())
    }
}

/// Weighted fusion of per-series discord results
#[derive(Debug, Clone)]
pub struct MultiSeriesFusion {
    config: FusionConfig,
}

impl MultiSeriesFusion {
    /// Create a new fusion stage
    pub fn new(config: FusionConfig) -> Result<Self, DiscordError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Combine per-series results into one decision
    pub fn combine(&self, results: &BTreeMap<String, DiscordResult>) -> FusionDecision {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut active_series = Vec::new();
        let mut fired: Vec<(&str, f64)> = Vec::new();

        for (name, result) in results.iter().filter(|(_, r)| r.is_active()) {
            let weight = self.config.weight_of(name);
            weighted_sum += weight * result.score;
            weight_total += weight;
            active_series.push(name.clone());
            if result.is_discord {
                fired.push((name.as_str(), weight * result.score));
            }
        }

        if active_series.is_empty() || weight_total <= 0.0 {
            return FusionDecision::inactive();
        }

        fired.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let score = weighted_sum / weight_total;
        let decision = FusionDecision {
            is_anomaly: score > self.config.threshold,
            confidence: (score / self.config.threshold).min(1.0),
            score,
            active_series,
            discord_series: fired.into_iter().map(|(name, _)| name.to_string()).collect(),
        };

        debug!(
            "Fused {} active series: score={:.3}, anomaly={}",
            decision.active_series.len(),
            decision.score,
            decision.is_anomaly
        );
        decision
    }

    /// Get the configuration
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }
}

impl Default for MultiSeriesFusion {
    fn default() -> Self {
        Self {
            config: FusionConfig::default(),
        }
    }
}
