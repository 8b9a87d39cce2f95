//! Field Validator for Range Checking

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Confidence valid range
    pub confidence_range: (f64, f64),
    /// Event timestamp valid range (unix seconds)
    pub timestamp_range: (f64, f64),
    /// Longest accepted identifier (device, interface, peer)
    pub max_identifier_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            confidence_range: (0.0, 1.0),
            timestamp_range: (0.0, 4_102_444_800.0), // 2100-01-01
            max_identifier_len: 253,
        }
    }
}

/// Field validator shared by bin and event ingestion
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite {
                field: field.to_string(),
            });
        }
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a confidence value
    pub fn validate_confidence(&self, confidence: f64) -> Result<(), ValidationError> {
        self.validate_range("confidence", confidence, self.config.confidence_range)
    }

    /// Validate an event timestamp
    pub fn validate_timestamp(&self, timestamp: f64) -> Result<(), ValidationError> {
        self.validate_range("timestamp", timestamp, self.config.timestamp_range)
    }

    /// Validate that a named measurement is finite
    pub fn validate_finite(&self, field: &str, value: f64) -> Result<(), ValidationError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(ValidationError::NonFinite {
                field: field.to_string(),
            })
        }
    }

    /// Validate a [start, end) interval
    pub fn validate_interval(&self, start: f64, end: f64) -> Result<(), ValidationError> {
        self.validate_timestamp(start)?;
        self.validate_timestamp(end)?;
        if end > start {
            Ok(())
        } else {
            Err(ValidationError::InvertedInterval { start, end })
        }
    }

    /// Validate a device, interface, or peer identifier
    pub fn validate_identifier(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<(), ValidationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField(field));
        }
        if trimmed.len() != value.len() || value.len() > self.config.max_identifier_len {
            debug!("Rejected {} identifier {:?}", field, value);
            return Err(ValidationError::InvalidFormat(format!(
                "{} identifier {:?} has surrounding whitespace or exceeds {} bytes",
                field, value, self.config.max_identifier_len
            )));
        }
        Ok(())
    }

    /// Validate that a series name belongs to the known set
    pub fn validate_series_name(
        &self,
        name: &str,
        known: &[&str],
    ) -> Result<(), ValidationError> {
        if known.contains(&name) {
            Ok(())
        } else {
            Err(ValidationError::UnknownSeries(name.to_string()))
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_confidence_range() {
        let validator = Validator::default();
        assert!(validator.validate_confidence(0.0).is_ok());
        assert!(validator.validate_confidence(1.0).is_ok());
        assert!(validator.validate_confidence(1.2).is_err());
        assert!(validator.validate_confidence(-0.1).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let validator = Validator::default();
        assert!(matches!(
            validator.validate_confidence(f64::NAN),
            Err(ValidationError::NonFinite { .. })
        ));
        assert!(validator.validate_finite("wdr_total", f64::INFINITY).is_err());
        assert!(validator.validate_finite("wdr_total", -3.0).is_ok());
    }

    #[test]
    fn test_interval() {
        let validator = Validator::default();
        assert!(validator.validate_interval(1000.0, 1030.0).is_ok());
        assert_eq!(
            validator.validate_interval(1030.0, 1030.0),
            Err(ValidationError::InvertedInterval {
                start: 1030.0,
                end: 1030.0
            })
        );
    }

    #[test]
    fn test_identifier() {
        let validator = Validator::default();
        assert!(validator.validate_identifier("device", "spine-01").is_ok());
        assert_eq!(
            validator.validate_identifier("device", "  "),
            Err(ValidationError::MissingField("device"))
        );
        assert!(validator.validate_identifier("device", " spine-01").is_err());
    }

    #[test]
    fn test_series_name() {
        let validator = Validator::default();
        let known = ["wdr_total", "ann_total"];
        assert!(validator.validate_series_name("wdr_total", &known).is_ok());
        assert_eq!(
            validator.validate_series_name("mystery", &known),
            Err(ValidationError::UnknownSeries("mystery".to_string()))
        );
    }

    proptest! {
        #[test]
        fn prop_confidence_accepts_unit_interval(value in 0.0f64..=1.0) {
            prop_assert!(Validator::default().validate_confidence(value).is_ok());
        }

        #[test]
        fn prop_confidence_rejects_above_one(value in 1.0001f64..1e6) {
            prop_assert!(Validator::default().validate_confidence(value).is_err());
        }
    }
}
