//! Descriptive Statistics for Series Windows

/// Standard deviations below this are treated as a flat baseline
pub const MIN_STD_DEV: f64 = 1e-9;

/// Summary statistics for a slice of observations
#[derive(Debug, Clone, Default)]
pub struct SeriesStats {
    /// Number of observations
    pub count: usize,
    /// Mean value
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
}

impl SeriesStats {
    /// Compute statistics from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let max = values.iter().cloned().fold(f64::MIN, f64::max);

        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        }
    }

    /// Whether the spread is too small to scale against
    pub fn is_flat(&self) -> bool {
        self.std_dev < MIN_STD_DEV
    }

    /// Z-score of a value relative to these statistics.
    ///
    /// A flat baseline yields 0 for an equal value and `f64::INFINITY` otherwise.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.is_flat() {
            if (value - self.mean).abs() > MIN_STD_DEV {
                return f64::INFINITY;
            }
            return 0.0;
        }
        (value - self.mean) / self.std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_computation() {
        let stats = SeriesStats::compute(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((stats.mean - 3.0).abs() < 0.001);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
    }

    #[test]
    fn test_std_dev_computation() {
        let stats = SeriesStats::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        // Std dev should be ~2.0 for this dataset
        assert!((stats.std_dev - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_z_score() {
        let stats = SeriesStats::compute(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // (10 - 3) / sqrt(2) ~ 4.95
        assert!(stats.z_score(10.0) > 4.9);
    }

    #[test]
    fn test_flat_baseline() {
        let stats = SeriesStats::compute(&[7.0; 6]);
        assert!(stats.is_flat());
        assert_eq!(stats.z_score(7.0), 0.0);
        assert!(stats.z_score(8.0).is_infinite());
    }

    #[test]
    fn test_empty_values() {
        let stats = SeriesStats::compute(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
    }
}
