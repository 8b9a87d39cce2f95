//! FFT-based Subsequence Distances
//!
//! Distance profiles are computed with the sliding dot product (MASS):
//! `d²(q, t_s) = Σq² + Σt_s² − 2·(q · t_s)`, with every dot product of the
//! query against the series obtained from one FFT convolution.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::DiscordError;

/// Nearest-neighbour distances of every subsequence in a series
#[derive(Debug, Clone)]
pub struct MatrixProfile {
    /// Subsequence length
    pub window: usize,
    /// RMS distance from each subsequence to its nearest non-trivial match
    pub distances: Vec<f64>,
    /// Start index of the discord (largest nearest-neighbour distance)
    pub discord_index: usize,
    /// Nearest-neighbour distance of the discord
    pub discord_distance: f64,
}

/// Distance engine that caches FFT plans between calls
pub struct SlidingDistance {
    /// FFT planner for efficient computation
    planner: FftPlanner<f64>,
}

impl std::fmt::Debug for SlidingDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingDistance").finish_non_exhaustive()
    }
}

impl Default for SlidingDistance {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingDistance {
    /// Create a new distance engine
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Dot product of `query` with every length-`m` subsequence of `series`
    pub fn sliding_dot_product(&mut self, query: &[f64], series: &[f64]) -> Vec<f64> {
        let n = series.len();
        let m = query.len();
        if m == 0 || m > n {
            return Vec::new();
        }

        let size = 2 * n;
        let zero = Complex::new(0.0, 0.0);

        let mut series_buf: Vec<Complex<f64>> = series
            .iter()
            .map(|&v| Complex::new(v, 0.0))
            .chain(std::iter::repeat(zero).take(size - n))
            .collect();

        // Reversed query turns the convolution into a correlation
        let mut query_buf: Vec<Complex<f64>> = query
            .iter()
            .rev()
            .map(|&v| Complex::new(v, 0.0))
            .chain(std::iter::repeat(zero).take(size - m))
            .collect();

        let forward = self.planner.plan_fft_forward(size);
        forward.process(&mut series_buf);
        forward.process(&mut query_buf);

        let mut product: Vec<Complex<f64>> = series_buf
            .iter()
            .zip(query_buf.iter())
            .map(|(a, b)| a * b)
            .collect();

        let inverse = self.planner.plan_fft_inverse(size);
        inverse.process(&mut product);

        // rustfft leaves the inverse unnormalized
        (m - 1..n).map(|i| product[i].re / size as f64).collect()
    }

    /// Squared Euclidean distance from `query` to every subsequence of `series`
    pub fn distance_profile(
        &mut self,
        query: &[f64],
        series: &[f64],
        window_sums: &[f64],
    ) -> Result<Vec<f64>, DiscordError> {
        let query_sq: f64 = query.iter().map(|v| v * v).sum();
        let dots = self.sliding_dot_product(query, series);

        dots.iter()
            .zip(window_sums.iter())
            .map(|(&dot, &sum_sq)| {
                // FFT round-off can push exact matches slightly negative
                let d2 = (query_sq + sum_sq - 2.0 * dot).max(0.0);
                if d2.is_finite() {
                    Ok(d2)
                } else {
                    Err(DiscordError::NonFinite)
                }
            })
            .collect()
    }

    /// Compute the matrix profile of `series` for subsequence length `window`.
    ///
    /// Matches closer than `ceil(window / 2)` positions are trivial and excluded.
    pub fn matrix_profile(
        &mut self,
        series: &[f64],
        window: usize,
    ) -> Result<MatrixProfile, DiscordError> {
        let n = series.len();
        let needed = 2 * window + 2;
        if window < 2 || n < needed {
            return Err(DiscordError::TooShort { needed, have: n });
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(DiscordError::NonFinite);
        }

        let count = n - window + 1;
        let exclusion = (window + 1) / 2;
        let window_sums = Self::window_square_sums(series, window);

        let mut distances = Vec::with_capacity(count);
        for i in 0..count {
            let profile = self.distance_profile(&series[i..i + window], series, &window_sums)?;
            let nearest = profile
                .iter()
                .enumerate()
                .filter(|(j, _)| i.abs_diff(*j) >= exclusion)
                .map(|(_, &d2)| d2)
                .fold(f64::INFINITY, f64::min);

            if !nearest.is_finite() {
                return Err(DiscordError::NonFinite);
            }
            distances.push((nearest / window as f64).sqrt());
        }

        let (discord_index, discord_distance) = distances
            .iter()
            .cloned()
            .enumerate()
            .fold((0, 0.0), |best, (i, d)| if d > best.1 { (i, d) } else { best });

        Ok(MatrixProfile {
            window,
            distances,
            discord_index,
            discord_distance,
        })
    }

    /// Rolling sum of squares for every length-`window` subsequence
    fn window_square_sums(series: &[f64], window: usize) -> Vec<f64> {
        let mut prefix = Vec::with_capacity(series.len() + 1);
        prefix.push(0.0);
        for v in series {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + v * v);
        }
        (0..=series.len() - window)
            .map(|i| prefix[i + window] - prefix[i])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dot(query: &[f64], series: &[f64]) -> Vec<f64> {
        (0..=series.len() - query.len())
            .map(|s| query.iter().zip(&series[s..]).map(|(a, b)| a * b).sum())
            .collect()
    }

    #[test]
    fn test_sliding_dot_matches_naive() {
        let mut engine = SlidingDistance::new();
        let series: Vec<f64> = (0..32).map(|i| ((i * 7) % 11) as f64 - 3.0).collect();
        let query = &series[5..10];

        let fast = engine.sliding_dot_product(query, &series);
        let slow = naive_dot(query, &series);

        assert_eq!(fast.len(), slow.len());
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_periodic_series_has_zero_profile() {
        let mut engine = SlidingDistance::new();
        let series: Vec<f64> = (0..40).map(|i| (i % 4) as f64).collect();

        let profile = engine.matrix_profile(&series, 8).unwrap();

        assert_eq!(profile.distances.len(), 33);
        assert!(profile.discord_distance < 1e-6);
    }

    #[test]
    fn test_discord_located_at_anomaly() {
        let mut engine = SlidingDistance::new();
        let mut series: Vec<f64> = (0..40).map(|i| (i % 4) as f64).collect();
        series[39] += 12.0;

        let profile = engine.matrix_profile(&series, 8).unwrap();

        // Only the final subsequence contains the last point
        assert_eq!(profile.discord_index, 32);
        // RMS of a single 12.0 deviation over 8 points
        assert!((profile.discord_distance - 12.0 / 8f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_short_series_rejected() {
        let mut engine = SlidingDistance::new();
        let result = engine.matrix_profile(&[1.0; 10], 5);
        assert!(matches!(result, Err(DiscordError::TooShort { needed: 12, have: 10 })));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut engine = SlidingDistance::new();
        let mut series = vec![1.0; 30];
        series[3] = f64::NAN;
        assert!(matches!(engine.matrix_profile(&series, 5), Err(DiscordError::NonFinite)));
    }
}
