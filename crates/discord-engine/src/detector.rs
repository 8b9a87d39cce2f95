//! Per-Series Discord Detector

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use series_buffer::{SeriesBuffer, SeriesSnapshot};
use tracing::{debug, info, warn};

use crate::mass::SlidingDistance;
use crate::statistics::SeriesStats;
use crate::DiscordError;

/// Upper bound on reported scores (flat baselines would otherwise be infinite)
pub const SCORE_CEILING: f64 = 100.0;

/// Scoring strategy for the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscordStrategy {
    /// Full pairwise subsequence distances (maximum nearest-neighbour distance)
    MatrixProfile,
    /// Mean shift of the trailing window against the preceding history
    RollingZScore,
}

/// Whether a result carries a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscordStatus {
    Active,
    InsufficientData,
}

/// Discord score for the latest observation of one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordResult {
    /// Discord score (≥ 0)
    pub score: f64,
    /// Whether the score exceeds the threshold
    pub is_discord: bool,
    /// `min(score / threshold, 1.0)`
    pub confidence: f64,
    /// Decision status
    pub status: DiscordStatus,
    /// Strategy that produced the score (`None` while data is insufficient)
    pub strategy: Option<DiscordStrategy>,
}

impl DiscordResult {
    /// Neutral result returned until enough history exists
    pub fn insufficient() -> Self {
        Self {
            score: 0.0,
            is_discord: false,
            confidence: 0.0,
            status: DiscordStatus::InsufficientData,
            strategy: None,
        }
    }

    /// Whether the result carries a decision
    pub fn is_active(&self) -> bool {
        self.status == DiscordStatus::Active
    }
}

/// Discord detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Subsequence length in bins
    pub window_size: usize,
    /// Buffer capacity as a multiple of the window size
    pub buffer_factor: usize,
    /// Score above which a window is a discord
    pub threshold: f64,
    /// Preferred strategy
    pub strategy: DiscordStrategy,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            buffer_factor: 4,
            threshold: 2.0,
            strategy: DiscordStrategy::MatrixProfile,
        }
    }
}

impl DiscordConfig {
    /// Buffer capacity per series
    pub fn capacity(&self) -> usize {
        self.window_size * self.buffer_factor
    }

    /// Observations required before scores are produced
    pub fn min_observations(&self) -> usize {
        self.window_size * 2 + 2
    }

    /// Check the configuration for internal consistency
    pub fn validate(&self) -> Result<(), DiscordError> {
        if self.window_size < 2 {
            return Err(DiscordError::InvalidConfig(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if self.capacity() < self.min_observations() {
            return Err(DiscordError::InvalidConfig(format!(
                "buffer capacity {} cannot hold the {} observations scoring needs",
                self.capacity(),
                self.min_observations()
            )));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(DiscordError::InvalidConfig(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Serialized detector history for warm restarts
#[derive(Debug, Serialize, Deserialize)]
struct DetectorState {
    window_size: usize,
    series: BTreeMap<String, SeriesSnapshot>,
}

/// Streaming discord detector holding one bounded buffer per series
#[derive(Debug)]
pub struct SeriesDiscordDetector {
    /// Configuration
    config: DiscordConfig,
    /// History per series name
    buffers: HashMap<String, SeriesBuffer>,
    /// Present when the matrix-profile strategy is selected
    distance: Option<SlidingDistance>,
    /// Number of times the primary strategy fell back
    fallback_count: u64,
}

impl SeriesDiscordDetector {
    /// Create a new detector
    pub fn new(config: DiscordConfig) -> Result<Self, DiscordError> {
        config.validate()?;
        info!(
            "Creating discord detector: window={}, capacity={}, threshold={}, strategy={:?}",
            config.window_size,
            config.capacity(),
            config.threshold,
            config.strategy
        );

        let distance = match config.strategy {
            DiscordStrategy::MatrixProfile => Some(SlidingDistance::new()),
            DiscordStrategy::RollingZScore => None,
        };

        Ok(Self {
            config,
            buffers: HashMap::new(),
            distance,
            fallback_count: 0,
        })
    }

    /// Append an observation and score the series
    pub fn update(&mut self, series: &str, value: f64) -> DiscordResult {
        if !value.is_finite() {
            warn!("Ignoring non-finite value for series {}", series);
            return self.evaluate(series);
        }

        if !self.buffers.contains_key(series) {
            match SeriesBuffer::new(self.config.capacity()) {
                Ok(buffer) => {
                    debug!("Tracking new series {}", series);
                    self.buffers.insert(series.to_string(), buffer);
                }
                Err(e) => {
                    warn!("Cannot allocate buffer for {}: {}", series, e);
                    return DiscordResult::insufficient();
                }
            }
        }

        if let Some(buffer) = self.buffers.get_mut(series) {
            buffer.push(value);
        }
        self.evaluate(series)
    }

    /// Score the current contents of a series without adding data
    pub fn evaluate(&mut self, series: &str) -> DiscordResult {
        let values = match self.buffers.get(series) {
            Some(buffer) if buffer.len() >= self.config.min_observations() => buffer.to_vec(),
            _ => return DiscordResult::insufficient(),
        };
        let window = self.config.window_size;

        let (score, strategy) = match self.distance.as_mut() {
            Some(distance) => match matrix_profile_score(distance, &values, window) {
                Ok(score) => (score, DiscordStrategy::MatrixProfile),
                Err(e) => {
                    self.fallback_count += 1;
                    debug!("Matrix profile failed for {} ({}), using z-score", series, e);
                    (rolling_zscore(&values, window), DiscordStrategy::RollingZScore)
                }
            },
            None => (rolling_zscore(&values, window), DiscordStrategy::RollingZScore),
        };

        DiscordResult {
            score,
            is_discord: score > self.config.threshold,
            confidence: (score / self.config.threshold).min(1.0),
            status: DiscordStatus::Active,
            strategy: Some(strategy),
        }
    }

    /// Number of buffered observations for a series
    pub fn series_len(&self, series: &str) -> usize {
        self.buffers.get(series).map(|b| b.len()).unwrap_or(0)
    }

    /// Names of all tracked series
    pub fn series_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.buffers.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Times the primary strategy failed and the z-score was used instead
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count
    }

    /// Get the configuration
    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    /// Drop the history of one series
    pub fn reset_series(&mut self, series: &str) {
        if let Some(buffer) = self.buffers.get_mut(series) {
            buffer.clear();
        }
    }

    /// Drop all history
    pub fn reset(&mut self) {
        info!("Resetting discord detector ({} series)", self.buffers.len());
        self.buffers.clear();
        self.fallback_count = 0;
    }

    /// Encode all series history with postcard
    pub fn save_state(&self) -> Result<Vec<u8>, DiscordError> {
        let state = DetectorState {
            window_size: self.config.window_size,
            series: self
                .buffers
                .iter()
                .map(|(name, buffer)| (name.clone(), buffer.snapshot()))
                .collect(),
        };
        postcard::to_allocvec(&state).map_err(|e| DiscordError::StateEncoding(e.to_string()))
    }

    /// Replace all series history with a state produced by [`Self::save_state`]
    pub fn restore_state(&mut self, bytes: &[u8]) -> Result<(), DiscordError> {
        let state: DetectorState =
            postcard::from_bytes(bytes).map_err(|e| DiscordError::StateEncoding(e.to_string()))?;

        if state.window_size != self.config.window_size {
            return Err(DiscordError::InvalidConfig(format!(
                "state window {} does not match configured window {}",
                state.window_size, self.config.window_size
            )));
        }

        let mut buffers = HashMap::with_capacity(state.series.len());
        for (name, snapshot) in state.series {
            if snapshot.capacity != self.config.capacity() {
                return Err(DiscordError::InvalidConfig(format!(
                    "series {} has capacity {}, expected {}",
                    name,
                    snapshot.capacity,
                    self.config.capacity()
                )));
            }
            buffers.insert(name, SeriesBuffer::from_snapshot(&snapshot)?);
        }

        info!("Restored discord detector state ({} series)", buffers.len());
        self.buffers = buffers;
        Ok(())
    }
}

/// Largest nearest-neighbour distance, scaled by the spread of the history
/// preceding the trailing window
fn matrix_profile_score(
    distance: &mut SlidingDistance,
    values: &[f64],
    window: usize,
) -> Result<f64, DiscordError> {
    let baseline = SeriesStats::compute(&values[..values.len() - window]);
    if baseline.is_flat() {
        return Err(DiscordError::DegenerateBaseline(baseline.std_dev));
    }

    let profile = distance.matrix_profile(values, window)?;
    let score = profile.discord_distance / baseline.std_dev;
    if !score.is_finite() {
        return Err(DiscordError::NonFinite);
    }
    Ok(score.min(SCORE_CEILING))
}

/// Absolute z-score of the trailing window mean against the history before it
fn rolling_zscore(values: &[f64], window: usize) -> f64 {
    let split = values.len().saturating_sub(window);
    let history = SeriesStats::compute(&values[..split]);
    let recent = SeriesStats::compute(&values[split..]);

    let z = history.z_score(recent.mean).abs();
    if z.is_finite() {
        z.min(SCORE_CEILING)
    } else {
        SCORE_CEILING
    }
}
