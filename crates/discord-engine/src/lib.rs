//! Discord Scoring Engine
//!
//! Maintains bounded per-series history, scores the most anomalous
//! subsequence (discord) of each series, and fuses per-series scores into a
//! single decision for one telemetry modality.

mod detector;
mod feature_bin;
mod fusion;
mod mass;
mod statistics;

pub use detector::{
    DiscordConfig, DiscordResult, DiscordStatus, DiscordStrategy, SeriesDiscordDetector,
};
pub use feature_bin::{
    FeatureBin, ANNOUNCEMENT_SERIES, BGP_SERIES, FLAP_SERIES, PATH_CHURN_SERIES, WITHDRAWAL_SERIES,
};
pub use fusion::{FusionConfig, FusionDecision, MultiSeriesFusion};
pub use mass::{MatrixProfile, SlidingDistance};
pub use statistics::SeriesStats;

use thiserror::Error;

/// Errors raised while configuring or running discord scoring
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Series needs at least {needed} values, has {have}")]
    TooShort { needed: usize, have: usize },
    #[error("Baseline is degenerate (std dev {0})")]
    DegenerateBaseline(f64),
    #[error("Distance computation produced a non-finite value")]
    NonFinite,
    #[error("Detector state error: {0}")]
    State(#[from] series_buffer::BufferError),
    #[error("Detector state encoding failed: {0}")]
    StateEncoding(String),
}
