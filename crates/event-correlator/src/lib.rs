//! Cross-Modal Event Correlation
//!
//! Merges anomalies detected independently in different telemetry modalities
//! into one incident when they hit the same device within a bounded window:
//! - BGP (routing update discords)
//! - SNMP (device-health outliers)
//! - Traps (asynchronous device notifications)

mod correlator;
mod event;
mod window;

pub use correlator::{CorrelationConfig, CorrelatorStats, EventCorrelator};
pub use event::{AnomalyEvent, CorrelatedEvent, LocationCandidate, Modality, TimeWindow};

use data_validator::ValidationError;
use thiserror::Error;

/// Correlation error types
#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error("Invalid event: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Invalid correlator configuration: {0}")]
    InvalidConfig(String),
}
