//! Network Anomaly Triage Pipeline
//!
//! Wires the modality sources, the cross-modal correlator, topology triage
//! and alert assembly into one stream loop, and serves a small HTTP read API
//! over the resulting alerts.

pub mod api;
pub mod config;
pub mod engine;
pub mod input;
pub mod logging;
pub mod sources;

pub use api::{create_router, serve, AppState};
pub use config::PipelineConfig;
pub use engine::{describe_metrics, run, BgpBinMessage, Inbound, PipelineStats, TriagePipeline};
pub use input::{read_ndjson, ReadSummary};
pub use logging::init_logging;
pub use sources::{BgpSource, SnmpPoll, SnmpSource};

use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Validation(#[from] data_validator::ValidationError),

    #[error("Discord scoring error: {0}")]
    Discord(#[from] discord_engine::DiscordError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] outlier_classifier::ClassifierError),

    #[error("Correlation error: {0}")]
    Correlation(#[from] event_correlator::CorrelationError),

    #[error("Topology error: {0}")]
    Topology(#[from] topology_triage::TopologyError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed message: {0}")]
    Decode(#[from] serde_json::Error),
}
