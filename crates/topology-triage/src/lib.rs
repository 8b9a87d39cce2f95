//! Topology-Aware Triage
//!
//! Role lookup, blast radius, criticality, and severity for a located
//! anomaly. Roles and policies come from a static table loaded at startup.

mod role;
mod table;
mod triage;

pub use role::{DeviceRole, FailureDomain, Priority, RolePolicy, Severity};
pub use table::TopologyTable;
pub use triage::{
    AnomalyData, BlastRadius, CorrelationContext, Criticality, CriticalityFactor, Location,
    TopologyTriage, TriageConfig, TriageResult,
};

use thiserror::Error;

/// Topology error types
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Unknown device role: {0}")]
    UnknownRole(String),

    #[error("Invalid topology table: {0}")]
    InvalidTable(String),

    #[error("Invalid triage configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load topology: {0}")]
    Load(#[from] config::ConfigError),
}
