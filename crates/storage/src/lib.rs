//! Storage Layer
//!
//! Keeps recent alerts in memory with bounded retention and tracks operator
//! acknowledgment outside the immutable alert itself.

mod alert_store;

pub use alert_store::{AlertStore, SeverityCounts, StoredAlert};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store lock poisoned: {0}")]
    Lock(String),
    #[error("Alert {0} not found")]
    NotFound(String),
    #[error("Alert {0} already stored")]
    Duplicate(String),
}
