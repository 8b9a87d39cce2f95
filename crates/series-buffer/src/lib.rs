//! Series Ring Buffer
//!
//! Provides the fixed-capacity history buffer each discord detector keeps
//! per named series.

mod buffer;

pub use buffer::{SeriesBuffer, DEFAULT_CAPACITY};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the series buffer
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Buffer capacity must be greater than zero")]
    ZeroCapacity,
    #[error("Snapshot holds {values} values but capacity is {capacity}")]
    SnapshotOverflow { values: usize, capacity: usize },
    #[error("Snapshot encoding failed: {0}")]
    Encoding(String),
}

/// Serializable copy of a buffer's contents (oldest value first)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub capacity: usize,
    pub values: Vec<f64>,
}

impl SeriesSnapshot {
    /// Encode the snapshot with postcard
    pub fn to_bytes(&self) -> Result<Vec<u8>, BufferError> {
        postcard::to_allocvec(self).map_err(|e| BufferError::Encoding(e.to_string()))
    }

    /// Decode a snapshot previously produced by [`SeriesSnapshot::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BufferError> {
        postcard::from_bytes(bytes).map_err(|e| BufferError::Encoding(e.to_string()))
    }
}
