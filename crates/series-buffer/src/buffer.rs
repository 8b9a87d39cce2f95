//! Ring Buffer Implementation

use crate::{BufferError, SeriesSnapshot};

/// Default buffer capacity (window of 10 × factor 4)
pub const DEFAULT_CAPACITY: usize = 40;

/// Fixed-capacity ring buffer of observations for one series.
///
/// Writes never block: once full, each push overwrites the oldest value.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    /// Pre-allocated storage
    storage: Box<[f64]>,
    /// Index of the next write
    head: usize,
    /// Number of valid values
    len: usize,
    /// Total values written (for statistics)
    total_written: u64,
}

impl SeriesBuffer {
    /// Create a new buffer with given capacity
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            storage: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            total_written: 0,
        })
    }

    /// Create a buffer with default capacity
    pub fn with_default_capacity() -> Self {
        Self {
            storage: vec![0.0; DEFAULT_CAPACITY].into_boxed_slice(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push a value (overwrites oldest if full)
    pub fn push(&mut self, value: f64) {
        let capacity = self.capacity();
        self.storage[self.head] = value;
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
        self.total_written += 1;
    }

    /// Number of values currently held
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len as f64 / self.capacity() as f64
    }

    /// Most recent value, if any
    pub fn last(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let capacity = self.capacity();
        Some(self.storage[(self.head + capacity - 1) % capacity])
    }

    /// Read the last N values (most recent first)
    pub fn read_last(&self, count: usize) -> Vec<f64> {
        let capacity = self.capacity();
        let count = count.min(self.len);
        (1..=count)
            .map(|i| self.storage[(self.head + capacity - i) % capacity])
            .collect()
    }

    /// Contents in arrival order (oldest first)
    pub fn to_vec(&self) -> Vec<f64> {
        let capacity = self.capacity();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len)
            .map(|i| self.storage[(start + i) % capacity])
            .collect()
    }

    /// Get total values written (for statistics)
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Copy the buffer contents into a serializable snapshot
    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            capacity: self.capacity(),
            values: self.to_vec(),
        }
    }

    /// Rebuild a buffer from a snapshot
    pub fn from_snapshot(snapshot: &SeriesSnapshot) -> Result<Self, BufferError> {
        if snapshot.values.len() > snapshot.capacity {
            return Err(BufferError::SnapshotOverflow {
                values: snapshot.values.len(),
                capacity: snapshot.capacity,
            });
        }
        let mut buffer = Self::new(snapshot.capacity)?;
        for &value in &snapshot.values {
            buffer.push(value);
        }
        Ok(buffer)
    }
}

impl Default for SeriesBuffer {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
