//! Alert id generation

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Source of alert ids
pub trait IdGenerator: Send + Sync {
    /// Next id for an alert raised at `timestamp`
    fn next_id(&self, timestamp: DateTime<Utc>) -> String;
}

/// Monotonic counter with a timestamp suffix, e.g. `ALT-00000042-20260314T101500`
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 0)
    }

    /// Resume numbering after `last`
    pub fn starting_at(prefix: impl Into<String>, last: u64) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(last),
        }
    }

    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new("ALT")
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self, timestamp: DateTime<Utc>) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{:08}-{}", self.prefix, n, timestamp.format("%Y%m%dT%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::default();
        let ts = DateTime::from_timestamp(1_000_000, 0).unwrap();

        assert_eq!(ids.next_id(ts), "ALT-00000001-19700112T134640");
        assert_eq!(ids.next_id(ts), "ALT-00000002-19700112T134640");
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_resume_numbering() {
        let ids = SequentialIdGenerator::starting_at("NT", 41);
        let ts = DateTime::from_timestamp(0, 0).unwrap();
        assert!(ids.next_id(ts).starts_with("NT-00000042-"));
    }
}
