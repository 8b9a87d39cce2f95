//! Closed Feature Bins

use std::collections::BTreeMap;

use data_validator::{ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// BGP withdrawals per bin
pub const WITHDRAWAL_SERIES: &str = "wdr_total";
/// BGP announcements per bin
pub const ANNOUNCEMENT_SERIES: &str = "ann_total";
/// Session flaps per bin
pub const FLAP_SERIES: &str = "flap_count";
/// AS-path changes per bin
pub const PATH_CHURN_SERIES: &str = "as_path_churn";

/// Series produced by the BGP update aggregator
pub const BGP_SERIES: [&str; 4] = [
    WITHDRAWAL_SERIES,
    ANNOUNCEMENT_SERIES,
    FLAP_SERIES,
    PATH_CHURN_SERIES,
];

/// Aggregated counters for one fixed-duration bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBin {
    /// Bin start (unix seconds)
    pub bin_start: f64,
    /// Bin end (unix seconds, exclusive)
    pub bin_end: f64,
    /// Per-series totals across all peers
    pub totals: BTreeMap<String, f64>,
    /// Per-peer breakdown: peer → series → value
    #[serde(default)]
    pub per_peer: BTreeMap<String, BTreeMap<String, f64>>,
}

impl FeatureBin {
    /// Check interval ordering, series names and values against the known set
    pub fn validate(
        &self,
        validator: &Validator,
        known: &[&'static str],
    ) -> Result<(), ValidationError> {
        validator.validate_interval(self.bin_start, self.bin_end)?;

        for name in known {
            if !self.totals.contains_key(*name) {
                return Err(ValidationError::MissingField(*name));
            }
        }
        for (name, value) in &self.totals {
            validator.validate_series_name(name, known)?;
            validator.validate_finite(name, *value)?;
        }

        for (peer, series) in &self.per_peer {
            validator.validate_identifier("peer", peer)?;
            for (name, value) in series {
                validator.validate_series_name(name, known)?;
                validator.validate_finite(name, *value)?;
            }
        }
        Ok(())
    }

    /// Bin duration in seconds
    pub fn duration(&self) -> f64 {
        self.bin_end - self.bin_start
    }

    /// Total for a series, if present
    pub fn total(&self, series: &str) -> Option<f64> {
        self.totals.get(series).copied()
    }

    /// Peer with the largest value for a series (ties resolve to the lower name)
    pub fn dominant_peer(&self, series: &str) -> Option<&str> {
        self.per_peer
            .iter()
            .filter_map(|(peer, values)| values.get(series).map(|v| (peer.as_str(), *v)))
            .fold(None, |best: Option<(&str, f64)>, (peer, value)| match best {
                Some((_, top)) if top >= value => best,
                _ => Some((peer, value)),
            })
            .map(|(peer, _)| peer)
    }
}
