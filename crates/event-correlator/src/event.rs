//! Event types flowing into and out of the correlator

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use data_validator::{ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Telemetry modality an event was detected in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Routing update stream
    Bgp,
    /// Device-health polling
    Snmp,
    /// Asynchronous device traps
    Trap,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Bgp => "bgp",
            Modality::Snmp => "snmp",
            Modality::Trap => "trap",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bgp" => Ok(Modality::Bgp),
            "snmp" => Ok(Modality::Snmp),
            "trap" => Ok(Modality::Trap),
            other => Err(ValidationError::InvalidFormat(format!(
                "unknown modality {:?}",
                other
            ))),
        }
    }
}

/// Anomaly detected in a single modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Unix seconds
    pub timestamp: f64,
    pub modality: Modality,
    pub device: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// BGP neighbour the anomaly was observed on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub detected_series: BTreeSet<String>,
    #[serde(default)]
    pub raw_detail: serde_json::Value,
}

impl AnomalyEvent {
    /// Event with no interface, peer, series, or detail
    pub fn new(
        timestamp: f64,
        modality: Modality,
        device: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            timestamp,
            modality,
            device: device.into(),
            interface: None,
            peer: None,
            confidence,
            detected_series: BTreeSet::new(),
            raw_detail: serde_json::Value::Null,
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn with_series<I, S>(mut self, series: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detected_series.extend(series.into_iter().map(Into::into));
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.raw_detail = detail;
        self
    }

    /// Check fields before the event enters a window
    pub fn validate(&self, validator: &Validator) -> Result<(), ValidationError> {
        validator.validate_timestamp(self.timestamp)?;
        validator.validate_confidence(self.confidence)?;
        validator.validate_identifier("device", &self.device)?;
        if let Some(interface) = &self.interface {
            validator.validate_identifier("interface", interface)?;
        }
        if let Some(peer) = &self.peer {
            validator.validate_identifier("peer", peer)?;
        }
        if self.detected_series.iter().any(|s| s.trim().is_empty()) {
            return Err(ValidationError::InvalidFormat(
                "detected series names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Interface-level events locate the fault more precisely
    pub fn is_interface_level(&self) -> bool {
        self.interface.is_some()
    }
}

/// Closed time range covered by a correlated event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One possible fault location inside a device window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCandidate {
    pub device: String,
    pub interface: Option<String>,
    pub peer: Option<String>,
    pub confidence: f64,
    pub modality: Modality,
    pub timestamp: f64,
}

/// Incident assembled from one device window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedEvent {
    /// Stable for the lifetime of the window
    pub id: String,
    /// Bumped each time the window is re-emitted
    pub revision: u32,
    pub time_window: TimeWindow,
    pub modalities: BTreeSet<Modality>,
    pub is_multi_modal: bool,
    pub correlation_strength: f64,
    pub primary_device: String,
    pub primary_interface: Option<String>,
    pub primary_peer: Option<String>,
    pub max_confidence: f64,
    pub detected_series: BTreeSet<String>,
    /// Ranked best first
    pub candidates: Vec<LocationCandidate>,
    pub events: Vec<AnomalyEvent>,
}

impl CorrelatedEvent {
    /// Events contributed by one modality
    pub fn events_for(&self, modality: Modality) -> impl Iterator<Item = &AnomalyEvent> {
        self.events.iter().filter(move |e| e.modality == modality)
    }
}
