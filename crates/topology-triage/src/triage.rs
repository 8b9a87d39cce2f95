//! Topology Triage
//!
//! Converts a located anomaly into blast radius, criticality, and severity
//! using role heuristics from the topology table. No graph traversal: a
//! spine or edge device is assumed to carry every tor and server, and a tor
//! every server.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::role::{DeviceRole, FailureDomain, Priority, Severity};
use crate::table::TopologyTable;
use crate::TopologyError;

/// Triage thresholds and bonuses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Criticality points per unit of confidence
    pub confidence_weight: f64,
    pub multi_modal_bonus: f64,
    pub no_redundancy_bonus: f64,
    /// Minimum criticality for P1
    pub p1_threshold: f64,
    /// Minimum criticality for P2
    pub p2_threshold: f64,
    /// Anomaly confidence at which an urgent incident is expected to breach SLA
    pub sla_confidence: f64,
    /// Location confidence separating `error` from `warning` below critical
    pub error_confidence: f64,
    /// Affected devices at which a non-SPOF blast radius is network impacting
    pub network_impact_devices: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            confidence_weight: 2.0,
            multi_modal_bonus: 1.5,
            no_redundancy_bonus: 1.0,
            p1_threshold: 8.0,
            p2_threshold: 5.0,
            sla_confidence: 0.7,
            error_confidence: 0.8,
            network_impact_devices: 16,
        }
    }
}

impl TriageConfig {
    pub fn validate(&self) -> Result<(), TopologyError> {
        if !(self.p1_threshold > self.p2_threshold && self.p2_threshold > 0.0) {
            return Err(TopologyError::InvalidConfig(format!(
                "priority thresholds must satisfy p1 > p2 > 0, got {} and {}",
                self.p1_threshold, self.p2_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.error_confidence) {
            return Err(TopologyError::InvalidConfig(format!(
                "error confidence {} outside [0, 1]",
                self.error_confidence
            )));
        }
        Ok(())
    }
}

/// Where an anomaly is believed to be
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub device: String,
    pub interface: Option<String>,
    pub bgp_peer: Option<String>,
    /// Filled in by triage
    pub topology_role: Option<DeviceRole>,
    pub confidence: f64,
}

impl Location {
    pub fn device(device: impl Into<String>, confidence: f64) -> Self {
        Self {
            device: device.into(),
            interface: None,
            bgp_peer: None,
            topology_role: None,
            confidence,
        }
    }

    fn key(&self) -> (&str, Option<&str>, Option<&str>) {
        (
            self.device.as_str(),
            self.interface.as_deref(),
            self.bgp_peer.as_deref(),
        )
    }
}

/// Anomaly facts triage needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyData {
    /// Detector confidence, before location discounts
    pub confidence: f64,
    /// Unix seconds of the first contributing event
    pub first_seen: f64,
    /// Unix seconds at which triage runs
    pub observed_at: f64,
}

/// What the correlator knows about the incident
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub is_multi_modal: bool,
    pub correlation_strength: f64,
    /// Alternative locations from other modalities
    #[serde(default)]
    pub candidates: Vec<Location>,
}

/// Devices and services depending on the anomalous device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastRadius {
    pub affected_devices: usize,
    pub affected_services: Vec<String>,
    pub downstream_devices: Vec<String>,
    pub redundancy_available: bool,
    pub spof: bool,
    pub failure_domain: FailureDomain,
    pub impact_score: f64,
}

impl BlastRadius {
    /// Blast radius of an unresolved location
    pub fn none() -> Self {
        Self {
            affected_devices: 0,
            affected_services: Vec::new(),
            downstream_devices: Vec::new(),
            redundancy_available: true,
            spof: false,
            failure_domain: FailureDomain::Rack,
            impact_score: 0.0,
        }
    }
}

/// One contribution to the criticality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalityFactor {
    pub name: String,
    pub points: f64,
}

/// Operational urgency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criticality {
    /// 0 to 10
    pub score: f64,
    pub priority: Priority,
    pub factors: Vec<CriticalityFactor>,
    pub sla_breach_likely: bool,
    pub time_to_breach_min: Option<f64>,
}

/// Triage verdict for one located anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub location: Location,
    /// Best first
    pub ranked_predictions: Vec<Location>,
    pub blast_radius: BlastRadius,
    pub criticality: Criticality,
    pub severity: Severity,
}

/// Role-based triage engine
#[derive(Debug, Clone)]
pub struct TopologyTriage {
    table: TopologyTable,
    config: TriageConfig,
}

impl TopologyTriage {
    pub fn new(table: TopologyTable, config: TriageConfig) -> Result<Self, TopologyError> {
        config.validate()?;
        Ok(Self { table, config })
    }

    pub fn table(&self) -> &TopologyTable {
        &self.table
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Judge a located anomaly
    pub fn analyze(
        &self,
        anomaly: &AnomalyData,
        detected: &Location,
        context: Option<&CorrelationContext>,
    ) -> TriageResult {
        let ranked_predictions = self.rank_locations(detected, context);
        let location = ranked_predictions
            .first()
            .cloned()
            .unwrap_or_else(|| self.resolve(detected));

        let role = location.topology_role.unwrap_or(DeviceRole::Unknown);
        let blast_radius = self.blast_radius(role);
        let is_multi_modal = context.is_some_and(|c| c.is_multi_modal);
        let criticality = self.criticality(role, &blast_radius, anomaly, is_multi_modal);

        let network_impacting = self.is_network_impacting(&blast_radius);
        let severity = if network_impacting && criticality.priority.is_urgent() {
            Severity::Critical
        } else if location.confidence >= self.config.error_confidence {
            Severity::Error
        } else {
            Severity::Warning
        };

        debug!(
            "Triage {} ({}): affected={}, criticality={:.1} {}, severity={}",
            location.device,
            role,
            blast_radius.affected_devices,
            criticality.score,
            criticality.priority,
            severity
        );

        TriageResult {
            location,
            ranked_predictions,
            blast_radius,
            criticality,
            severity,
        }
    }

    /// SPOF or a downstream set large enough to affect the fabric
    pub fn is_network_impacting(&self, blast_radius: &BlastRadius) -> bool {
        blast_radius.spof || blast_radius.affected_devices >= self.config.network_impact_devices
    }

    /// Attach a role; unresolved devices lose half their confidence
    fn resolve(&self, location: &Location) -> Location {
        let role = self.table.role_of(&location.device);
        let confidence = if role == DeviceRole::Unknown {
            location.confidence / 2.0
        } else {
            location.confidence
        };
        Location {
            topology_role: Some(role),
            confidence: confidence.clamp(0.0, 1.0),
            ..location.clone()
        }
    }

    fn rank_locations(
        &self,
        detected: &Location,
        context: Option<&CorrelationContext>,
    ) -> Vec<Location> {
        let mut ranked: Vec<Location> = Vec::new();
        let candidates = std::iter::once(detected)
            .chain(context.into_iter().flat_map(|c| c.candidates.iter()));

        for candidate in candidates {
            let resolved = self.resolve(candidate);
            match ranked.iter_mut().find(|l| l.key() == resolved.key()) {
                Some(existing) if existing.confidence < resolved.confidence => *existing = resolved,
                Some(_) => {}
                None => ranked.push(resolved),
            }
        }

        ranked.sort_by(|a, b| {
            let rank = |l: &Location| l.topology_role.unwrap_or(DeviceRole::Unknown).rank();
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| rank(a).cmp(&rank(b)))
        });
        ranked
    }

    fn blast_radius(&self, role: DeviceRole) -> BlastRadius {
        if role == DeviceRole::Unknown {
            return BlastRadius::none();
        }

        let downstream_roles = role.downstream_roles();
        let downstream_devices = self.table.devices_with_roles(downstream_roles);
        let affected_devices = downstream_devices.len();
        let spof = role.is_single_point_of_failure();

        let mut service_roles = vec![role];
        service_roles.extend_from_slice(downstream_roles);
        let affected_services = self.table.services_of(&service_roles).into_iter().collect();

        let multiplier = self.table.policy(role).blast_multiplier;
        BlastRadius {
            affected_devices,
            affected_services,
            downstream_devices,
            redundancy_available: affected_devices < self.table.len(),
            spof,
            failure_domain: role.failure_domain(),
            impact_score: affected_devices as f64 * multiplier * if spof { 2.0 } else { 1.0 },
        }
    }

    fn criticality(
        &self,
        role: DeviceRole,
        blast_radius: &BlastRadius,
        anomaly: &AnomalyData,
        is_multi_modal: bool,
    ) -> Criticality {
        let mut factors = vec![
            CriticalityFactor {
                name: format!("{} role base", role),
                points: self.table.policy(role).criticality_base,
            },
            CriticalityFactor {
                name: "confidence".to_string(),
                points: anomaly.confidence.clamp(0.0, 1.0) * self.config.confidence_weight,
            },
        ];
        if is_multi_modal {
            factors.push(CriticalityFactor {
                name: "multi-modal confirmation".to_string(),
                points: self.config.multi_modal_bonus,
            });
        }
        if !blast_radius.redundancy_available {
            factors.push(CriticalityFactor {
                name: "no redundancy".to_string(),
                points: self.config.no_redundancy_bonus,
            });
        }

        let score = factors.iter().map(|f| f.points).sum::<f64>().clamp(0.0, 10.0);
        let priority = if score >= self.config.p1_threshold {
            Priority::P1
        } else if score >= self.config.p2_threshold {
            Priority::P2
        } else {
            Priority::P3
        };

        let elapsed_min = (anomaly.observed_at - anomaly.first_seen) / 60.0;
        let time_to_breach_min = if elapsed_min.is_finite() && elapsed_min >= 0.0 {
            Some((self.table.sla_window_minutes() - elapsed_min).max(0.0))
        } else {
            None
        };

        Criticality {
            score,
            priority,
            factors,
            sla_breach_likely: priority.is_urgent()
                && anomaly.confidence >= self.config.sla_confidence,
            time_to_breach_min,
        }
    }
}
