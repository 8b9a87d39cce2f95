//! Alert Assembler
//!
//! Merges a correlated incident with its triage verdict into one operator
//! alert. Everything except the id is a pure function of the two inputs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use event_correlator::{CorrelatedEvent, Modality};
use serde::{Deserialize, Serialize};
use topology_triage::{
    BlastRadius, Criticality, DeviceRole, Location, Priority, Severity, TriageResult,
};
use tracing::info;

use crate::ids::IdGenerator;
use crate::knowledge::{recommended_actions, root_cause, RecommendedAction, RootCause, SignalFamily};

/// Operator-facing alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    /// Correlated incident this alert was built from
    pub incident_id: String,
    pub incident_revision: u32,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub priority: Priority,
    pub confidence: f64,
    pub location: Location,
    pub blast_radius: BlastRadius,
    pub criticality: Criticality,
    pub probable_root_cause: RootCause,
    pub supporting_evidence: Vec<String>,
    pub recommended_actions: Vec<RecommendedAction>,
    pub escalation_required: bool,
}

/// Builds alerts from correlated incidents and triage results
pub struct AlertAssembler {
    ids: Box<dyn IdGenerator>,
}

impl std::fmt::Debug for AlertAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertAssembler").finish_non_exhaustive()
    }
}

impl AlertAssembler {
    pub fn new(ids: Box<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// Assemble one alert
    pub fn assemble(&self, incident: &CorrelatedEvent, triage: &TriageResult) -> Alert {
        let timestamp = incident_time(incident);
        let role = triage.location.topology_role.unwrap_or(DeviceRole::Unknown);
        let family = dominant_family(incident);
        let cause = root_cause(family, role, incident.is_multi_modal);
        let peer = triage
            .location
            .bgp_peer
            .as_deref()
            .or(incident.primary_peer.as_deref());
        let actions =
            recommended_actions(cause.category, triage.location.interface.as_deref(), peer);

        let escalation_required =
            triage.severity == Severity::Critical || triage.criticality.priority == Priority::P1;

        let alert = Alert {
            alert_id: self.ids.next_id(timestamp),
            incident_id: incident.id.clone(),
            incident_revision: incident.revision,
            timestamp,
            severity: triage.severity,
            priority: triage.criticality.priority,
            confidence: triage.location.confidence,
            location: triage.location.clone(),
            blast_radius: triage.blast_radius.clone(),
            criticality: triage.criticality.clone(),
            supporting_evidence: evidence(incident, triage, role),
            probable_root_cause: cause,
            recommended_actions: actions,
            escalation_required,
        };

        info!(
            "Alert {} [{} {}] {}: {}",
            alert.alert_id,
            alert.severity,
            alert.priority,
            alert.location.device,
            alert.probable_root_cause.description
        );
        alert
    }
}

/// Latest event time of the incident
fn incident_time(incident: &CorrelatedEvent) -> DateTime<Utc> {
    let end = incident.time_window.end;
    let secs = end.floor();
    let nanos = ((end - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos).unwrap_or_default()
}

/// Family whose strongest event has the highest confidence
fn dominant_family(incident: &CorrelatedEvent) -> SignalFamily {
    let mut strength: BTreeMap<SignalFamily, f64> = BTreeMap::new();
    for event in &incident.events {
        for series in &event.detected_series {
            let entry = strength.entry(SignalFamily::of(series)).or_insert(0.0);
            *entry = entry.max(event.confidence);
        }
    }
    // Earlier families in declaration order win ties
    strength
        .into_iter()
        .filter(|(family, _)| *family != SignalFamily::Unknown)
        .fold(None, |best: Option<(SignalFamily, f64)>, (family, conf)| match best {
            Some((_, best_conf)) if best_conf >= conf => best,
            _ => Some((family, conf)),
        })
        .map(|(family, _)| family)
        .unwrap_or(SignalFamily::Unknown)
}

fn evidence(incident: &CorrelatedEvent, triage: &TriageResult, role: DeviceRole) -> Vec<String> {
    let mut lines = Vec::new();

    let modalities: Vec<&str> = incident.modalities.iter().map(Modality::as_str).collect();
    if incident.is_multi_modal {
        lines.push(format!(
            "Correlated across {} within {:.0}s (strength {:.2})",
            modalities.join(", "),
            incident.time_window.duration(),
            incident.correlation_strength
        ));
    } else {
        lines.push(format!(
            "Single-modality detection from {} (strength {:.2})",
            modalities.join(", "),
            incident.correlation_strength
        ));
    }

    for event in &incident.events {
        let series: Vec<&str> = event.detected_series.iter().map(String::as_str).collect();
        let mut line = format!(
            "{} anomaly at t={} (confidence {:.2})",
            event.modality, event.timestamp, event.confidence
        );
        if !series.is_empty() {
            line.push_str(&format!(": {}", series.join(", ")));
        }
        if let Some(interface) = &event.interface {
            line.push_str(&format!(" on {}", interface));
        }
        if let Some(peer) = &event.peer {
            line.push_str(&format!(" via peer {}", peer));
        }
        lines.push(line);
    }

    let blast = &triage.blast_radius;
    lines.push(format!(
        "{} role {}, {} downstream devices, failure domain {:?}{}",
        triage.location.device,
        role,
        blast.affected_devices,
        blast.failure_domain,
        if blast.spof { ", single point of failure" } else { "" }
    ));

    let factors: Vec<String> = triage
        .criticality
        .factors
        .iter()
        .map(|f| format!("{} {:+.1}", f.name, f.points))
        .collect();
    lines.push(format!(
        "Criticality {:.1} ({}): {}",
        triage.criticality.score,
        triage.criticality.priority,
        factors.join(", ")
    ));

    lines
}
