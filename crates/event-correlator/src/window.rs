//! Per-device sliding window

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::correlator::CorrelationConfig;
use crate::event::{AnomalyEvent, CorrelatedEvent, LocationCandidate, Modality, TimeWindow};

/// Incident window currently open on a device
#[derive(Debug, Clone)]
pub(crate) struct OpenWindow {
    pub id: String,
    pub start: f64,
    pub revision: u32,
    /// Modalities covered by the last emission
    pub emitted: BTreeSet<Modality>,
}

impl OpenWindow {
    fn new(id: String, start: f64) -> Self {
        Self {
            id,
            start,
            revision: 0,
            emitted: BTreeSet::new(),
        }
    }
}

/// Outcome of closing a window
#[derive(Debug)]
pub(crate) enum Closure {
    Emitted(CorrelatedEvent),
    Suppressed,
    AlreadyEmitted,
}

/// Time-ordered event history for one device
#[derive(Debug)]
pub(crate) struct DeviceWindow {
    events: VecDeque<AnomalyEvent>,
    capacity: usize,
    newest: f64,
    /// Events at or before this instant belong to a closed window
    closed_through: f64,
    pub open: Option<OpenWindow>,
    pub last_activity: u64,
}

impl DeviceWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            newest: f64::NEG_INFINITY,
            closed_through: f64::NEG_INFINITY,
            open: None,
            last_activity: 0,
        }
    }

    pub fn newest(&self) -> f64 {
        self.newest
    }

    pub fn closed_through(&self) -> f64 {
        self.closed_through
    }

    pub fn is_idle(&self) -> bool {
        self.events.is_empty() && self.open.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnomalyEvent> {
        self.events.iter()
    }

    /// Insert in timestamp order, evicting the oldest when full
    pub fn insert(&mut self, event: AnomalyEvent) {
        let position = self
            .events
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.newest = self.newest.max(event.timestamp);
        self.events.insert(position, event);
        if self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Drop events older than `cutoff`
    pub fn purge_before(&mut self, cutoff: f64) {
        while self.events.front().is_some_and(|e| e.timestamp < cutoff) {
            self.events.pop_front();
        }
    }

    /// Attach `timestamp` to the open window, opening one if needed
    pub fn attach(&mut self, timestamp: f64, id: impl FnOnce() -> String) {
        match &mut self.open {
            Some(open) => open.start = open.start.min(timestamp),
            None => self.open = Some(OpenWindow::new(id(), timestamp)),
        }
    }

    /// Events inside the open window
    fn members(&self, span: f64) -> Vec<&AnomalyEvent> {
        match &self.open {
            Some(open) => self
                .events
                .iter()
                .filter(|e| e.timestamp >= open.start && e.timestamp <= open.start + span)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Emit the open window if a new modality confirmed a multi-modal incident
    pub fn check_confirmation(
        &mut self,
        device: &str,
        config: &CorrelationConfig,
    ) -> Option<CorrelatedEvent> {
        let members = self.members(config.correlation_window_secs);
        let modalities: BTreeSet<Modality> = members.iter().map(|e| e.modality).collect();
        if confirmed_modalities(&members, config.min_correlation_confidence) < 2 {
            return None;
        }

        let open = self.open.as_ref()?;
        if modalities.is_subset(&open.emitted) {
            return None;
        }
        let revision = if open.emitted.is_empty() {
            0
        } else {
            open.revision + 1
        };
        let event = build_event(device, &open.id, revision, &members, 1.0, true);

        if let Some(open) = self.open.as_mut() {
            open.revision = revision;
            open.emitted = modalities;
        }
        Some(event)
    }

    /// Close the open window; single-modality windows are emitted or suppressed here
    pub fn close(&mut self, device: &str, config: &CorrelationConfig) -> Option<Closure> {
        let span = config.correlation_window_secs;
        let members = self.members(span);
        let open = self.open.as_ref()?;

        let closure = if !open.emitted.is_empty() {
            Closure::AlreadyEmitted
        } else {
            let max_confidence = members.iter().map(|e| e.confidence).fold(0.0, f64::max);
            if members.is_empty() || max_confidence < config.min_correlation_confidence {
                Closure::Suppressed
            } else {
                let strength = (config.single_modality_discount * max_confidence).clamp(0.0, 1.0);
                Closure::Emitted(build_event(device, &open.id, 0, &members, strength, false))
            }
        };

        self.closed_through = self.closed_through.max(open.start + span);
        self.open = None;
        Some(closure)
    }
}

/// Modalities with at least one event above the confidence floor
fn confirmed_modalities(members: &[&AnomalyEvent], min_confidence: f64) -> usize {
    members
        .iter()
        .filter(|e| e.confidence > min_confidence)
        .map(|e| e.modality)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Rank: higher confidence, then interface-level, then earliest
fn rank(a: &AnomalyEvent, b: &AnomalyEvent) -> std::cmp::Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.is_interface_level().cmp(&a.is_interface_level()))
        .then_with(|| a.timestamp.total_cmp(&b.timestamp))
        .then_with(|| a.modality.cmp(&b.modality))
}

fn location_candidates(device: &str, members: &[&AnomalyEvent]) -> Vec<LocationCandidate> {
    let mut best: BTreeMap<(Option<&str>, Option<&str>), &AnomalyEvent> = BTreeMap::new();
    for &event in members {
        let key = (event.interface.as_deref(), event.peer.as_deref());
        best.entry(key)
            .and_modify(|current| {
                if rank(event, current).is_lt() {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    let mut ranked: Vec<&AnomalyEvent> = best.into_values().collect();
    ranked.sort_by(|a, b| rank(a, b));
    ranked
        .into_iter()
        .map(|e| LocationCandidate {
            device: device.to_string(),
            interface: e.interface.clone(),
            peer: e.peer.clone(),
            confidence: e.confidence,
            modality: e.modality,
            timestamp: e.timestamp,
        })
        .collect()
}

fn build_event(
    device: &str,
    id: &str,
    revision: u32,
    members: &[&AnomalyEvent],
    strength: f64,
    is_multi_modal: bool,
) -> CorrelatedEvent {
    let start = members.iter().map(|e| e.timestamp).fold(f64::INFINITY, f64::min);
    let end = members.iter().map(|e| e.timestamp).fold(f64::NEG_INFINITY, f64::max);
    let candidates = location_candidates(device, members);
    let primary = candidates.first();

    CorrelatedEvent {
        id: id.to_string(),
        revision,
        time_window: TimeWindow { start, end },
        modalities: members.iter().map(|e| e.modality).collect(),
        is_multi_modal,
        correlation_strength: strength,
        primary_device: device.to_string(),
        primary_interface: primary.and_then(|c| c.interface.clone()),
        primary_peer: primary.and_then(|c| c.peer.clone()),
        max_confidence: members.iter().map(|e| e.confidence).fold(0.0, f64::max),
        detected_series: members
            .iter()
            .flat_map(|e| e.detected_series.iter().cloned())
            .collect(),
        candidates,
        events: members.iter().map(|e| (*e).clone()).collect(),
    }
}
