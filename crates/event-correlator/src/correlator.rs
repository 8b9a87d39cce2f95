//! Event Correlator
//!
//! Each device moves through `idle → open window → emit → idle`. A window
//! opens on the first event after idle and spans `correlation_window_secs`.
//! A second confirmed modality inside the span emits at once with strength
//! 1.0; otherwise the window is judged when it expires.

use std::collections::{BTreeMap, HashMap};

use data_validator::Validator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event::{AnomalyEvent, CorrelatedEvent, Modality};
use crate::window::{Closure, DeviceWindow};
use crate::CorrelationError;

/// Correlator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Span of one incident window in seconds
    pub correlation_window_secs: f64,
    /// Confidence floor for a modality to confirm an incident
    pub min_correlation_confidence: f64,
    /// Strength multiplier for single-modality windows
    pub single_modality_discount: f64,
    /// Events retained per device
    pub max_events_per_device: usize,
    /// Devices tracked before the least recently active is evicted
    pub max_devices: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            correlation_window_secs: 60.0,
            min_correlation_confidence: 0.5,
            single_modality_discount: 0.6,
            max_events_per_device: 256,
            max_devices: 10_000,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), CorrelationError> {
        if !(self.correlation_window_secs > 0.0 && self.correlation_window_secs.is_finite()) {
            return Err(CorrelationError::InvalidConfig(format!(
                "correlation window must be positive, got {}",
                self.correlation_window_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.min_correlation_confidence) {
            return Err(CorrelationError::InvalidConfig(format!(
                "min correlation confidence {} outside [0, 1]",
                self.min_correlation_confidence
            )));
        }
        if !(self.single_modality_discount > 0.0 && self.single_modality_discount <= 1.0) {
            return Err(CorrelationError::InvalidConfig(format!(
                "single modality discount {} outside (0, 1]",
                self.single_modality_discount
            )));
        }
        if self.max_events_per_device == 0 || self.max_devices == 0 {
            return Err(CorrelationError::InvalidConfig(
                "per-device and device-count bounds must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Operator view of correlator activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorStats {
    pub ingested: u64,
    pub rejected: u64,
    pub late: u64,
    /// Windows emitted at least once
    pub emitted: u64,
    pub multi_modal: u64,
    pub reemitted: u64,
    pub suppressed: u64,
    pub evicted_devices: u64,
    pub tracked_devices: usize,
    pub open_windows: usize,
    /// Multi-modal share of emitted windows
    pub correlation_rate: f64,
    /// Retained events per modality
    pub recent_by_modality: BTreeMap<Modality, usize>,
}

#[derive(Debug, Default)]
struct Counters {
    ingested: u64,
    rejected: u64,
    late: u64,
    emitted: u64,
    multi_modal: u64,
    reemitted: u64,
    suppressed: u64,
    evicted_devices: u64,
}

impl Counters {
    fn record_emission(&mut self, event: &CorrelatedEvent) {
        if event.revision > 0 {
            self.reemitted += 1;
            return;
        }
        self.emitted += 1;
        if event.is_multi_modal {
            self.multi_modal += 1;
        }
    }

    fn record_closure(
        &mut self,
        device: &str,
        closure: Option<Closure>,
    ) -> Option<CorrelatedEvent> {
        match closure? {
            Closure::Emitted(event) => {
                info!(
                    "Single-modality window {} on {} emitted (strength {:.2})",
                    event.id, device, event.correlation_strength
                );
                self.record_emission(&event);
                Some(event)
            }
            Closure::Suppressed => {
                debug!("Window on {} below confidence floor, suppressed", device);
                self.suppressed += 1;
                None
            }
            Closure::AlreadyEmitted => None,
        }
    }
}

/// Per-device cross-modal correlator
#[derive(Debug)]
pub struct EventCorrelator {
    config: CorrelationConfig,
    validator: Validator,
    devices: HashMap<String, DeviceWindow>,
    counters: Counters,
    next_window: u64,
    activity: u64,
    /// Incidents displaced by a later emission within the same `ingest`
    pending: Vec<CorrelatedEvent>,
}

impl EventCorrelator {
    /// Create a new correlator
    pub fn new(config: CorrelationConfig) -> Result<Self, CorrelationError> {
        config.validate()?;
        info!(
            "Creating event correlator (window {}s, floor {})",
            config.correlation_window_secs, config.min_correlation_confidence
        );
        Ok(Self {
            config,
            validator: Validator::default(),
            devices: HashMap::new(),
            counters: Counters::default(),
            next_window: 0,
            activity: 0,
            pending: Vec::new(),
        })
    }

    /// Add an event; returns an incident when this event completes one.
    ///
    /// The returned incident is either a multi-modal confirmation of the
    /// event's own window or the single-modality verdict on a window this
    /// event pushed past its span. When one call produces several incidents
    /// the latest is returned and the rest wait in [`Self::take_pending`].
    pub fn ingest(
        &mut self,
        event: AnomalyEvent,
    ) -> Result<Option<CorrelatedEvent>, CorrelationError> {
        if let Err(e) = event.validate(&self.validator) {
            self.counters.rejected += 1;
            return Err(e.into());
        }
        self.counters.ingested += 1;

        let span = self.config.correlation_window_secs;
        let device_name = event.device.clone();

        let mut emitted = Vec::new();
        if !self.devices.contains_key(&device_name) {
            emitted.extend(self.make_room());
        }

        self.activity += 1;
        let activity = self.activity;
        let next_window = &mut self.next_window;
        let device = self
            .devices
            .entry(device_name.clone())
            .or_insert_with(|| DeviceWindow::new(self.config.max_events_per_device));
        device.last_activity = activity;

        // Lateness is judged against this device's own stream only
        let late_bound = device.newest() - span;
        if event.timestamp < late_bound || event.timestamp <= device.closed_through() {
            debug!(
                "Late {} event for {} at {} dropped",
                event.modality, device_name, event.timestamp
            );
            self.counters.late += 1;
            return Ok(self.settle(emitted));
        }

        let expired = device
            .open
            .as_ref()
            .is_some_and(|open| event.timestamp > open.start + span);
        if expired {
            let closure = device.close(&device_name, &self.config);
            emitted.extend(self.counters.record_closure(&device_name, closure));
        }

        let timestamp = event.timestamp;
        device.insert(event);
        device.purge_before(device.newest() - span);
        device.attach(timestamp, || {
            *next_window += 1;
            format!("{}-{:06}", device_name, next_window)
        });

        if let Some(confirmed) = device.check_confirmation(&device_name, &self.config) {
            info!(
                "Multi-modal incident {} rev {} on {} ({:?})",
                confirmed.id, confirmed.revision, device_name, confirmed.modalities
            );
            self.counters.record_emission(&confirmed);
            emitted.push(confirmed);
        }

        Ok(self.settle(emitted))
    }

    /// Incidents produced by `ingest` but not returned by it, oldest first
    pub fn take_pending(&mut self) -> Vec<CorrelatedEvent> {
        std::mem::take(&mut self.pending)
    }

    fn settle(&mut self, mut emitted: Vec<CorrelatedEvent>) -> Option<CorrelatedEvent> {
        let latest = emitted.pop();
        self.pending.append(&mut emitted);
        latest
    }

    /// Close every window whose span ended before `now`
    pub fn expire(&mut self, now: f64) -> Vec<CorrelatedEvent> {
        let span = self.config.correlation_window_secs;

        let mut names: Vec<String> = self
            .devices
            .iter()
            .filter(|(_, d)| d.open.as_ref().is_some_and(|open| now > open.start + span))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        let mut out = self.take_pending();
        for name in &names {
            if let Some(device) = self.devices.get_mut(name) {
                let closure = device.close(name, &self.config);
                out.extend(self.counters.record_closure(name, closure));
            }
        }

        for device in self.devices.values_mut() {
            device.purge_before(now - span);
        }
        self.devices.retain(|_, d| !d.is_idle());
        out
    }

    /// Close all open windows (shutdown)
    pub fn flush(&mut self) -> Vec<CorrelatedEvent> {
        let mut names: Vec<String> = self
            .devices
            .iter()
            .filter(|(_, d)| d.open.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        let mut out = self.take_pending();
        for name in &names {
            if let Some(device) = self.devices.get_mut(name) {
                let closure = device.close(name, &self.config);
                out.extend(self.counters.record_closure(name, closure));
            }
        }
        if !out.is_empty() {
            info!("Flushed {} pending incidents", out.len());
        }
        out
    }

    /// Drop all state and counters
    pub fn reset(&mut self) {
        self.devices.clear();
        self.counters = Counters::default();
        self.next_window = 0;
        self.activity = 0;
        self.pending.clear();
    }

    /// Current activity summary
    pub fn stats(&self) -> CorrelatorStats {
        let mut recent_by_modality = BTreeMap::new();
        for event in self.devices.values().flat_map(|d| d.iter()) {
            *recent_by_modality.entry(event.modality).or_insert(0) += 1;
        }

        let c = &self.counters;
        CorrelatorStats {
            ingested: c.ingested,
            rejected: c.rejected,
            late: c.late,
            emitted: c.emitted,
            multi_modal: c.multi_modal,
            reemitted: c.reemitted,
            suppressed: c.suppressed,
            evicted_devices: c.evicted_devices,
            tracked_devices: self.devices.len(),
            open_windows: self.devices.values().filter(|d| d.open.is_some()).count(),
            correlation_rate: if c.emitted == 0 {
                0.0
            } else {
                c.multi_modal as f64 / c.emitted as f64
            },
            recent_by_modality,
        }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Evict the least recently active device when at the bound
    fn make_room(&mut self) -> Option<CorrelatedEvent> {
        if self.devices.len() < self.config.max_devices {
            return None;
        }
        let victim = self
            .devices
            .iter()
            .min_by_key(|(_, d)| d.last_activity)
            .map(|(name, _)| name.clone())?;

        warn!("Device bound {} reached, evicting {}", self.config.max_devices, victim);
        self.counters.evicted_devices += 1;
        let mut device = self.devices.remove(&victim)?;
        let closure = device.close(&victim, &self.config);
        self.counters.record_closure(&victim, closure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn correlator() -> EventCorrelator {
        EventCorrelator::new(CorrelationConfig::default()).unwrap()
    }

    fn event(ts: f64, modality: Modality, device: &str, confidence: f64) -> AnomalyEvent {
        AnomalyEvent::new(ts, modality, device, confidence)
    }

    #[test]
    fn test_same_modality_is_discounted() {
        let mut c = correlator();
        assert!(c.ingest(event(1000.0, Modality::Bgp, "leaf-07", 0.9)).unwrap().is_none());
        assert!(c.ingest(event(1005.0, Modality::Bgp, "leaf-07", 0.9)).unwrap().is_none());

        let flushed = c.flush();
        assert_eq!(flushed.len(), 1);
        let incident = &flushed[0];
        assert!(!incident.is_multi_modal);
        assert!(incident.correlation_strength < 1.0);
        assert!((incident.correlation_strength - 0.54).abs() < 1e-9);
        assert_eq!(incident.events.len(), 2);
    }

    #[test]
    fn test_cross_modal_emits_immediately() {
        let mut c = correlator();
        assert!(c.ingest(event(1000.0, Modality::Bgp, "leaf-07", 0.9)).unwrap().is_none());
        let incident = c
            .ingest(event(1005.0, Modality::Snmp, "leaf-07", 0.9))
            .unwrap()
            .unwrap();

        assert!(incident.is_multi_modal);
        assert_eq!(incident.correlation_strength, 1.0);
        assert_eq!(incident.revision, 0);
        assert_eq!(incident.time_window.start, 1000.0);
        assert_eq!(incident.time_window.end, 1005.0);

        // Already emitted; closing the window adds nothing
        assert!(c.flush().is_empty());
        assert_eq!(c.stats().correlation_rate, 1.0);
    }

    #[test]
    fn test_weak_second_modality_does_not_confirm() {
        let mut c = correlator();
        c.ingest(event(1000.0, Modality::Bgp, "leaf-07", 0.9)).unwrap();
        assert!(c.ingest(event(1010.0, Modality::Snmp, "leaf-07", 0.3)).unwrap().is_none());

        let flushed = c.flush();
        assert_eq!(flushed.len(), 1);
        assert!(!flushed[0].is_multi_modal);
        assert_eq!(flushed[0].modalities.len(), 2);
    }

    #[test]
    fn test_isolated_weak_event_suppressed() {
        let mut c = correlator();
        assert!(c.ingest(event(1000.0, Modality::Bgp, "spine-01", 0.4)).unwrap().is_none());
        assert!(c.expire(1100.0).is_empty());
        assert_eq!(c.stats().suppressed, 1);
        assert_eq!(c.stats().emitted, 0);
    }

    #[test]
    fn test_expiry_by_later_event() {
        let mut c = correlator();
        c.ingest(event(1000.0, Modality::Bgp, "leaf-07", 0.8)).unwrap();
        let closed = c
            .ingest(event(1070.0, Modality::Snmp, "leaf-07", 0.9))
            .unwrap()
            .unwrap();

        assert!(!closed.is_multi_modal);
        assert_eq!(closed.events.len(), 1);
        assert_eq!(closed.modalities.iter().next(), Some(&Modality::Bgp));
    }

    #[test]
    fn test_new_modality_reemits_same_id() {
        let mut c = correlator();
        c.ingest(event(1000.0, Modality::Bgp, "spine-02", 0.9)).unwrap();
        let first = c.ingest(event(1002.0, Modality::Snmp, "spine-02", 0.9)).unwrap().unwrap();
        assert!(c.ingest(event(1003.0, Modality::Snmp, "spine-02", 0.95)).unwrap().is_none());
        let second = c.ingest(event(1004.0, Modality::Trap, "spine-02", 0.7)).unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.revision, 1);
        assert_eq!(second.modalities.len(), 3);

        let stats = c.stats();
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.reemitted, 1);
    }

    #[test]
    fn test_out_of_order_event_joins_window() {
        let mut c = correlator();
        c.ingest(event(1005.0, Modality::Snmp, "edge-01", 0.9)).unwrap();
        let incident = c.ingest(event(1000.0, Modality::Bgp, "edge-01", 0.85)).unwrap().unwrap();

        assert_eq!(incident.time_window.start, 1000.0);
        assert_eq!(incident.events[0].modality, Modality::Bgp);
    }

    #[test]
    fn test_late_event_dropped() {
        let mut c = correlator();
        c.ingest(event(1000.0, Modality::Bgp, "edge-01", 0.9)).unwrap();
        c.ingest(event(1100.0, Modality::Bgp, "edge-01", 0.9)).unwrap();
        assert!(c.ingest(event(1020.0, Modality::Snmp, "edge-01", 0.9)).unwrap().is_none());
        assert_eq!(c.stats().late, 1);
    }

    #[test]
    fn test_invalid_event_rejected() {
        let mut c = correlator();
        let result = c.ingest(event(1000.0, Modality::Bgp, "", 0.9));
        assert!(matches!(result, Err(CorrelationError::Invalid(_))));
        assert_eq!(c.stats().rejected, 1);
    }

    #[test]
    fn test_devices_are_independent() {
        let mut c = correlator();
        c.ingest(event(1000.0, Modality::Bgp, "leaf-01", 0.9)).unwrap();
        assert!(c.ingest(event(1001.0, Modality::Snmp, "leaf-02", 0.9)).unwrap().is_none());
        assert_eq!(c.stats().open_windows, 2);
    }

    #[test]
    fn test_device_bound_evicts_oldest() {
        let config = CorrelationConfig {
            max_devices: 2,
            ..Default::default()
        };
        let mut c = EventCorrelator::new(config).unwrap();
        c.ingest(event(1000.0, Modality::Bgp, "leaf-01", 0.9)).unwrap();
        c.ingest(event(1001.0, Modality::Bgp, "leaf-02", 0.9)).unwrap();
        let evicted = c.ingest(event(1002.0, Modality::Bgp, "leaf-03", 0.9)).unwrap().unwrap();

        assert_eq!(evicted.primary_device, "leaf-01");
        let stats = c.stats();
        assert_eq!(stats.evicted_devices, 1);
        assert_eq!(stats.tracked_devices, 2);
    }

    #[test]
    fn test_expire_purges_idle_devices() {
        let mut c = correlator();
        c.ingest(event(1000.0, Modality::Trap, "tor-03", 0.7)).unwrap();
        let out = c.expire(1200.0);
        assert_eq!(out.len(), 1);
        assert_eq!(c.stats().tracked_devices, 0);

        // A purged device starts over
        assert!(c.ingest(event(1010.0, Modality::Snmp, "tor-03", 0.9)).unwrap().is_none());
        let stats = c.stats();
        assert_eq!(stats.late, 0);
        assert_eq!(stats.open_windows, 1);
    }

    #[test]
    fn test_lagging_collector_still_correlates() {
        let mut c = correlator();
        c.ingest(event(2000.0, Modality::Trap, "tor-01", 0.7)).unwrap();
        assert_eq!(c.expire(2000.0).len(), 0);

        // Another device's streams run 70s behind the sweep
        assert!(c.ingest(event(1930.0, Modality::Bgp, "tor-02", 0.9)).unwrap().is_none());
        let incident = c
            .ingest(event(1932.0, Modality::Snmp, "tor-02", 0.9))
            .unwrap()
            .unwrap();

        assert!(incident.is_multi_modal);
        assert_eq!(incident.primary_device, "tor-02");
        assert_eq!(c.stats().late, 0);
    }

    #[test]
    fn test_reset() {
        let mut c = correlator();
        c.ingest(event(1000.0, Modality::Bgp, "leaf-01", 0.9)).unwrap();
        c.reset();
        assert_eq!(c.stats(), CorrelatorStats::default());
    }

    #[test]
    fn test_invalid_config() {
        let config = CorrelationConfig {
            correlation_window_secs: 0.0,
            ..Default::default()
        };
        assert!(EventCorrelator::new(config).is_err());
    }

    proptest! {
        #[test]
        fn prop_separated_events_never_correlate(
            start in 1000.0f64..100_000.0,
            gap in 60.001f64..10_000.0,
            c1 in 0.51f64..1.0,
            c2 in 0.51f64..1.0,
        ) {
            let mut c = correlator();
            let mut out = Vec::new();
            out.extend(c.ingest(event(start, Modality::Bgp, "spine-01", c1)).unwrap());
            out.extend(c.ingest(event(start + gap, Modality::Snmp, "spine-01", c2)).unwrap());
            out.extend(c.flush());

            prop_assert_eq!(out.len(), 2);
            for incident in &out {
                prop_assert!(!incident.is_multi_modal);
                prop_assert_eq!(incident.events.len(), 1);
            }
        }
    }
}
