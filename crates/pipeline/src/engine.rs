//! Triage Engine
//!
//! [`TriagePipeline`] is the single owner of all per-device state: modality
//! sources, the correlator, triage and the alert assembler. [`run`] drives
//! it from a bounded queue until the input ends or a shutdown signal arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alerting::{Alert, AlertAssembler, IdGenerator, SequentialIdGenerator};
use discord_engine::{DiscordConfig, FeatureBin, FusionConfig};
use event_correlator::{AnomalyEvent, CorrelatedEvent, CorrelatorStats, EventCorrelator};
use metrics::{counter, describe_counter};
use outlier_classifier::ClassifierChain;
use serde::{Deserialize, Serialize};
use storage::AlertStore;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use topology_triage::{AnomalyData, CorrelationContext, Location, TopologyTable, TopologyTriage};
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::config::PipelineConfig;
use crate::sources::{BgpSource, SnmpPoll, SnmpSource};
use crate::PipelineError;

/// Closed BGP bin for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpBinMessage {
    pub device: String,
    pub bin: FeatureBin,
}

/// One line of pipeline input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    /// Routing counters, scored by the device's discord detector
    BgpBin(BgpBinMessage),
    /// Device-health features, scored by the outlier classifier
    SnmpPoll(SnmpPoll),
    /// Event already scored upstream (e.g. a trap)
    Event(AnomalyEvent),
    /// Stream time has reached `timestamp`
    Watermark { timestamp: f64 },
}

/// Snapshot of pipeline activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub bins_processed: u64,
    pub polls_processed: u64,
    pub events_ingested: u64,
    pub events_rejected: u64,
    pub alerts_raised: u64,
    pub bgp_devices: usize,
    /// BGP sources dropped at the device bound
    pub bgp_evicted: u64,
    pub discord_fallbacks: u64,
    pub classifier_fallbacks: u64,
    /// Latest event time seen (unix seconds)
    pub watermark: f64,
    pub correlator: CorrelatorStats,
}

#[derive(Debug, Default)]
struct Counters {
    bins: u64,
    polls: u64,
    ingested: u64,
    rejected: u64,
    alerts: u64,
    bgp_evicted: u64,
    /// Fallbacks counted by sources since evicted
    retired_fallbacks: u64,
}

/// BGP source with its recency stamp
struct TrackedSource {
    source: BgpSource,
    last_used: u64,
}

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        "nettriage_events_ingested_total",
        "Anomaly events accepted by the correlator"
    );
    describe_counter!(
        "nettriage_events_rejected_total",
        "Inputs rejected by validation or decoding"
    );
    describe_counter!("nettriage_alerts_total", "Alerts raised, by severity");
    describe_counter!(
        "nettriage_discord_fallbacks_total",
        "Discord scores computed by the z-score fallback"
    );
}

/// Sources, correlator, triage and assembly in one owner
pub struct TriagePipeline {
    discord: DiscordConfig,
    fusion: FusionConfig,
    bgp: HashMap<String, TrackedSource>,
    max_bgp_devices: usize,
    bgp_activity: u64,
    snmp: SnmpSource,
    correlator: EventCorrelator,
    triage: TopologyTriage,
    assembler: AlertAssembler,
    store: Arc<AlertStore>,
    counters: Counters,
    watermark: f64,
}

impl TriagePipeline {
    /// Build every stage from configuration
    pub fn new(
        config: &PipelineConfig,
        table: TopologyTable,
        store: Arc<AlertStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        config.discord.validate()?;
        config.fusion.validate()?;

        let chain = ClassifierChain::from_config(&config.classifier)?;
        info!(
            "Triage pipeline ready: {} devices in topology, outlier model {}",
            table.len(),
            if chain.has_model() { "loaded" } else { "absent, rules only" }
        );

        Ok(Self {
            discord: config.discord.clone(),
            fusion: config.fusion.clone(),
            bgp: HashMap::new(),
            max_bgp_devices: config.max_bgp_devices,
            bgp_activity: 0,
            snmp: SnmpSource::new(chain),
            correlator: EventCorrelator::new(config.correlation.clone())?,
            triage: TopologyTriage::new(table, config.triage.clone())?,
            assembler: AlertAssembler::new(Box::new(SequentialIdGenerator::default())),
            store,
            counters: Counters::default(),
            watermark: f64::NEG_INFINITY,
        })
    }

    /// Replace the alert id source
    pub fn with_id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.assembler = AlertAssembler::new(ids);
        self
    }

    /// Handle one inbound message, returning any alerts it completes
    pub fn process(&mut self, message: Inbound) -> Result<Vec<Alert>, PipelineError> {
        let event = match message {
            Inbound::BgpBin(message) => {
                self.counters.bins += 1;
                self.process_bin(&message)
            }
            Inbound::SnmpPoll(poll) => {
                self.counters.polls += 1;
                self.snmp.process(&poll)
            }
            Inbound::Event(event) => Ok(Some(event)),
            Inbound::Watermark { timestamp } => return Ok(self.advance(timestamp)),
        };

        match event {
            Ok(Some(event)) => self.ingest(event),
            Ok(None) => Ok(Vec::new()),
            Err(e) => {
                self.record_rejection();
                Err(e)
            }
        }
    }

    /// Pass one event to the correlator
    pub fn ingest(&mut self, event: AnomalyEvent) -> Result<Vec<Alert>, PipelineError> {
        let modality = event.modality;
        let timestamp = event.timestamp;

        let latest = match self.correlator.ingest(event) {
            Ok(latest) => latest,
            Err(e) => {
                self.record_rejection();
                return Err(e.into());
            }
        };

        self.counters.ingested += 1;
        counter!("nettriage_events_ingested_total", "modality" => modality.as_str()).increment(1);
        self.watermark = self.watermark.max(timestamp);

        let mut incidents = self.correlator.take_pending();
        incidents.extend(latest);
        Ok(self.raise_all(incidents))
    }

    /// Close windows that stream time has moved past
    pub fn advance(&mut self, now: f64) -> Vec<Alert> {
        if !now.is_finite() {
            return Vec::new();
        }
        self.watermark = self.watermark.max(now);
        let incidents = self.correlator.expire(now);
        self.raise_all(incidents)
    }

    /// Flush every open window
    pub fn shutdown(&mut self) -> Vec<Alert> {
        let incidents = self.correlator.flush();
        self.raise_all(incidents)
    }

    /// Latest event time seen
    pub fn watermark(&self) -> f64 {
        self.watermark
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            bins_processed: self.counters.bins,
            polls_processed: self.counters.polls,
            events_ingested: self.counters.ingested,
            events_rejected: self.counters.rejected,
            alerts_raised: self.counters.alerts,
            bgp_devices: self.bgp.len(),
            bgp_evicted: self.counters.bgp_evicted,
            discord_fallbacks: self.counters.retired_fallbacks
                + self
                    .bgp
                    .values()
                    .map(|t| t.source.fallback_count())
                    .sum::<u64>(),
            classifier_fallbacks: self.snmp.fallback_count(),
            watermark: if self.watermark.is_finite() { self.watermark } else { 0.0 },
            correlator: self.correlator.stats(),
        }
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }

    /// Score a bin with the device's source, creating it on first sight
    fn process_bin(
        &mut self,
        message: &BgpBinMessage,
    ) -> Result<Option<AnomalyEvent>, PipelineError> {
        self.bgp_activity += 1;
        let activity = self.bgp_activity;

        if !self.bgp.contains_key(&message.device) {
            let source = BgpSource::new(&message.device, &self.discord, &self.fusion)?;
            if self.bgp.len() >= self.max_bgp_devices {
                self.evict_bgp_source();
            }
            let tracked = TrackedSource {
                source,
                last_used: activity,
            };
            self.bgp.insert(message.device.clone(), tracked);
        }

        match self.bgp.get_mut(&message.device) {
            Some(tracked) => {
                tracked.last_used = activity;
                tracked.source.process(&message.bin)
            }
            None => Ok(None),
        }
    }

    /// Drop the least recently used BGP source
    fn evict_bgp_source(&mut self) {
        let victim = self
            .bgp
            .iter()
            .min_by_key(|(_, t)| t.last_used)
            .map(|(name, _)| name.clone());

        if let Some(tracked) = victim.and_then(|name| self.bgp.remove_entry(&name)) {
            warn!(
                "BGP device bound {} reached, dropping history for {}",
                self.max_bgp_devices, tracked.0
            );
            self.counters.bgp_evicted += 1;
            self.counters.retired_fallbacks += tracked.1.source.fallback_count();
        }
    }

    fn record_rejection(&mut self) {
        self.counters.rejected += 1;
        counter!("nettriage_events_rejected_total").increment(1);
    }

    fn raise_all(&mut self, incidents: Vec<CorrelatedEvent>) -> Vec<Alert> {
        incidents.iter().map(|incident| self.raise(incident)).collect()
    }

    /// Triage an incident, assemble its alert and store it
    fn raise(&mut self, incident: &CorrelatedEvent) -> Alert {
        let (location, context) = locate(incident);
        let anomaly = AnomalyData {
            confidence: incident.max_confidence,
            first_seen: incident.time_window.start,
            observed_at: incident.time_window.end,
        };

        let triage = self.triage.analyze(&anomaly, &location, Some(&context));
        let alert = self.assembler.assemble(incident, &triage);

        self.counters.alerts += 1;
        counter!("nettriage_alerts_total", "severity" => alert.severity.as_str()).increment(1);
        if let Err(e) = self.store.insert(alert.clone()) {
            warn!("Alert {} not stored: {}", alert.alert_id, e);
        }
        alert
    }
}

impl std::fmt::Debug for TriagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriagePipeline")
            .field("bgp_devices", &self.bgp.len())
            .field("watermark", &self.watermark)
            .finish_non_exhaustive()
    }
}

/// Detected location and correlation context for an incident.
///
/// A single-modality incident carries its discounted strength as the location
/// confidence; a confirmed one keeps the strongest event's confidence.
fn locate(incident: &CorrelatedEvent) -> (Location, CorrelationContext) {
    let (confidence, scale) = if incident.is_multi_modal || incident.max_confidence <= 0.0 {
        (incident.max_confidence, 1.0)
    } else {
        (
            incident.correlation_strength,
            incident.correlation_strength / incident.max_confidence,
        )
    };

    let location = Location {
        device: incident.primary_device.clone(),
        interface: incident.primary_interface.clone(),
        bgp_peer: incident.primary_peer.clone(),
        topology_role: None,
        confidence,
    };

    let candidates = incident
        .candidates
        .iter()
        .map(|c| Location {
            device: c.device.clone(),
            interface: c.interface.clone(),
            bgp_peer: c.peer.clone(),
            topology_role: None,
            confidence: c.confidence * scale,
        })
        .collect();

    let context = CorrelationContext {
        is_multi_modal: incident.is_multi_modal,
        correlation_strength: incident.correlation_strength,
        candidates,
    };
    (location, context)
}

/// Drive the pipeline from `inbound` until it closes or ctrl-c arrives.
///
/// Idle windows are expired against stream time every `expire_every`;
/// all open windows are flushed on exit.
pub async fn run(
    mut pipeline: TriagePipeline,
    mut inbound: mpsc::Receiver<Inbound>,
    state: Arc<AppState>,
    expire_every: Duration,
) -> PipelineStats {
    let mut ticker = tokio::time::interval(expire_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Triage loop started");
    loop {
        tokio::select! {
            message = inbound.recv() => match message {
                Some(message) => match pipeline.process(message) {
                    Ok(alerts) if !alerts.is_empty() => state.publish(pipeline.stats()).await,
                    Ok(_) => {}
                    Err(e) => warn!("Skipping input: {}", e),
                },
                None => {
                    info!("Input closed");
                    break;
                }
            },
            _ = ticker.tick() => {
                let now = pipeline.watermark();
                let alerts = pipeline.advance(now);
                if !alerts.is_empty() {
                    debug!("Expiry raised {} alerts", alerts.len());
                }
                state.publish(pipeline.stats()).await;
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let flushed = pipeline.shutdown();
    let stats = pipeline.stats();
    state.publish(stats.clone()).await;
    info!(
        "Triage loop stopped: {} events, {} alerts ({} at shutdown)",
        stats.events_ingested,
        stats.alerts_raised,
        flushed.len()
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::RootCauseCategory;
    use event_correlator::Modality;
    use topology_triage::{DeviceRole, Priority, Severity};

    fn table() -> TopologyTable {
        let mut devices = vec![
            ("spine-01".to_string(), DeviceRole::Spine),
            ("edge-01".to_string(), DeviceRole::Edge),
            ("tor-01".to_string(), DeviceRole::Tor),
        ];
        for i in 1..=8 {
            devices.push((format!("srv-{:02}", i), DeviceRole::Server));
        }
        TopologyTable::from_devices(devices)
    }

    fn pipeline() -> TriagePipeline {
        TriagePipeline::new(&PipelineConfig::default(), table(), Arc::new(AlertStore::default()))
            .unwrap()
    }

    fn event(ts: f64, modality: Modality, device: &str, confidence: f64) -> AnomalyEvent {
        AnomalyEvent::new(ts, modality, device, confidence)
    }

    #[test]
    fn test_spine_multi_modal_incident_is_critical() {
        let mut pipeline = pipeline();
        let first = pipeline
            .process(Inbound::Event(
                event(1000.0, Modality::Bgp, "spine-01", 0.85)
                    .with_series(["wdr_total"])
                    .with_peer("10.0.0.9"),
            ))
            .unwrap();
        assert!(first.is_empty());

        let alerts = pipeline
            .process(Inbound::Event(
                event(1010.0, Modality::Snmp, "spine-01", 0.9)
                    .with_interface("Ethernet1")
                    .with_series(["oper_status_changes"]),
            ))
            .unwrap();

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.priority, Priority::P1);
        assert!(alert.escalation_required);
        assert_eq!(alert.location.device, "spine-01");
        assert_eq!(alert.location.topology_role, Some(DeviceRole::Spine));
        assert_eq!(
            alert.probable_root_cause.category,
            RootCauseCategory::PhysicalLinkFailure
        );
        assert_eq!(pipeline.store().len(), 1);

        // Already emitted; closing the window adds nothing
        assert!(pipeline.shutdown().is_empty());
    }

    #[test]
    fn test_isolated_weak_bgp_event_raises_nothing() {
        let mut pipeline = pipeline();
        let alerts = pipeline
            .process(Inbound::Event(
                event(1000.0, Modality::Bgp, "edge-01", 0.4).with_series(["ann_total"]),
            ))
            .unwrap();
        assert!(alerts.is_empty());

        assert!(pipeline.advance(1100.0).is_empty());
        assert!(pipeline.shutdown().is_empty());
        assert!(pipeline.store().is_empty());
        assert_eq!(pipeline.stats().correlator.suppressed, 1);
    }

    #[test]
    fn test_single_modality_is_discounted() {
        let mut pipeline = pipeline();
        pipeline
            .process(Inbound::Event(
                event(1000.0, Modality::Snmp, "srv-03", 0.9).with_series(["crc_errors"]),
            ))
            .unwrap();

        let alerts = pipeline.process(Inbound::Watermark { timestamp: 1100.0 }).unwrap();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert!((alert.confidence - 0.54).abs() < 1e-9);
        assert_eq!(alert.severity, Severity::Warning);
        assert!(!alert.escalation_required);
    }

    #[test]
    fn test_unknown_device_is_downgraded() {
        let mut pipeline = pipeline();
        pipeline
            .process(Inbound::Event(event(1000.0, Modality::Bgp, "mystery-9", 0.9)))
            .unwrap();
        pipeline
            .process(Inbound::Event(event(1001.0, Modality::Snmp, "mystery-9", 0.9)))
            .unwrap();

        let stored = pipeline.store().recent(None, 10).unwrap();
        assert_eq!(stored.len(), 1);
        let alert = &stored[0].alert;
        assert_eq!(alert.location.topology_role, Some(DeviceRole::Unknown));
        assert_eq!(alert.blast_radius.affected_devices, 0);
        assert!((alert.confidence - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_event_rejected() {
        let mut pipeline = pipeline();
        let result = pipeline.process(Inbound::Event(event(1000.0, Modality::Bgp, "tor-01", 1.7)));
        assert!(matches!(result, Err(PipelineError::Correlation(_))));
        assert_eq!(pipeline.stats().events_rejected, 1);

        let ok = pipeline.process(Inbound::Event(event(1001.0, Modality::Bgp, "tor-01", 0.7)));
        assert!(ok.is_ok());
    }

    fn bin(device: &str, bin_start: f64) -> Inbound {
        let totals = discord_engine::BGP_SERIES
            .iter()
            .map(|s| (s.to_string(), 1.0))
            .collect();
        Inbound::BgpBin(BgpBinMessage {
            device: device.to_string(),
            bin: FeatureBin {
                bin_start,
                bin_end: bin_start + 30.0,
                totals,
                per_peer: Default::default(),
            },
        })
    }

    #[test]
    fn test_bgp_bins_create_per_device_sources() {
        let mut pipeline = pipeline();

        assert!(pipeline.process(bin("edge-01", 1000.0)).unwrap().is_empty());
        let stats = pipeline.stats();
        assert_eq!(stats.bins_processed, 1);
        assert_eq!(stats.bgp_devices, 1);
        assert_eq!(stats.events_ingested, 0);
    }

    #[test]
    fn test_bgp_sources_bounded_by_recency() {
        let config = PipelineConfig {
            max_bgp_devices: 2,
            ..Default::default()
        };
        let mut pipeline =
            TriagePipeline::new(&config, table(), Arc::new(AlertStore::default())).unwrap();

        pipeline.process(bin("edge-01", 1000.0)).unwrap();
        pipeline.process(bin("tor-01", 1000.0)).unwrap();
        pipeline.process(bin("edge-01", 1030.0)).unwrap();
        pipeline.process(bin("spine-01", 1000.0)).unwrap();

        assert!(pipeline.bgp.contains_key("edge-01"));
        assert!(pipeline.bgp.contains_key("spine-01"));
        assert!(!pipeline.bgp.contains_key("tor-01"));

        for i in 0..50 {
            pipeline.process(bin(&format!("leaf-{}", i), 1000.0)).unwrap();
        }
        let stats = pipeline.stats();
        assert_eq!(stats.bgp_devices, 2);
        assert_eq!(stats.bgp_evicted, 51);

        // A rejected device never displaces a tracked one
        assert!(pipeline.process(bin("", 1000.0)).is_err());
        assert_eq!(pipeline.stats().bgp_devices, 2);
        assert_eq!(pipeline.stats().bgp_evicted, 51);
    }

    #[test]
    fn test_zero_bgp_bound_rejected() {
        let config = PipelineConfig {
            max_bgp_devices: 0,
            ..Default::default()
        };
        let result = TriagePipeline::new(&config, table(), Arc::new(AlertStore::default()));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_low_confidence_tor_alert_is_warning() {
        let mut pipeline = pipeline();
        pipeline
            .process(Inbound::Event(
                event(1000.0, Modality::Snmp, "tor-01", 0.8).with_series(["crc_errors"]),
            ))
            .unwrap();

        let alerts = pipeline.shutdown();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert!((alert.confidence - 0.48).abs() < 1e-9);
        assert_eq!(alert.severity, Severity::Warning);
        // tor base 5 plus the undiscounted 0.8 anomaly confidence
        assert!((alert.criticality.score - 6.6).abs() < 1e-9);
        assert_eq!(alert.priority, Priority::P2);
    }

    #[test]
    fn test_skewed_device_survives_expiry_sweep() {
        let mut pipeline = pipeline();
        pipeline
            .process(Inbound::Event(event(2000.0, Modality::Trap, "tor-01", 0.7)))
            .unwrap();
        assert!(pipeline.advance(2000.0).is_empty());

        pipeline
            .process(Inbound::Event(event(1930.0, Modality::Bgp, "srv-02", 0.9)))
            .unwrap();
        let alerts = pipeline
            .process(Inbound::Event(event(1932.0, Modality::Snmp, "srv-02", 0.9)))
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].location.device, "srv-02");
        assert_eq!(pipeline.stats().correlator.late, 0);
    }

    #[test]
    fn test_inbound_envelope_decodes() {
        let line = r#"{"kind":"event","timestamp":1000.0,"modality":"trap","device":"tor-01","confidence":0.8}"#;
        let message: Inbound = serde_json::from_str(line).unwrap();
        assert!(matches!(message, Inbound::Event(ref e) if e.modality == Modality::Trap));

        let line = r#"{"kind":"watermark","timestamp":1200.5}"#;
        let message: Inbound = serde_json::from_str(line).unwrap();
        assert_eq!(message, Inbound::Watermark { timestamp: 1200.5 });

        let line = r#"{"kind":"snmp_poll","timestamp":1000.0,"device":"tor-01","features":{"names":["crc_errors"],"values":[9.0]}}"#;
        assert!(matches!(
            serde_json::from_str::<Inbound>(line).unwrap(),
            Inbound::SnmpPoll(_)
        ));
    }

    #[tokio::test]
    async fn test_run_flushes_on_input_end() {
        let store = Arc::new(AlertStore::default());
        let pipeline =
            TriagePipeline::new(&PipelineConfig::default(), table(), store.clone()).unwrap();
        let state = Arc::new(AppState::new(store.clone(), None));
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(run(pipeline, rx, state.clone(), Duration::from_secs(3600)));

        tx.send(Inbound::Event(event(1000.0, Modality::Snmp, "tor-01", 0.95)))
            .await
            .unwrap();
        tx.send(Inbound::Event(event(1001.0, Modality::Bgp, "tor-01", 2.0)))
            .await
            .unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.events_ingested, 1);
        assert_eq!(stats.events_rejected, 1);
        assert_eq!(stats.alerts_raised, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(state.stats().await.alerts_raised, 1);
    }
}
