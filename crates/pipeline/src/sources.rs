//! Modality Sources
//!
//! Turn raw per-modality inputs into [`AnomalyEvent`]s for the correlator.
//! A BGP source scores closed feature bins for one device; the SNMP source
//! runs polled feature vectors through the outlier classifier.

use std::collections::BTreeMap;

use data_validator::Validator;
use discord_engine::{
    DiscordConfig, DiscordResult, FeatureBin, FusionConfig, MultiSeriesFusion,
    SeriesDiscordDetector, BGP_SERIES,
};
use event_correlator::{AnomalyEvent, Modality};
use metrics::counter;
use outlier_classifier::{ClassifierChain, FeatureVector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::PipelineError;

/// Discord scoring and fusion over one device's BGP bins
#[derive(Debug)]
pub struct BgpSource {
    device: String,
    detector: SeriesDiscordDetector,
    fusion: MultiSeriesFusion,
    validator: Validator,
    reported_fallbacks: u64,
}

impl BgpSource {
    pub fn new(
        device: impl Into<String>,
        discord: &DiscordConfig,
        fusion: &FusionConfig,
    ) -> Result<Self, PipelineError> {
        let device = device.into();
        let validator = Validator::default();
        validator.validate_identifier("device", &device)?;

        debug!("Creating BGP source for {}", device);
        Ok(Self {
            device,
            detector: SeriesDiscordDetector::new(discord.clone())?,
            fusion: MultiSeriesFusion::new(fusion.clone())?,
            validator,
            reported_fallbacks: 0,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Score one closed bin. Returns an event when the fused score crosses the threshold.
    pub fn process(&mut self, bin: &FeatureBin) -> Result<Option<AnomalyEvent>, PipelineError> {
        bin.validate(&self.validator, &BGP_SERIES)?;

        let results: BTreeMap<String, DiscordResult> = bin
            .totals
            .iter()
            .map(|(name, value)| (name.clone(), self.detector.update(name, *value)))
            .collect();
        self.report_fallbacks();

        let decision = self.fusion.combine(&results);
        if !decision.is_anomaly {
            return Ok(None);
        }

        // A fused anomaly with no single series over threshold names every active series
        let series = if decision.discord_series.is_empty() {
            decision.active_series.clone()
        } else {
            decision.discord_series.clone()
        };

        let scores: BTreeMap<&str, f64> = results
            .iter()
            .filter(|(_, r)| r.is_active())
            .map(|(name, r)| (name.as_str(), r.score))
            .collect();

        let mut event = AnomalyEvent::new(
            bin.bin_end,
            Modality::Bgp,
            &self.device,
            decision.confidence,
        )
            .with_series(series)
            .with_detail(json!({
                "fused_score": decision.score,
                "bin_start": bin.bin_start,
                "bin_end": bin.bin_end,
                "scores": scores,
            }));

        if let Some(peer) = decision.dominant_series().and_then(|s| bin.dominant_peer(s)) {
            event = event.with_peer(peer);
        }

        info!(
            "BGP anomaly on {} at {} (score {:.2}, series {:?})",
            self.device, bin.bin_end, decision.score, event.detected_series
        );
        Ok(Some(event))
    }

    /// Times discord scoring fell back to the z-score
    pub fn fallback_count(&self) -> u64 {
        self.detector.fallback_count()
    }

    fn report_fallbacks(&mut self) {
        let total = self.detector.fallback_count();
        if total > self.reported_fallbacks {
            counter!("nettriage_discord_fallbacks_total")
                .increment(total - self.reported_fallbacks);
            self.reported_fallbacks = total;
        }
    }
}

/// One device-health poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpPoll {
    /// Unix seconds
    pub timestamp: f64,
    pub device: String,
    #[serde(default)]
    pub interface: Option<String>,
    pub features: FeatureVector,
}

/// Outlier classification over SNMP polls
#[derive(Debug)]
pub struct SnmpSource {
    chain: ClassifierChain,
}

impl SnmpSource {
    pub fn new(chain: ClassifierChain) -> Self {
        Self { chain }
    }

    /// Classify one poll. Returns an event for an anomalous prediction.
    pub fn process(&self, poll: &SnmpPoll) -> Result<Option<AnomalyEvent>, PipelineError> {
        let outcome = self.chain.classify(&poll.features)?;
        let prediction = outcome.prediction;
        if !prediction.is_anomaly {
            return Ok(None);
        }

        let mut event = AnomalyEvent::new(
            poll.timestamp,
            Modality::Snmp,
            &poll.device,
            prediction.confidence,
        )
            .with_series(prediction.affected_features.iter().cloned())
            .with_detail(json!({
                "score": prediction.score,
                "classifier": outcome.classifier,
                "used_fallback": outcome.used_fallback,
                "latency_us": outcome.latency_us,
            }));
        if let Some(interface) = &poll.interface {
            event = event.with_interface(interface);
        }

        info!(
            "SNMP anomaly on {} at {} (score {:.2}, features {:?})",
            poll.device, poll.timestamp, prediction.score, prediction.affected_features
        );
        Ok(Some(event))
    }

    /// Predictions served by the rule fallback after a model failure
    pub fn fallback_count(&self) -> u64 {
        self.chain.fallback_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discord_engine::{ANNOUNCEMENT_SERIES, WITHDRAWAL_SERIES};
    use outlier_classifier::ThresholdClassifier;

    /// Period-4 counters on every series; `wdr_spike` is added to withdrawals
    fn bin(i: usize, wdr_spike: f64) -> FeatureBin {
        let base = (i % 4) as f64;
        let mut totals: BTreeMap<String, f64> =
            BGP_SERIES.iter().map(|s| (s.to_string(), base)).collect();
        totals.insert(WITHDRAWAL_SERIES.to_string(), base + wdr_spike);

        let mut per_peer = BTreeMap::new();
        per_peer.insert(
            "10.0.0.1".to_string(),
            BTreeMap::from([(WITHDRAWAL_SERIES.to_string(), wdr_spike)]),
        );
        per_peer.insert(
            "10.0.0.2".to_string(),
            BTreeMap::from([(WITHDRAWAL_SERIES.to_string(), base)]),
        );

        let start = 1000.0 + 30.0 * i as f64;
        FeatureBin {
            bin_start: start,
            bin_end: start + 30.0,
            totals,
            per_peer,
        }
    }

    fn source() -> BgpSource {
        BgpSource::new("spine-01", &DiscordConfig::default(), &FusionConfig::default()).unwrap()
    }

    #[test]
    fn test_quiet_bins_produce_nothing() {
        let mut source = source();
        for i in 0..40 {
            assert!(source.process(&bin(i, 0.0)).unwrap().is_none());
        }
    }

    #[test]
    fn test_withdrawal_burst_produces_event() {
        let mut source = source();
        for i in 0..39 {
            source.process(&bin(i, 0.0)).unwrap();
        }

        let event = source.process(&bin(39, 40.0)).unwrap().unwrap();
        assert_eq!(event.modality, Modality::Bgp);
        assert_eq!(event.device, "spine-01");
        assert_eq!(event.timestamp, 1000.0 + 30.0 * 40.0);
        assert!(event.detected_series.contains(WITHDRAWAL_SERIES));
        assert!(!event.detected_series.contains(ANNOUNCEMENT_SERIES));
        assert_eq!(event.peer.as_deref(), Some("10.0.0.1"));
        assert!(event.confidence > 0.9);
    }

    #[test]
    fn test_invalid_bin_rejected() {
        let mut source = source();
        let mut bad = bin(0, 0.0);
        bad.totals.remove(WITHDRAWAL_SERIES);
        assert!(matches!(source.process(&bad), Err(PipelineError::Validation(_))));

        let mut inverted = bin(0, 0.0);
        inverted.bin_end = inverted.bin_start;
        assert!(source.process(&inverted).is_err());
    }

    #[test]
    fn test_invalid_device_rejected() {
        let result = BgpSource::new(" ", &DiscordConfig::default(), &FusionConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_snmp_poll_to_event() {
        let source = SnmpSource::new(ClassifierChain::rules_only(ThresholdClassifier::default()));
        let poll = SnmpPoll {
            timestamp: 2000.0,
            device: "tor-01".to_string(),
            interface: Some("Ethernet12".to_string()),
            features: FeatureVector::from_pairs([("crc_errors", 40.0), ("cpu_pct", 20.0)]),
        };

        let event = source.process(&poll).unwrap().unwrap();
        assert_eq!(event.modality, Modality::Snmp);
        assert_eq!(event.interface.as_deref(), Some("Ethernet12"));
        assert!(event.detected_series.contains("crc_errors"));
        assert!(!event.detected_series.contains("cpu_pct"));
        assert!(event.confidence >= 0.5);
    }

    #[test]
    fn test_healthy_poll_is_quiet() {
        let source = SnmpSource::new(ClassifierChain::rules_only(ThresholdClassifier::default()));
        let poll = SnmpPoll {
            timestamp: 2000.0,
            device: "tor-01".to_string(),
            interface: None,
            features: FeatureVector::from_pairs([("crc_errors", 1.0), ("cpu_pct", 20.0)]),
        };
        assert!(source.process(&poll).unwrap().is_none());
    }
}
