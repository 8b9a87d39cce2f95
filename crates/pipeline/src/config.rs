//! Pipeline Configuration
//!
//! Built-in defaults, overlaid by an optional TOML file, overlaid by
//! `NETTRIAGE__*` environment variables (`NETTRIAGE__CORRELATION__CORRELATION_WINDOW_SECS=90`).

use std::path::{Path, PathBuf};

use discord_engine::{DiscordConfig, FusionConfig};
use event_correlator::CorrelationConfig;
use outlier_classifier::ClassifierConfig;
use serde::{Deserialize, Serialize};
use topology_triage::TriageConfig;
use tracing::debug;

use crate::PipelineError;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "NETTRIAGE";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Serve the HTTP read API
    pub api_enabled: bool,
    pub listen_addr: String,
    /// Inbound queue bound
    pub queue_capacity: usize,
    /// Alerts retained by the store
    pub alert_retention: usize,
    /// How often idle correlation windows are expired
    pub expire_interval_ms: u64,
    /// Devices with BGP scoring state before the least recently used is dropped
    pub max_bgp_devices: usize,
    /// Device role table
    pub topology_path: Option<PathBuf>,
    pub discord: DiscordConfig,
    pub fusion: FusionConfig,
    pub classifier: ClassifierConfig,
    pub correlation: CorrelationConfig,
    pub triage: TriageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            api_enabled: true,
            listen_addr: "0.0.0.0:8080".to_string(),
            queue_capacity: 1024,
            alert_retention: 10_000,
            expire_interval_ms: 1000,
            max_bgp_devices: 10_000,
            topology_path: None,
            discord: DiscordConfig::default(),
            fusion: FusionConfig::default(),
            classifier: ClassifierConfig::default(),
            correlation: CorrelationConfig::default(),
            triage: TriageConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration, layering file and environment over defaults
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values the stage constructors do not cover
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.alert_retention == 0 {
            return Err(PipelineError::InvalidConfig(
                "alert_retention must be positive".to_string(),
            ));
        }
        if self.expire_interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "expire_interval_ms must be positive".to_string(),
            ));
        }
        if self.max_bgp_devices == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_bgp_devices must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_load() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.correlation.correlation_window_secs, 60.0);
        assert!(config.topology_path.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path =
            std::env::temp_dir().join(format!("nettriage-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\nqueue_capacity = 64\n\n[correlation]\ncorrelation_window_secs = 90.0\n\n[triage]\np1_threshold = 9.0"
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.correlation.correlation_window_secs, 90.0);
        assert_eq!(config.correlation.min_correlation_confidence, 0.5);
        assert_eq!(config.triage.p1_threshold, 9.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = PipelineConfig::load(Some(Path::new("/nonexistent/nettriage.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_queue_rejected() {
        let config = PipelineConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
    }
}
