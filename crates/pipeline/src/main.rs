//! Network Anomaly Triage - Main Entry Point
//!
//! Usage: `nettriage [config.toml] < inputs.ndjson`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use pipeline::{
    describe_metrics, init_logging, read_ndjson, run, serve, AppState, PipelineConfig,
    TriagePipeline,
};
use storage::AlertStore;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use topology_triage::TopologyTable;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.log_level, config.log_json)?;

    info!("=== Network Anomaly Triage v{} ===", env!("CARGO_PKG_VERSION"));

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;
    describe_metrics();

    let table = match &config.topology_path {
        Some(path) => TopologyTable::load(path)
            .with_context(|| format!("loading topology from {}", path.display()))?,
        None => {
            warn!("No topology configured; every device triages as unknown");
            TopologyTable::default()
        }
    };

    let store = Arc::new(AlertStore::new(config.alert_retention));
    let pipeline = TriagePipeline::new(&config, table, store.clone())
        .context("building triage pipeline")?;
    let state = Arc::new(AppState::new(store, Some(prometheus)));

    if config.api_enabled {
        let addr = config.listen_addr.clone();
        let api_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(&addr, api_state).await {
                error!("API server stopped: {:#}", e);
            }
        });
    }

    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let reader = tokio::spawn(read_ndjson(BufReader::new(tokio::io::stdin()), tx));

    let stats = run(
        pipeline,
        rx,
        state,
        Duration::from_millis(config.expire_interval_ms),
    )
    .await;

    if reader.is_finished() {
        match reader.await {
            Ok(Ok(summary)) => info!("Read {} lines, skipped {}", summary.lines, summary.skipped),
            Ok(Err(e)) => warn!("Input error: {}", e),
            Err(e) => warn!("Input task failed: {}", e),
        }
    } else {
        reader.abort();
    }

    info!(
        "Done: {} events ingested, {} rejected, {} alerts",
        stats.events_ingested, stats.events_rejected, stats.alerts_raised
    );
    Ok(())
}
