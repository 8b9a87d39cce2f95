//! HTTP Read API
//!
//! Read-only views over stored alerts and pipeline activity, plus the
//! acknowledgment flag.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use storage::{AlertStore, SeverityCounts, StorageError, StoredAlert};
use tokio::sync::RwLock;
use topology_triage::Severity;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::PipelineStats;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<AlertStore>,
    /// Latest snapshot published by the triage loop
    stats: RwLock<PipelineStats>,
    prometheus: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<AlertStore>, prometheus: Option<PrometheusHandle>) -> Self {
        Self {
            store,
            stats: RwLock::new(PipelineStats::default()),
            prometheus,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    /// Replace the published stats snapshot
    pub async fn publish(&self, stats: PipelineStats) {
        *self.stats.write().await = stats;
    }

    pub async fn stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub alerts: SeverityCounts,
    pub open_windows: usize,
    pub tracked_devices: usize,
}

/// Query parameters for the alert listing
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Filter by severity
    pub severity: Option<String>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for the alert listing
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertResponse {
    pub data: Vec<StoredAlert>,
    pub count: usize,
    pub unacknowledged_count: usize,
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error mapped to a status code
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Storage(e @ StorageError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Storage(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/stats", get(stats_handler))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/alerts/:id", get(get_alert))
        .route("/api/v1/alerts/:id/ack", post(acknowledge_alert))
        .route("/metrics", get(metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let alerts = state.store.counts()?;
    let stats = state.stats().await;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        alerts,
        open_windows: stats.correlator.open_windows,
        tracked_devices: stats.correlator.tracked_devices,
    }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<PipelineStats> {
    Json(state.stats().await)
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> Result<Json<AlertResponse>, ApiError> {
    let severity = params
        .severity
        .as_deref()
        .map(str::parse::<Severity>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let data = state.store.recent(severity, params.limit)?;
    let unacknowledged_count = data.iter().filter(|a| !a.acknowledged).count();

    Ok(Json(AlertResponse {
        count: data.len(),
        unacknowledged_count,
        data,
    }))
}

async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StoredAlert>, ApiError> {
    Ok(Json(state.store.get(&id)?))
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StoredAlert>, ApiError> {
    let stored = state.store.acknowledge(&id)?;
    info!("Acknowledged {} via API", id);
    Ok(Json(stored))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Serve the router until the process exits
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting API server on {}", addr);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Inbound, TriagePipeline};
    use crate::PipelineConfig;
    use axum::body::Body;
    use axum::http::Request;
    use event_correlator::{AnomalyEvent, Modality};
    use topology_triage::{DeviceRole, TopologyTable};
    use tower::ServiceExt;

    /// State with one critical and one warning alert
    fn seeded_state() -> Arc<AppState> {
        let store = Arc::new(AlertStore::default());
        let table = TopologyTable::from_devices([
            ("spine-01", DeviceRole::Spine),
            ("srv-01", DeviceRole::Server),
        ]);
        let mut pipeline =
            TriagePipeline::new(&PipelineConfig::default(), table, store.clone()).unwrap();

        for event in [
            AnomalyEvent::new(1000.0, Modality::Bgp, "spine-01", 0.9),
            AnomalyEvent::new(1001.0, Modality::Snmp, "spine-01", 0.9),
            AnomalyEvent::new(1000.0, Modality::Snmp, "srv-01", 0.9),
        ] {
            pipeline.process(Inbound::Event(event)).unwrap();
        }
        pipeline.shutdown();
        assert_eq!(store.len(), 2);

        Arc::new(AppState::new(store, None))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(seeded_state());
        let response = app.oneshot(get_request("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.alerts.critical, 1);
        assert_eq!(health.alerts.unacknowledged, 2);
    }

    #[tokio::test]
    async fn test_list_alerts_with_filter() {
        let state = seeded_state();

        let response = create_router(state.clone())
            .oneshot(get_request("/api/v1/alerts"))
            .await
            .unwrap();
        let all: AlertResponse = body_json(response).await;
        assert_eq!(all.count, 2);

        let response = create_router(state.clone())
            .oneshot(get_request("/api/v1/alerts?severity=critical&limit=5"))
            .await
            .unwrap();
        let critical: AlertResponse = body_json(response).await;
        assert_eq!(critical.count, 1);
        assert_eq!(critical.data[0].alert.location.device, "spine-01");

        let response = create_router(state)
            .oneshot(get_request("/api/v1/alerts?severity=urgent"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_acknowledge() {
        let state = seeded_state();
        let id = state.store.recent(None, 1).unwrap()[0].alert.alert_id.clone();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/alerts/{}/ack", id))
            .body(Body::empty())
            .unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stored: StoredAlert = body_json(response).await;
        assert!(stored.acknowledged);
        assert_eq!(state.store.counts().unwrap().unacknowledged, 1);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/alerts/ALT-missing/ack")
            .body(Body::empty())
            .unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_reflect_published_snapshot() {
        let state = seeded_state();
        state
            .publish(PipelineStats {
                events_ingested: 3,
                ..Default::default()
            })
            .await;

        let response = create_router(state)
            .oneshot(get_request("/api/v1/stats"))
            .await
            .unwrap();
        let stats: PipelineStats = body_json(response).await;
        assert_eq!(stats.events_ingested, 3);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = create_router(seeded_state())
            .oneshot(get_request("/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
