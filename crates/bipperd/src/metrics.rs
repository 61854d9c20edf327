//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  liveness (always 200 if process is running)
//!   GET /readyz   readiness (200 if SQLite and the blob store answer)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use bipper_core::Outcome;
use bipper_storage::SqliteMetadataStore;
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::future::Future;
use std::sync::Arc;

type Labels = Vec<(String, String)>;

/// Request counters and KDF-dominated latency, labelled by operation and outcome.
#[derive(Clone)]
pub struct VaultMetrics {
    requests: Family<Labels, Counter>,
    duration: Family<Labels, Histogram>,
    reconcile_repairs: Counter,
    missing_blobs: Counter,
}

impl VaultMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let requests = Family::default();
        let duration = Family::<Labels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
        });
        let reconcile_repairs = Counter::default();
        let missing_blobs = Counter::default();

        registry.register(
            "bipper_requests",
            "Vault requests by operation and outcome",
            requests.clone(),
        );
        registry.register(
            "bipper_request_duration_seconds",
            "Vault request duration in seconds (key derivation included)",
            duration.clone(),
        );
        registry.register(
            "bipper_reconcile_repairs",
            "Orphan blobs and stale uploads removed by reconciliation",
            reconcile_repairs.clone(),
        );
        registry.register(
            "bipper_missing_blobs_detected",
            "Records found without a backing blob during reconciliation",
            missing_blobs.clone(),
        );

        VaultMetrics {
            requests,
            duration,
            reconcile_repairs,
            missing_blobs,
        }
    }

    /// Record one finished request. `outcome` is `None` on success.
    pub fn observe(&self, operation: &str, outcome: Option<Outcome>, seconds: f64) {
        let outcome = match outcome {
            None => "ok",
            Some(Outcome::InvalidPhrase) => "invalid_phrase",
            Some(Outcome::InvalidInput) => "invalid_input",
            Some(Outcome::Internal) => "internal",
        };
        let labels = vec![
            ("operation".to_string(), operation.to_string()),
            ("outcome".to_string(), outcome.to_string()),
        ];
        self.requests.get_or_create(&labels).inc();
        self.duration.get_or_create(&labels).observe(seconds);
    }

    pub fn observe_reconcile(&self, report: &bipper_vault::ReconcileReport) {
        self.reconcile_repairs
            .inc_by((report.orphan_blobs_removed + report.stale_uploads_cleared) as u64);
        self.missing_blobs.inc_by(report.missing_blobs.len() as u64);
    }
}

/// Shared state for the metrics listener
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub metadata: SqliteMetadataStore,
    pub operator: opendal::Operator,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9100")
pub async fn serve(
    addr: String,
    state: HealthState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: returns 200 if both stores answer, 503 otherwise.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    if bipper_storage::is_ready(&state.metadata, &state.operator).await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "storage unreachable")
    }
}
