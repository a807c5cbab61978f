//! Prometheus metrics endpoint
//!
//! Exposes the registry in Prometheus text format for scraping.

use axum::extract::State;

use crate::error::AppResult;
use crate::handlers::ManagementState;

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` with a JSON error body if metrics collection fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:9464/metrics
/// # HELP routemetrics_metrics_route_total Route total counter
/// # TYPE routemetrics_metrics_route_total gauge
/// routemetrics_metrics_route_total{context="shop",route="orders"} 42
/// ```
pub async fn handler(State(state): State<ManagementState>) -> AppResult<String> {
    state.registry().gather().inspect_err(|e| {
        tracing::error!(
            error = %e,
            "Failed to gather metrics for Prometheus scraping"
        );
    })
}
