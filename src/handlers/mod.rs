//! HTTP handlers for the management interface

use crate::metrics::MetricRegistry;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod metrics;
pub mod statistics;

/// State shared across management handlers
///
/// Cheap to clone: only holds an `Arc` to the registry being served.
#[derive(Clone)]
pub struct ManagementState {
    registry: Arc<MetricRegistry>,
}

impl ManagementState {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    /// Get reference to the served registry
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }
}

/// Build the management router
///
/// - `GET /metrics`: Prometheus text exposition
/// - `GET /statistics`: JSON snapshot of every aggregate
/// - `GET /health`: liveness
pub fn router(state: ManagementState) -> Router {
    Router::new()
        .route("/metrics", get(metrics::handler))
        .route("/statistics", get(statistics::handler))
        .route("/health", get(health::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clonable() {
        let registry = Arc::new(MetricRegistry::new("test").unwrap());
        let state = ManagementState::new(registry.clone());
        let cloned = state.clone();
        assert_eq!(cloned.registry().namespace(), "test");
        assert_eq!(Arc::strong_count(&registry), 3);
    }
}
