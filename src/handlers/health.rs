//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::ManagementState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Namespace of the served registry
    pub namespace: String,
    /// Number of registered aggregates
    pub metrics: usize,
}

/// Health check handler
///
/// Always returns 200 OK while the management interface is serving.
pub async fn handler(State(state): State<ManagementState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = state.registry();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            namespace: registry.namespace().to_string(),
            metrics: registry.len(),
        }),
    )
}
