//! JSON statistics endpoint
//!
//! Same data as `/metrics`, keyed by `<context>:<route>:<kind>` and with
//! meter rates and timer percentiles already computed.

use axum::{Json, extract::State};

use crate::handlers::ManagementState;
use crate::metrics::RegistrySnapshot;

/// Statistics handler
///
/// Returns `200 OK` with a JSON object of every aggregate, ordered by name.
pub async fn handler(State(state): State<ManagementState>) -> Json<RegistrySnapshot> {
    Json(state.registry().snapshot())
}
