//! routemetrics - Per-route exchange metrics
//!
//! This library instruments routes with a metrics policy that records exchange
//! totals, in-flight exchanges, request rates and response latencies into a
//! registry shared by every route of a context, and publishes that registry on
//! a Prometheus management endpoint.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod load;
pub mod metrics;
pub mod policy;
pub mod registry_service;
pub mod route;
pub mod telemetry;
