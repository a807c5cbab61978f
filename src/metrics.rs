//! Metric aggregates and the shared metric registry
//!
//! This module provides the statistical aggregates recorded for every route:
//! - [`Counter`]: signed count (exchange totals, in-flight exchanges)
//! - [`Meter`]: occurrence count with mean and 1/5/15-minute rates
//! - [`Timer`]: latency distribution with percentiles
//!
//! Aggregates are obtained from a [`MetricRegistry`] by [`MetricName`]. Every
//! lookup is get-or-create, so repeated lookups of the same name hand back the
//! same underlying aggregate. Every aggregate is also registered with a
//! Prometheus registry so it can be scraped from the management interface.

pub mod counter;
pub mod meter;
pub mod registry;
pub mod timer;

pub use counter::{Counter, CounterSnapshot};
pub use meter::{Meter, MeterSnapshot};
pub use registry::{MetricRegistry, MetricSnapshot, RegistrySnapshot};
pub use timer::{Timer, TimerContext, TimerSnapshot};

use crate::error::{AppError, AppResult};
use std::fmt;

/// Fully qualified name of an aggregate in a [`MetricRegistry`]
///
/// Renders as `<context>:<route>:<kind>`. The context and route also become
/// the `context`/`route` labels of the exported Prometheus series, and the
/// kind selects the metric family (`route_<kind>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricName {
    context: String,
    route: String,
    kind: String,
}

impl MetricName {
    /// Create a new metric name
    pub fn new(
        context: impl Into<String>,
        route: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            route: route.into(),
            kind: kind.into(),
        }
    }

    /// Get the owning context name
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Get the route id
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Get the statistic kind (e.g. "total", "responses")
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Prometheus family name for this metric, without namespace
    pub(crate) fn family(&self) -> String {
        format!("route_{}", sanitize_component(&self.kind))
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.context, self.route, self.kind)
    }
}

/// Normalize a management namespace into a valid Prometheus namespace
///
/// Characters outside `[a-zA-Z0-9_]` become `_`, so `routemetrics.metrics`
/// turns into `routemetrics_metrics`.
///
/// # Errors
///
/// Returns `AppError::Config` if the namespace is empty or blank.
pub fn prometheus_namespace(namespace: &str) -> AppResult<String> {
    let trimmed = namespace.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config(
            "management namespace must not be empty".to_string(),
        ));
    }
    Ok(sanitize_component(trimmed))
}

fn sanitize_component(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
