//! Route policies
//!
//! [`MetricsRoutePolicy`] instruments one route with exchange counts,
//! in-flight tracking, request rates and response latency.

pub mod metrics;
pub mod statistics;

pub use metrics::{
    DEFAULT_MANAGEMENT_NAMESPACE, MetricsPolicyConfig, MetricsRoutePolicy, TIMER_PROPERTY,
    default_management_address,
};
pub use statistics::{MetricsStatistics, StatisticKind, StatisticsSnapshot};

/// Lifecycle of a route policy
///
/// Exchange callbacks only take effect in `Ready`; in any other state they
/// are silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Not yet initialized, or the last initialization failed
    Uninitialized,
    /// Initialization in progress
    Initializing,
    /// Bound to a route and recording
    Ready,
}

impl PolicyState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            PolicyState::Uninitialized => 0,
            PolicyState::Initializing => 1,
            PolicyState::Ready => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PolicyState::Initializing,
            2 => PolicyState::Ready,
            _ => PolicyState::Uninitialized,
        }
    }
}
