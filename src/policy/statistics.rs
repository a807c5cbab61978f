//! Per-route statistics holder

use crate::error::AppResult;
use crate::metrics::{
    Counter, CounterSnapshot, Meter, MeterSnapshot, MetricName, MetricRegistry, Timer,
    TimerContext, TimerSnapshot,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The statistics recorded for every route
///
/// Restricting kinds to a closed set keeps metric names (and the Prometheus
/// series derived from them) bounded per route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatisticKind {
    /// Exchanges started
    Total,
    /// Exchanges started but not yet done
    Inflight,
    /// Rate of exchanges started
    Requests,
    /// Latency from begin to done
    Responses,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 4] = [
        StatisticKind::Total,
        StatisticKind::Inflight,
        StatisticKind::Requests,
        StatisticKind::Responses,
    ];

    /// Suffix used in metric names
    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticKind::Total => "total",
            StatisticKind::Inflight => "inflight",
            StatisticKind::Requests => "requests",
            StatisticKind::Responses => "responses",
        }
    }

    /// Metric name of this statistic for `route` in `context`
    pub fn metric_name(&self, context: &str, route: &str) -> MetricName {
        MetricName::new(context, route, self.as_str())
    }
}

/// Aggregates for one (context, route) pair
///
/// All updates are lock-free except the latency sample, which takes a short
/// histogram lock inside [`Timer`].
#[derive(Debug)]
pub struct MetricsStatistics {
    context: String,
    route: String,
    total: Counter,
    inflight: Counter,
    requests: Meter,
    responses: Timer,
    unmatched_done: AtomicU64,
}

/// Serializable view of a route's statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub context: String,
    pub route: String,
    pub total: CounterSnapshot,
    pub inflight: CounterSnapshot,
    pub requests: MeterSnapshot,
    pub responses: TimerSnapshot,
    pub unmatched_done: u64,
}

impl MetricsStatistics {
    /// Get or create the four aggregates for `route` in `registry`
    ///
    /// Calling this again for the same context and route reuses the same
    /// aggregates, so counts survive a policy being rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error if any aggregate cannot be created.
    pub fn register(registry: &MetricRegistry, context: &str, route: &str) -> AppResult<Self> {
        let total = registry.counter(&StatisticKind::Total.metric_name(context, route))?;
        let inflight = registry.counter(&StatisticKind::Inflight.metric_name(context, route))?;
        let requests = registry.meter(&StatisticKind::Requests.metric_name(context, route))?;
        let responses = registry.timer(&StatisticKind::Responses.metric_name(context, route))?;

        Ok(Self {
            context: context.to_string(),
            route: route.to_string(),
            total,
            inflight,
            requests,
            responses,
            unmatched_done: AtomicU64::new(0),
        })
    }

    /// Record the start of an exchange
    ///
    /// The returned context must be handed back to [`MetricsStatistics::done`]
    /// for the latency sample to be committed.
    pub fn begin(&self) -> TimerContext {
        self.total.inc();
        self.inflight.inc();
        self.requests.mark();
        self.responses.time()
    }

    /// Record the end of an exchange
    ///
    /// Without a timer context (the exchange began before the policy was
    /// attached, or begin/done were mismatched) only the in-flight count is
    /// updated. Returns the committed latency, if any.
    pub fn done(&self, timer: Option<TimerContext>) -> Option<Duration> {
        self.inflight.dec();

        match timer {
            Some(timer) => Some(timer.stop()),
            None => {
                self.unmatched_done.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    context = %self.context,
                    route = %self.route,
                    "Exchange done without a timer, skipping latency sample"
                );
                None
            }
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn total(&self) -> &Counter {
        &self.total
    }

    pub fn inflight(&self) -> &Counter {
        &self.inflight
    }

    pub fn requests(&self) -> &Meter {
        &self.requests
    }

    pub fn responses(&self) -> &Timer {
        &self.responses
    }

    /// Done signals that arrived without a timer context
    pub fn unmatched_done(&self) -> u64 {
        self.unmatched_done.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            context: self.context.clone(),
            route: self.route.clone(),
            total: self.total.snapshot(),
            inflight: self.inflight.snapshot(),
            requests: self.requests.snapshot(),
            responses: self.responses.snapshot(),
            unmatched_done: self.unmatched_done(),
        }
    }
}
