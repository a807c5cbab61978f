//! Process-wide named collection of metric aggregates

use super::timer::LATENCY_BUCKETS_SECONDS;
use super::{
    Counter, CounterSnapshot, Meter, MeterSnapshot, MetricName, Timer, TimerSnapshot,
    prometheus_namespace,
};
use crate::error::{AppError, AppResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use prometheus::{Encoder, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::collections::BTreeMap;

/// Shared registry of counters, meters and timers
///
/// Aggregates are keyed by the rendered [`MetricName`] and are never removed.
/// Lookups are get-or-create: the first lookup of a name creates and
/// registers the aggregate, later lookups return a handle to the same one.
/// Creation is atomic per name, so concurrent lookups never produce two
/// aggregates for one name.
pub struct MetricRegistry {
    namespace: String,
    prometheus: Registry,
    metrics: DashMap<String, Metric>,
}

#[derive(Clone)]
enum Metric {
    Counter(Counter),
    Meter(Meter),
    Timer(Timer),
}

impl Metric {
    fn type_name(&self) -> &'static str {
        match self {
            Metric::Counter(_) => "counter",
            Metric::Meter(_) => "meter",
            Metric::Timer(_) => "timer",
        }
    }

    fn snapshot(&self) -> MetricSnapshot {
        match self {
            Metric::Counter(c) => MetricSnapshot::Counter(c.snapshot()),
            Metric::Meter(m) => MetricSnapshot::Meter(m.snapshot()),
            Metric::Timer(t) => MetricSnapshot::Timer(t.snapshot()),
        }
    }
}

/// Point-in-time view of one aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSnapshot {
    Counter(CounterSnapshot),
    Meter(MeterSnapshot),
    Timer(TimerSnapshot),
}

/// Point-in-time view of a whole registry, ordered by metric name
pub type RegistrySnapshot = BTreeMap<String, MetricSnapshot>;

impl MetricRegistry {
    /// Create an empty registry exporting under `namespace`
    ///
    /// The namespace is normalized for Prometheus (`routemetrics.metrics`
    /// exports as `routemetrics_metrics_*`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the namespace is blank.
    pub fn new(namespace: &str) -> AppResult<Self> {
        let namespace = prometheus_namespace(namespace)?;
        tracing::debug!(namespace = %namespace, "Created metric registry");
        Ok(Self {
            namespace,
            prometheus: Registry::new(),
            metrics: DashMap::new(),
        })
    }

    /// Prometheus namespace every aggregate is exported under
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Underlying Prometheus registry
    pub fn prometheus(&self) -> &Registry {
        &self.prometheus
    }

    /// Get or create the counter called `name`
    ///
    /// # Errors
    ///
    /// Returns `AppError::MetricTypeMismatch` if `name` already holds a
    /// different aggregate type, or `AppError::Metrics` if Prometheus
    /// registration fails.
    pub fn counter(&self, name: &MetricName) -> AppResult<Counter> {
        self.get_or_create(
            name,
            "counter",
            |metric| match metric {
                Metric::Counter(c) => Some(c.clone()),
                _ => None,
            },
            || {
                let gauge = IntGauge::with_opts(self.opts(name, name.family(), "counter"))?;
                self.prometheus.register(Box::new(gauge.clone()))?;
                let counter = Counter::new(gauge);
                Ok((Metric::Counter(counter.clone()), counter))
            },
        )
    }

    /// Get or create the meter called `name`
    ///
    /// # Errors
    ///
    /// Same as [`MetricRegistry::counter`].
    pub fn meter(&self, name: &MetricName) -> AppResult<Meter> {
        self.get_or_create(
            name,
            "meter",
            |metric| match metric {
                Metric::Meter(m) => Some(m.clone()),
                _ => None,
            },
            || {
                let family = format!("{}_total", name.family());
                let count = IntCounter::with_opts(self.opts(name, family, "meter"))?;
                self.prometheus.register(Box::new(count.clone()))?;
                let meter = Meter::new(count);
                Ok((Metric::Meter(meter.clone()), meter))
            },
        )
    }

    /// Get or create the timer called `name`
    ///
    /// # Errors
    ///
    /// Same as [`MetricRegistry::counter`].
    pub fn timer(&self, name: &MetricName) -> AppResult<Timer> {
        self.get_or_create(
            name,
            "timer",
            |metric| match metric {
                Metric::Timer(t) => Some(t.clone()),
                _ => None,
            },
            || {
                let family = format!("{}_seconds", name.family());
                let opts: HistogramOpts = self.opts(name, family, "timer").into();
                let histogram = prometheus::Histogram::with_opts(
                    opts.buckets(LATENCY_BUCKETS_SECONDS.to_vec()),
                )?;
                self.prometheus.register(Box::new(histogram.clone()))?;
                let timer = Timer::new(histogram)?;
                Ok((Metric::Timer(timer.clone()), timer))
            },
        )
    }

    /// Look up an existing counter by its rendered name
    pub fn get_counter(&self, name: &str) -> Option<Counter> {
        self.metrics.get(name).and_then(|m| match m.value() {
            Metric::Counter(c) => Some(c.clone()),
            _ => None,
        })
    }

    /// Look up an existing meter by its rendered name
    pub fn get_meter(&self, name: &str) -> Option<Meter> {
        self.metrics.get(name).and_then(|m| match m.value() {
            Metric::Meter(meter) => Some(meter.clone()),
            _ => None,
        })
    }

    /// Look up an existing timer by its rendered name
    pub fn get_timer(&self, name: &str) -> Option<Timer> {
        self.metrics.get(name).and_then(|m| match m.value() {
            Metric::Timer(t) => Some(t.clone()),
            _ => None,
        })
    }

    /// Whether an aggregate called `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered aggregates
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Snapshot every aggregate
    pub fn snapshot(&self) -> RegistrySnapshot {
        // Clone handles first so no shard lock is held while snapshotting
        let handles: Vec<(String, Metric)> = self
            .metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        handles
            .into_iter()
            .map(|(name, metric)| (name, metric.snapshot()))
            .collect()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> AppResult<String> {
        let metric_families = self.prometheus.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_count,
                    "Prometheus text encoder failed"
                );
                AppError::Metrics(e)
            })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            AppError::Internal(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }

    fn opts(&self, name: &MetricName, family: String, kind: &str) -> Opts {
        Opts::new(family, format!("Route {} {}", name.kind(), kind))
            .namespace(self.namespace.clone())
            .const_label("context", name.context())
            .const_label("route", name.route())
    }

    fn get_or_create<T>(
        &self,
        name: &MetricName,
        requested: &'static str,
        extract: impl Fn(&Metric) -> Option<T>,
        create: impl FnOnce() -> AppResult<(Metric, T)>,
    ) -> AppResult<T> {
        match self.metrics.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                extract(entry.get()).ok_or_else(|| AppError::MetricTypeMismatch {
                    name: entry.key().clone(),
                    existing: entry.get().type_name(),
                    requested,
                })
            }
            Entry::Vacant(entry) => {
                let (metric, handle) = create()?;
                tracing::debug!(
                    metric = %entry.key(),
                    metric_type = requested,
                    "Registered metric"
                );
                entry.insert(metric);
                Ok(handle)
            }
        }
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("namespace", &self.namespace)
            .field("metrics", &self.names())
            .finish()
    }
}
