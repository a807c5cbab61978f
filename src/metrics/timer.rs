//! Latency timers

use crate::error::{AppError, AppResult};
use hdrhistogram::Histogram as HdrHistogram;
use parking_lot::Mutex;
use prometheus::Histogram;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// HdrHistogram range: 1 μs → 1 h, 3 significant figures
const HIST_LOW_US: u64 = 1;
const HIST_HIGH_US: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Prometheus bucket bounds in seconds
pub(crate) const LATENCY_BUCKETS_SECONDS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Latency distribution
///
/// Every sample is observed twice: into a Prometheus histogram (seconds) for
/// scraping, and into an HdrHistogram (microseconds) for percentiles.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    histogram: Histogram,
    samples: Mutex<HdrHistogram<u64>>,
}

/// An in-progress measurement started by [`Timer::time`]
///
/// Calling [`TimerContext::stop`] commits one sample. Dropping the context
/// without stopping it records nothing.
#[derive(Debug)]
#[must_use = "a timer context records nothing unless stopped"]
pub struct TimerContext {
    timer: Timer,
    started: Instant,
}

/// Percentile breakdown of a [`Timer`], in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p75_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
}

impl Timer {
    pub(crate) fn new(histogram: Histogram) -> AppResult<Self> {
        let samples = HdrHistogram::<u64>::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIG)
            .map_err(|e| AppError::Internal(format!("failed to create latency histogram: {}", e)))?;

        Ok(Self {
            inner: Arc::new(TimerInner {
                histogram,
                samples: Mutex::new(samples),
            }),
        })
    }

    /// Start a measurement
    pub fn time(&self) -> TimerContext {
        TimerContext {
            timer: self.clone(),
            started: Instant::now(),
        }
    }

    /// Record a duration directly
    pub fn update(&self, duration: Duration) {
        self.inner.histogram.observe(duration.as_secs_f64());

        // Clamp to ≥ 1 μs so sub-microsecond samples still land in the histogram
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX).max(1);
        self.inner.samples.lock().saturating_record(micros);
    }

    /// Number of recorded samples
    pub fn count(&self) -> u64 {
        self.inner.histogram.get_sample_count()
    }

    /// Sum of all recorded samples
    pub fn total(&self) -> Duration {
        Duration::from_secs_f64(self.inner.histogram.get_sample_sum().max(0.0))
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let samples = self.inner.samples.lock();
        if samples.len() == 0 {
            return TimerSnapshot::empty();
        }

        let ms = |us: u64| us as f64 / 1_000.0;
        TimerSnapshot {
            count: samples.len(),
            min_ms: ms(samples.min()),
            max_ms: ms(samples.max()),
            mean_ms: samples.mean() / 1_000.0,
            p50_ms: ms(samples.value_at_quantile(0.50)),
            p75_ms: ms(samples.value_at_quantile(0.75)),
            p95_ms: ms(samples.value_at_quantile(0.95)),
            p99_ms: ms(samples.value_at_quantile(0.99)),
            p999_ms: ms(samples.value_at_quantile(0.999)),
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("count", &self.count())
            .finish()
    }
}

impl TimerContext {
    /// Stop the measurement and commit it to the timer
    ///
    /// Returns the measured duration.
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.timer.update(elapsed);
        elapsed
    }

    /// Time elapsed so far, without committing anything
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl TimerSnapshot {
    /// All-zero placeholder used before any samples are recorded
    pub fn empty() -> Self {
        Self {
            count: 0,
            min_ms: 0.0,
            max_ms: 0.0,
            mean_ms: 0.0,
            p50_ms: 0.0,
            p75_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            p999_ms: 0.0,
        }
    }
}
