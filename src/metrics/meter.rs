//! Occurrence meters with exponentially weighted moving averages

use parking_lot::Mutex;
use prometheus::IntCounter;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Rates are folded into the moving averages once per interval
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Meter recording how often something happens
///
/// Tracks the total number of marks, the mean rate since creation, and 1, 5
/// and 15 minute exponentially weighted rates (events per second).
///
/// `mark` never waits on the rate lock: if another thread is folding rates
/// at that moment, the mark is counted now and folded on the next tick.
#[derive(Clone)]
pub struct Meter {
    inner: Arc<MeterInner>,
}

struct MeterInner {
    count: IntCounter,
    uncounted: AtomicU64,
    started: Instant,
    rates: Mutex<Rates>,
}

struct Rates {
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

struct Ewma {
    alpha: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn with_window_minutes(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK_INTERVAL.as_secs_f64() / (60.0 * minutes)).exp(),
            rate: 0.0,
            initialized: false,
        }
    }

    fn tick(&mut self, count: u64) {
        let instant_rate = count as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

/// Point-in-time view of a [`Meter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub count: u64,
    pub mean_rate: f64,
    pub m1_rate: f64,
    pub m5_rate: f64,
    pub m15_rate: f64,
}

impl Meter {
    pub(crate) fn new(count: IntCounter) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(MeterInner {
                count,
                uncounted: AtomicU64::new(0),
                started: now,
                rates: Mutex::new(Rates {
                    last_tick: now,
                    m1: Ewma::with_window_minutes(1.0),
                    m5: Ewma::with_window_minutes(5.0),
                    m15: Ewma::with_window_minutes(15.0),
                }),
            }),
        }
    }

    /// Mark one occurrence
    pub fn mark(&self) {
        self.mark_n(1);
    }

    /// Mark `n` occurrences
    pub fn mark_n(&self, n: u64) {
        if let Some(mut rates) = self.inner.rates.try_lock() {
            self.inner.tick_if_necessary(&mut rates);
        }
        self.inner.uncounted.fetch_add(n, Ordering::Relaxed);
        self.inner.count.inc_by(n);
    }

    /// Total number of marks
    pub fn count(&self) -> u64 {
        self.inner.count.get()
    }

    /// Mean rate (events/second) since the meter was created
    pub fn mean_rate(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let elapsed = self.inner.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            count as f64 / elapsed
        } else {
            0.0
        }
    }

    /// One-minute moving average rate (events/second)
    pub fn one_minute_rate(&self) -> f64 {
        self.snapshot().m1_rate
    }

    /// Five-minute moving average rate (events/second)
    pub fn five_minute_rate(&self) -> f64 {
        self.snapshot().m5_rate
    }

    /// Fifteen-minute moving average rate (events/second)
    pub fn fifteen_minute_rate(&self) -> f64 {
        self.snapshot().m15_rate
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        let mut rates = self.inner.rates.lock();
        self.inner.tick_if_necessary(&mut rates);
        MeterSnapshot {
            count: self.count(),
            mean_rate: self.mean_rate(),
            m1_rate: rates.m1.rate,
            m5_rate: rates.m5.rate,
            m15_rate: rates.m15.rate,
        }
    }
}

impl MeterInner {
    fn tick_if_necessary(&self, rates: &mut Rates) {
        let age = rates.last_tick.elapsed();
        if age < TICK_INTERVAL {
            return;
        }

        let ticks = (age.as_nanos() / TICK_INTERVAL.as_nanos()) as u32;
        rates.last_tick += TICK_INTERVAL * ticks;

        // Only the first elapsed interval saw the pending marks; the rest
        // were idle and decay the averages.
        let pending = self.uncounted.swap(0, Ordering::Relaxed);
        for i in 0..ticks {
            let count = if i == 0 { pending } else { 0 };
            rates.m1.tick(count);
            rates.m5.tick(count);
            rates.m15.tick(count);
        }
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Opts;

    fn meter() -> Meter {
        Meter::new(IntCounter::with_opts(Opts::new("test_meter", "test")).unwrap())
    }

    fn rewind_last_tick(meter: &Meter, by: Duration) {
        let mut rates = meter.inner.rates.lock();
        rates.last_tick = Instant::now()
            .checked_sub(by)
            .expect("monotonic clock should allow rewinding a few seconds");
    }

    #[test]
    fn test_mark_counts() {
        let m = meter();
        m.mark();
        m.mark_n(4);
        assert_eq!(m.count(), 5);
    }

    #[test]
    fn test_fresh_meter_has_zero_rates() {
        let m = meter();
        let snapshot = m.snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.mean_rate, 0.0);
        assert_eq!(snapshot.m1_rate, 0.0);
    }

    #[test]
    fn test_first_tick_sets_instant_rate() {
        let m = meter();
        m.mark_n(60);
        rewind_last_tick(&m, TICK_INTERVAL);

        // 60 marks over one 5 second interval
        let snapshot = m.snapshot();
        assert!((snapshot.m1_rate - 12.0).abs() < 1e-9, "{:?}", snapshot);
        assert!((snapshot.m5_rate - 12.0).abs() < 1e-9);
        assert!((snapshot.m15_rate - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_intervals_decay_rate() {
        let m = meter();
        m.mark_n(60);
        rewind_last_tick(&m, TICK_INTERVAL);
        let first = m.one_minute_rate();

        rewind_last_tick(&m, TICK_INTERVAL * 12);
        let decayed = m.one_minute_rate();

        assert!(decayed < first, "rate should decay: {} -> {}", first, decayed);
        assert!(decayed > 0.0);
        // Longer windows decay more slowly
        assert!(m.fifteen_minute_rate() > decayed);
    }

    #[test]
    fn test_mean_rate_is_positive_after_marks() {
        let m = meter();
        m.mark();
        std::thread::sleep(Duration::from_millis(2));
        assert!(m.mean_rate() > 0.0);
    }
}
