//! Signed counters

use prometheus::IntGauge;
use serde::Serialize;
use std::fmt;

/// Counter that can be incremented and decremented
///
/// Backed by a Prometheus `IntGauge` so in-flight counts can go down as well
/// as up. Clones share the same value.
#[derive(Clone)]
pub struct Counter {
    gauge: IntGauge,
}

/// Point-in-time value of a [`Counter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub count: i64,
}

impl Counter {
    pub(crate) fn new(gauge: IntGauge) -> Self {
        Self { gauge }
    }

    /// Increment by one
    pub fn inc(&self) {
        self.gauge.inc();
    }

    /// Decrement by one
    pub fn dec(&self) {
        self.gauge.dec();
    }

    /// Add an arbitrary signed delta
    pub fn add(&self, delta: i64) {
        self.gauge.add(delta);
    }

    /// Current value
    pub fn count(&self) -> i64 {
        self.gauge.get()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            count: self.count(),
        }
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Opts;

    fn counter() -> Counter {
        Counter::new(IntGauge::with_opts(Opts::new("test_counter", "test")).unwrap())
    }

    #[test]
    fn test_counter_moves_both_ways() {
        let c = counter();
        c.inc();
        c.inc();
        c.dec();
        assert_eq!(c.count(), 1);
        c.add(-3);
        assert_eq!(c.count(), -2);
    }

    #[test]
    fn test_clones_share_value() {
        let c = counter();
        let other = c.clone();
        other.inc();
        assert_eq!(c.snapshot(), CounterSnapshot { count: 1 });
    }
}
