//! Lock-free timing counters for the measurement step

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Elapsed-time statistics plus a failure count
#[derive(Debug)]
pub struct PerfCounter {
    name: &'static str,
    events: AtomicU64,
    errors: AtomicU64,
    total_ns: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
}

/// Point-in-time copy of a [`PerfCounter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfSnapshot {
    pub name: &'static str,
    pub events: u64,
    pub errors: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl PerfCounter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            events: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_ns: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
        }
    }

    /// Count one successful event that took `elapsed`
    pub fn record(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.events.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(ns, Ordering::Relaxed);
        self.min_ns.fetch_min(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    /// Count one failed event
    pub fn record_error(&self) -> u64 {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> PerfSnapshot {
        let events = self.events.load(Ordering::Relaxed);
        let min_ns = self.min_ns.load(Ordering::Relaxed);
        PerfSnapshot {
            name: self.name,
            events,
            errors: self.errors.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.total_ns.load(Ordering::Relaxed)),
            min: if events == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(min_ns)
            },
            max: Duration::from_nanos(self.max_ns.load(Ordering::Relaxed)),
        }
    }
}

impl PerfSnapshot {
    /// Mean elapsed time per successful event
    pub fn average(&self) -> Duration {
        if self.events == 0 {
            return Duration::ZERO;
        }
        self.total / self.events.min(u32::MAX as u64) as u32
    }
}

impl fmt::Display for PerfSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} events, {} errors, {}us avg, {}us min, {}us max",
            self.name,
            self.events,
            self.errors,
            self.average().as_micros(),
            self.min.as_micros(),
            self.max.as_micros()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_counter() {
        let snapshot = PerfCounter::new("empty").snapshot();
        assert_eq!(snapshot.events, 0);
        assert_eq!(snapshot.min, Duration::ZERO);
        assert_eq!(snapshot.average(), Duration::ZERO);
    }

    #[test]
    fn test_min_max_average() {
        let perf = PerfCounter::new("read");
        perf.record(Duration::from_micros(100));
        perf.record(Duration::from_micros(300));
        assert_eq!(perf.record_error(), 1);

        let snapshot = perf.snapshot();
        assert_eq!(snapshot.events, 2);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.min, Duration::from_micros(100));
        assert_eq!(snapshot.max, Duration::from_micros(300));
        assert_eq!(snapshot.average(), Duration::from_micros(200));
        assert_eq!(
            snapshot.to_string(),
            "read: 2 events, 1 errors, 200us avg, 100us min, 300us max"
        );
    }
}
