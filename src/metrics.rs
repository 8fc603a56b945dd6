#[cfg(feature = "metrics")]
use std::time::Instant;

/// Optional scheduling counters for the fiber runtime.
///
/// The runtime is single-threaded, so these are plain integers living inside
/// the thread-local scheduler; there is nothing to synchronize.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct Metrics {
    /// Total fibers created.
    pub fibers_spawned: u64,
    /// Total fibers that exited.
    pub fibers_completed: u64,
    /// Total context switches, scheduler entry and exit included.
    pub context_switches: u64,
    /// Yields that actually switched (a lone fiber's yield is a no-op).
    pub yields: u64,
    /// Suspensions via park, blocking synchronizer paths included.
    pub parks: u64,
    /// Wakeups via unpark, fiber creation included.
    pub unparks: u64,
    /// Time when metrics collection started.
    pub start_time: Instant,
}

#[cfg(feature = "metrics")]
impl Metrics {
    /// Creates a new metrics instance.
    pub fn new() -> Self {
        Self {
            fibers_spawned: 0,
            fibers_completed: 0,
            context_switches: 0,
            yields: 0,
            parks: 0,
            unparks: 0,
            start_time: Instant::now(),
        }
    }

    /// Returns a snapshot of current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fibers_spawned: self.fibers_spawned,
            fibers_completed: self.fibers_completed,
            context_switches: self.context_switches,
            yields: self.yields,
            parks: self.parks,
            unparks: self.unparks,
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(feature = "metrics")]
impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// Snapshot of scheduler counters at a point in time.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub fibers_spawned: u64,
    pub fibers_completed: u64,
    pub context_switches: u64,
    pub yields: u64,
    pub parks: u64,
    pub unparks: u64,
    pub elapsed_seconds: f64,
}

#[cfg(feature = "metrics")]
impl MetricsSnapshot {
    /// Calculates context switches per second.
    pub fn switches_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.context_switches as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Fibers spawned but not yet exited. Parked fibers stay in this figure
    /// for as long as they stay parked.
    pub fn fibers_live(&self) -> u64 {
        self.fibers_spawned - self.fibers_completed
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use crate::fiber::Fiber;
    use crate::sched::Scheduler;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fibers_spawned, 0);
        assert_eq!(snapshot.fibers_completed, 0);
        assert_eq!(snapshot.context_switches, 0);
        assert_eq!(snapshot.yields, 0);
        assert_eq!(snapshot.parks, 0);
        assert_eq!(snapshot.unparks, 0);
        assert!(snapshot.elapsed_seconds >= 0.0);
    }

    #[test]
    fn test_counters_track_a_run() {
        let before = Scheduler::metrics();

        Fiber::spawn(|| {
            Fiber::yield_now();
        });
        Fiber::spawn(|| {});
        Scheduler::run();

        let after = Scheduler::metrics();
        assert_eq!(after.fibers_spawned - before.fibers_spawned, 2);
        assert_eq!(after.fibers_completed - before.fibers_completed, 2);
        assert_eq!(after.unparks - before.unparks, 2);
        assert_eq!(after.yields - before.yields, 1);
        assert_eq!(after.fibers_live(), before.fibers_live());
        // Entry, one yield, two exits.
        assert_eq!(after.context_switches - before.context_switches, 4);
    }
}
