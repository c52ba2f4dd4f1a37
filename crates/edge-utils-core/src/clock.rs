//! Clock abstractions used by every time-sensitive component.
//!
//! TTLs, token refill, breaker recovery, and sample windows all read time
//! through the [`Clock`] trait so tests can drive them deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds elapsed on this clock's timeline.
    fn now_millis(&self) -> u64;

    /// Convenience: the current timeline position in whole seconds.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// Monotonic clock backed by `Instant::now()`.
///
/// The timeline starts at zero when the clock is created, which keeps all
/// arithmetic overflow-free and immune to wall-clock adjustments.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Wall clock reporting milliseconds since the unix epoch.
///
/// Used where the emitted value crosses a process boundary (rate-limit reset
/// headers, metric snapshot keys) and must be meaningful to other hosts.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Creates a clock starting at the given millisecond position.
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance_millis(&self, delta: u64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jumps the clock to an absolute position.
    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::default();
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_advances_only_on_demand() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.advance_millis(500);
        assert_eq!(clock.now_millis(), 1_500);
        assert_eq!(clock.now_secs(), 1);

        clock.set_millis(60_000);
        assert_eq!(clock.now_secs(), 60);
    }
}
