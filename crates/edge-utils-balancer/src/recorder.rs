//! Performance recorder: bounded per-endpoint sample history.
//!
//! Every finished request appends one sample to its endpoint's ring buffer
//! (drop-head on overflow). Readers filter by time window, so the rings can
//! stay small while still answering "how did this endpoint behave over the
//! last five minutes".

use dashmap::DashMap;
use edge_utils_core::Clock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// One finished request against one endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    /// Clock position when the sample was recorded, in milliseconds.
    pub timestamp_millis: u64,
    /// Observed response time in milliseconds.
    pub response_time_ms: f64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Active-request count on the endpoint when the request ran.
    pub active_at_start: u32,
}

/// Aggregates over one time window of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WindowStats {
    pub avg_response_time: f64,
    pub success_rate: f64,
    pub avg_active: f64,
    pub count: usize,
}

/// Per-endpoint sample rings plus the adaptive-update trigger.
///
/// The trigger merges the two update sources into one wake-up: a counter
/// fires [`Notify`] after every `sample_trigger` samples across all
/// endpoints, and the balancer's weight loop also ticks on an interval.
pub struct PerformanceRecorder {
    rings: DashMap<String, VecDeque<PerformanceSample>>,
    capacity: usize,
    samples_since_update: AtomicU64,
    sample_trigger: u64,
    update_notify: Arc<Notify>,
    clock: Arc<dyn Clock>,
}

impl PerformanceRecorder {
    pub(crate) fn new(capacity: usize, sample_trigger: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            rings: DashMap::new(),
            capacity: capacity.max(1),
            samples_since_update: AtomicU64::new(0),
            sample_trigger: sample_trigger.max(1),
            update_notify: Arc::new(Notify::new()),
            clock,
        }
    }

    pub(crate) fn update_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.update_notify)
    }

    /// Appends a sample for `url`, dropping the oldest when full, and fires
    /// the update trigger when enough samples accumulated.
    pub(crate) fn append(&self, url: &str, response_time_ms: f64, success: bool, active: u32) {
        let sample = PerformanceSample {
            timestamp_millis: self.clock.now_millis(),
            response_time_ms,
            success,
            active_at_start: active,
        };

        {
            let mut ring = self.rings.entry(url.to_string()).or_default();
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(sample);
        }

        let seen = self.samples_since_update.fetch_add(1, Ordering::Relaxed) + 1;
        if seen >= self.sample_trigger {
            self.samples_since_update.store(0, Ordering::Relaxed);
            self.update_notify.notify_one();
        }
    }

    /// Drops the ring for a removed endpoint.
    pub(crate) fn remove(&self, url: &str) {
        self.rings.remove(url);
    }

    /// Samples for `url` with `from_millis <= timestamp < to_millis`.
    pub fn samples_between(
        &self,
        url: &str,
        from_millis: u64,
        to_millis: u64,
    ) -> Vec<PerformanceSample> {
        self.rings
            .get(url)
            .map(|ring| {
                ring.iter()
                    .filter(|s| s.timestamp_millis >= from_millis && s.timestamp_millis < to_millis)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Aggregates over the given window; `None` when it holds no samples.
    pub(crate) fn stats_between(
        &self,
        url: &str,
        from_millis: u64,
        to_millis: u64,
    ) -> Option<WindowStats> {
        let ring = self.rings.get(url)?;
        let mut count = 0usize;
        let mut rt_sum = 0.0;
        let mut successes = 0usize;
        let mut active_sum = 0.0;

        for sample in ring
            .iter()
            .filter(|s| s.timestamp_millis >= from_millis && s.timestamp_millis < to_millis)
        {
            count += 1;
            rt_sum += sample.response_time_ms;
            active_sum += sample.active_at_start as f64;
            if sample.success {
                successes += 1;
            }
        }

        if count == 0 {
            return None;
        }
        Some(WindowStats {
            avg_response_time: rt_sum / count as f64,
            success_rate: successes as f64 / count as f64,
            avg_active: active_sum / count as f64,
            count,
        })
    }

    pub(crate) fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_utils_core::ManualClock;

    fn recorder_on(clock: Arc<ManualClock>) -> PerformanceRecorder {
        PerformanceRecorder::new(100, 100, clock)
    }

    #[test]
    fn ring_drops_oldest_when_full() {
        let clock = Arc::new(ManualClock::new(0));
        let recorder = PerformanceRecorder::new(3, 1000, clock.clone());

        for i in 0..5 {
            clock.set_millis(i * 10);
            recorder.append("http://a", i as f64, true, 0);
        }

        let samples = recorder.samples_between("http://a", 0, u64::MAX);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].response_time_ms, 2.0);
        assert_eq!(samples[2].response_time_ms, 4.0);
    }

    #[test]
    fn time_window_filter_applies_at_read_time() {
        let clock = Arc::new(ManualClock::new(0));
        let recorder = recorder_on(clock.clone());

        recorder.append("http://a", 10.0, true, 0);
        clock.set_millis(60_000);
        recorder.append("http://a", 20.0, true, 0);

        let recent = recorder.samples_between("http://a", 30_000, u64::MAX);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].response_time_ms, 20.0);
    }

    #[test]
    fn stats_aggregate_the_window() {
        let clock = Arc::new(ManualClock::new(0));
        let recorder = recorder_on(clock);

        recorder.append("http://a", 100.0, true, 2);
        recorder.append("http://a", 300.0, false, 4);

        let stats = recorder.stats_between("http://a", 0, u64::MAX).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.avg_response_time - 200.0).abs() < 1e-9);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_active - 3.0).abs() < 1e-9);

        assert!(recorder.stats_between("http://missing", 0, u64::MAX).is_none());
    }

    #[tokio::test]
    async fn trigger_fires_after_enough_samples() {
        let clock = Arc::new(ManualClock::new(0));
        let recorder = PerformanceRecorder::new(100, 3, clock);
        let notify = recorder.update_notify();

        recorder.append("http://a", 1.0, true, 0);
        recorder.append("http://a", 1.0, true, 0);
        recorder.append("http://b", 1.0, true, 0);

        // The third sample across all endpoints fired the notifier.
        tokio::time::timeout(std::time::Duration::from_millis(10), notify.notified())
            .await
            .expect("trigger should have fired");
    }

    #[test]
    fn removed_endpoints_lose_their_history() {
        let clock = Arc::new(ManualClock::new(0));
        let recorder = recorder_on(clock);

        recorder.append("http://a", 1.0, true, 0);
        recorder.remove("http://a");
        assert!(recorder.samples_between("http://a", 0, u64::MAX).is_empty());
    }
}
