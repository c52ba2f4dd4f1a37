//! Endpoint pool: the balancer's view of its upstreams.
//!
//! Hot counters are per-endpoint atomics so request handlers never lock.
//! The endpoint list itself is copy-on-write: readers grab a snapshot,
//! topology changes swap in a fresh list. Policies reading several counters
//! may observe a torn snapshot; selection is advisory, so that is fine.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ADAPTIVE_WEIGHT_MIN: f64 = 0.1;
const ADAPTIVE_WEIGHT_MAX: f64 = 3.0;

#[derive(Debug, Default)]
struct ResponseAverage {
    avg: f64,
    count: u64,
}

/// One upstream endpoint and its runtime counters.
#[derive(Debug)]
pub struct Endpoint {
    url: String,
    weight: f64,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    active_requests: AtomicU32,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    response_average: Mutex<ResponseAverage>,
    adaptive_weight_bits: AtomicU64,
}

impl Endpoint {
    pub(crate) fn new(url: String, weight: f64) -> Self {
        Self {
            url,
            weight: if weight > 0.0 { weight } else { 1.0 },
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            active_requests: AtomicU32::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            response_average: Mutex::new(ResponseAverage::default()),
            adaptive_weight_bits: AtomicU64::new(1.0_f64.to_bits()),
        }
    }

    /// Endpoint identity: its URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Static weight configured for this endpoint.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Current health bit.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// In-flight request count.
    pub fn active_requests(&self) -> u32 {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Cumulative successful requests.
    pub fn total_successes(&self) -> u64 {
        self.total_successes.load(Ordering::Relaxed)
    }

    /// Cumulative failed requests.
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Failures over all recorded requests; zero when nothing was recorded.
    pub fn failure_rate(&self) -> f64 {
        let failures = self.total_failures();
        let total = failures + self.total_successes();
        failures as f64 / (total.max(1)) as f64
    }

    /// Moving-average response time in milliseconds.
    pub fn avg_response_time(&self) -> f64 {
        self.response_average.lock().unwrap().avg
    }

    /// Number of response-time samples folded into the average.
    pub fn response_sample_count(&self) -> u64 {
        self.response_average.lock().unwrap().count
    }

    /// Adaptive weight, always within `[0.1, 3.0]`.
    pub fn adaptive_weight(&self) -> f64 {
        f64::from_bits(self.adaptive_weight_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_adaptive_weight(&self, weight: f64) {
        let clamped = weight.clamp(ADAPTIVE_WEIGHT_MIN, ADAPTIVE_WEIGHT_MAX);
        self.adaptive_weight_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn begin_request(&self) -> u32 {
        self.active_requests.fetch_add(1, Ordering::Relaxed)
    }

    /// Decrements the active count, saturating at zero. Returns the count
    /// observed before the decrement.
    pub(crate) fn end_request(&self) -> u32 {
        let mut observed = 0;
        let _ = self
            .active_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                observed = current;
                current.checked_sub(1)
            });
        observed
    }

    pub(crate) fn record_outcome(&self, success: bool) {
        if success {
            self.total_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Folds a response time into the moving average:
    /// `avg' = (avg * n + x) / (n + 1)`.
    pub(crate) fn push_response_time(&self, response_time_ms: f64) {
        let mut guard = self.response_average.lock().unwrap();
        let n = guard.count as f64;
        guard.avg = (guard.avg * n + response_time_ms) / (n + 1.0);
        guard.count += 1;
    }

    /// Applies one probe observation and flips the health bit when the
    /// matching threshold is crossed. Returns the new health bit when a
    /// flip happened.
    ///
    /// The streak counter for the opposite outcome is always reset, and the
    /// advancing streak is clamped just past its threshold so long steady
    /// runs cannot overflow.
    pub(crate) fn observe_probe(
        &self,
        success: bool,
        failure_threshold: u32,
        success_threshold: u32,
    ) -> Option<bool> {
        if success {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            let cap = success_threshold.saturating_add(1);
            let streak = bump_clamped(&self.consecutive_successes, cap);
            if !self.is_healthy() && streak >= success_threshold {
                self.healthy.store(true, Ordering::Release);
                return Some(true);
            }
        } else {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            let cap = failure_threshold.saturating_add(1);
            let streak = bump_clamped(&self.consecutive_failures, cap);
            if self.is_healthy() && streak >= failure_threshold {
                self.healthy.store(false, Ordering::Release);
                return Some(false);
            }
        }
        None
    }
}

fn bump_clamped(counter: &AtomicU32, cap: u32) -> u32 {
    let mut next = 0;
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        next = current.saturating_add(1).min(cap);
        Some(next)
    });
    next
}

/// Ordered collection of endpoints addressable by URL.
///
/// Insertion order defines the round-robin cycle. The shared selection
/// indexes live here so they survive topology changes, as the selection
/// semantics require.
pub struct EndpointPool {
    endpoints: ArcSwap<Vec<Arc<Endpoint>>>,
    mutation: Mutex<()>,
    pub(crate) rr_index: AtomicUsize,
    pub(crate) wrr_index: AtomicUsize,
}

impl EndpointPool {
    pub(crate) fn new(entries: Vec<(String, f64)>) -> Self {
        let endpoints = entries
            .into_iter()
            .map(|(url, weight)| Arc::new(Endpoint::new(url, weight)))
            .collect::<Vec<_>>();
        Self {
            endpoints: ArcSwap::from_pointee(endpoints),
            mutation: Mutex::new(()),
            rr_index: AtomicUsize::new(0),
            wrr_index: AtomicUsize::new(0),
        }
    }

    /// Replaces the pool contents. Endpoints whose URL survives keep their
    /// counters; new URLs start fresh and healthy.
    pub fn set_endpoints(&self, entries: Vec<(String, f64)>) {
        let _guard = self.mutation.lock().unwrap();
        let current = self.endpoints.load();
        let next = entries
            .into_iter()
            .map(|(url, weight)| {
                current
                    .iter()
                    .find(|e| e.url() == url)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(Endpoint::new(url, weight)))
            })
            .collect::<Vec<_>>();
        self.endpoints.store(Arc::new(next));
    }

    /// Appends an endpoint; a duplicate URL is ignored.
    pub fn add_endpoint(&self, url: &str, weight: f64) {
        let _guard = self.mutation.lock().unwrap();
        let current = self.endpoints.load_full();
        if current.iter().any(|e| e.url() == url) {
            return;
        }
        let mut next = current.as_ref().clone();
        next.push(Arc::new(Endpoint::new(url.to_string(), weight)));
        self.endpoints.store(Arc::new(next));
    }

    /// Removes an endpoint. In-flight requests against it are discarded:
    /// their `record_request_end` calls become no-ops.
    pub fn remove_endpoint(&self, url: &str) {
        let _guard = self.mutation.lock().unwrap();
        let current = self.endpoints.load_full();
        let next = current
            .iter()
            .filter(|e| e.url() != url)
            .cloned()
            .collect::<Vec<_>>();
        self.endpoints.store(Arc::new(next));
    }

    /// Healthy endpoints in insertion order.
    pub fn eligible(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .load()
            .iter()
            .filter(|e| e.is_healthy())
            .cloned()
            .collect()
    }

    /// Every endpoint in insertion order.
    pub fn all(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.load().as_ref().clone()
    }

    /// Looks an endpoint up by URL.
    pub fn get(&self, url: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.load().iter().find(|e| e.url() == url).cloned()
    }

    /// Number of endpoints, healthy or not.
    pub fn len(&self) -> usize {
        self.endpoints.load().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(urls: &[&str]) -> EndpointPool {
        EndpointPool::new(urls.iter().map(|u| (u.to_string(), 1.0)).collect())
    }

    #[test]
    fn eligible_preserves_insertion_order() {
        let pool = pool_of(&["http://a", "http://b", "http://c"]);
        pool.get("http://b").unwrap().observe_probe(false, 1, 1);

        let eligible: Vec<String> =
            pool.eligible().iter().map(|e| e.url().to_string()).collect();
        assert_eq!(eligible, vec!["http://a", "http://c"]);
    }

    #[test]
    fn active_count_never_goes_negative() {
        let pool = pool_of(&["http://a"]);
        let endpoint = pool.get("http://a").unwrap();

        endpoint.begin_request();
        endpoint.end_request();
        endpoint.end_request();
        endpoint.end_request();
        assert_eq!(endpoint.active_requests(), 0);

        endpoint.begin_request();
        assert_eq!(endpoint.active_requests(), 1);
    }

    #[test]
    fn response_average_is_incremental() {
        let endpoint = Endpoint::new("http://a".to_string(), 1.0);

        endpoint.push_response_time(100.0);
        endpoint.push_response_time(200.0);
        endpoint.push_response_time(300.0);

        assert!((endpoint.avg_response_time() - 200.0).abs() < 1e-9);
        assert_eq!(endpoint.response_sample_count(), 3);
    }

    #[test]
    fn health_flips_only_at_thresholds() {
        let endpoint = Endpoint::new("http://a".to_string(), 1.0);
        assert!(endpoint.is_healthy());

        // Two failures with a threshold of three: still healthy.
        assert_eq!(endpoint.observe_probe(false, 3, 2), None);
        assert_eq!(endpoint.observe_probe(false, 3, 2), None);
        assert!(endpoint.is_healthy());

        assert_eq!(endpoint.observe_probe(false, 3, 2), Some(false));
        assert!(!endpoint.is_healthy());

        // One success resets the failure streak but does not yet recover.
        assert_eq!(endpoint.observe_probe(true, 3, 2), None);
        assert!(!endpoint.is_healthy());
        assert_eq!(endpoint.observe_probe(true, 3, 2), Some(true));
        assert!(endpoint.is_healthy());
    }

    #[test]
    fn success_streak_is_clamped_past_the_threshold() {
        let endpoint = Endpoint::new("http://a".to_string(), 1.0);

        for _ in 0..100 {
            endpoint.observe_probe(true, 3, 2);
        }
        assert_eq!(
            endpoint.consecutive_successes.load(Ordering::Relaxed),
            3
        );
    }

    #[test]
    fn failure_rate_counts_recorded_outcomes() {
        let endpoint = Endpoint::new("http://a".to_string(), 1.0);
        assert_eq!(endpoint.failure_rate(), 0.0);

        endpoint.record_outcome(true);
        endpoint.record_outcome(true);
        endpoint.record_outcome(true);
        endpoint.record_outcome(false);
        assert!((endpoint.failure_rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn set_endpoints_keeps_surviving_state() {
        let pool = pool_of(&["http://a", "http://b"]);
        let a = pool.get("http://a").unwrap();
        a.record_outcome(true);
        a.begin_request();

        pool.set_endpoints(vec![
            ("http://a".to_string(), 1.0),
            ("http://c".to_string(), 2.0),
        ]);

        let a_after = pool.get("http://a").unwrap();
        assert_eq!(a_after.total_successes(), 1);
        assert_eq!(a_after.active_requests(), 1);
        assert!(pool.get("http://b").is_none());
        assert_eq!(pool.get("http://c").unwrap().weight(), 2.0);
    }

    #[test]
    fn adaptive_weight_stays_clamped() {
        let endpoint = Endpoint::new("http://a".to_string(), 1.0);
        assert_eq!(endpoint.adaptive_weight(), 1.0);

        endpoint.set_adaptive_weight(99.0);
        assert_eq!(endpoint.adaptive_weight(), 3.0);
        endpoint.set_adaptive_weight(0.0);
        assert_eq!(endpoint.adaptive_weight(), 0.1);
    }

    #[test]
    fn non_positive_weight_defaults_to_one() {
        let endpoint = Endpoint::new("http://a".to_string(), 0.0);
        assert_eq!(endpoint.weight(), 1.0);
    }
}
