use dashmap::DashMap;
use edge_utils_core::{Clock, KeyValueStore, StoreError, SystemClock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A gauge reading with the time it was written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugePoint {
    /// Last written value.
    pub value: f64,
    /// Clock position of the write, in milliseconds.
    pub timestamp_millis: u64,
}

#[derive(Debug, Clone, Copy)]
struct HistogramPoint {
    value: f64,
    timestamp_millis: u64,
}

/// Percentile summary of one histogram series.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSummary {
    /// Number of retained samples.
    pub count: usize,
    /// Smallest retained sample.
    pub min: f64,
    /// Largest retained sample.
    pub max: f64,
    /// `(quantile, value)` pairs for the configured quantiles.
    pub percentiles: Vec<(f64, f64)>,
}

/// Point-in-time view of every series, as serialised on flush.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Clock position of the snapshot, in milliseconds.
    pub timestamp_millis: u64,
    /// Counter series by composite key.
    pub counters: BTreeMap<String, i64>,
    /// Gauge series by composite key.
    pub gauges: BTreeMap<String, GaugePoint>,
    /// Histogram summaries by composite key.
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Counters, gauges, and histograms keyed by `(name, sorted tags)`.
pub struct MetricsCollector {
    counters: DashMap<String, i64>,
    gauges: DashMap<String, GaugePoint>,
    histograms: DashMap<String, Vec<HistogramPoint>>,
    quantiles: Vec<f64>,
    retention: Duration,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl MetricsCollector {
    /// Returns a new builder with default settings.
    pub fn builder() -> MetricsCollectorBuilder {
        MetricsCollectorBuilder::new()
    }

    /// Adds `delta` to the counter.
    pub fn increment(&self, name: &str, tags: &[(&str, &str)], delta: i64) {
        let key = composite_key(name, tags);
        *self.counters.entry(key).or_insert(0) += delta;
    }

    /// Writes the gauge, replacing any prior value.
    pub fn gauge(&self, name: &str, tags: &[(&str, &str)], value: f64) {
        let key = composite_key(name, tags);
        self.gauges.insert(
            key,
            GaugePoint {
                value,
                timestamp_millis: self.clock.now_millis(),
            },
        );
    }

    /// Appends a histogram sample.
    pub fn histogram(&self, name: &str, tags: &[(&str, &str)], value: f64) {
        let key = composite_key(name, tags);
        self.histograms.entry(key).or_default().push(HistogramPoint {
            value,
            timestamp_millis: self.clock.now_millis(),
        });
    }

    /// Counter value, if the series exists.
    pub fn counter_value(&self, name: &str, tags: &[(&str, &str)]) -> Option<i64> {
        self.counters.get(&composite_key(name, tags)).map(|v| *v)
    }

    /// Gauge reading, if the series exists.
    pub fn gauge_value(&self, name: &str, tags: &[(&str, &str)]) -> Option<GaugePoint> {
        self.gauges.get(&composite_key(name, tags)).map(|v| *v)
    }

    /// Percentiles over the series at the configured quantiles.
    ///
    /// The sample list is sorted on demand; returns `None` for an unknown or
    /// empty series.
    pub fn histogram_percentiles(
        &self,
        name: &str,
        tags: &[(&str, &str)],
    ) -> Option<Vec<(f64, f64)>> {
        let series = self.histograms.get(&composite_key(name, tags))?;
        percentiles_of(series.value(), &self.quantiles)
    }

    /// Prunes expired histogram samples and writes a snapshot to the store
    /// under `metrics:<millis>`.
    ///
    /// Without a store this only prunes and returns the snapshot. A store
    /// failure defers the flush: the error is surfaced and every series
    /// keeps accumulating for the next attempt.
    pub async fn flush(&self) -> Result<MetricsSnapshot, StoreError> {
        let now = self.clock.now_millis();
        self.prune(now);

        let snapshot = self.snapshot(now);

        if let Some(store) = &self.store {
            let key = format!("metrics:{now}");
            let payload = serde_json::to_string(&snapshot)?;
            if let Err(err) = store.put(&key, payload, Some(self.retention)).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "metrics flush deferred; store unavailable");
                return Err(err);
            }
        }

        Ok(snapshot)
    }

    /// Builds the current snapshot without touching the store.
    pub fn snapshot(&self, timestamp_millis: u64) -> MetricsSnapshot {
        let counters = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let gauges = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let histograms = self
            .histograms
            .iter()
            .filter_map(|entry| {
                let summary = summary_of(entry.value(), &self.quantiles)?;
                Some((entry.key().clone(), summary))
            })
            .collect();

        MetricsSnapshot {
            timestamp_millis,
            counters,
            gauges,
            histograms,
        }
    }

    fn prune(&self, now: u64) {
        let retention_millis = self.retention.as_millis() as u64;
        let cutoff = now.saturating_sub(retention_millis);
        for mut entry in self.histograms.iter_mut() {
            entry.value_mut().retain(|p| p.timestamp_millis >= cutoff);
        }
    }
}

fn percentiles_of(points: &[HistogramPoint], quantiles: &[f64]) -> Option<Vec<(f64, f64)>> {
    if points.is_empty() {
        return None;
    }
    let mut values: Vec<f64> = points.iter().map(|p| p.value).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Some(
        quantiles
            .iter()
            .map(|&q| {
                let rank = ((q / 100.0) * values.len() as f64).ceil() as usize;
                let index = rank.clamp(1, values.len()) - 1;
                (q, values[index])
            })
            .collect(),
    )
}

fn summary_of(points: &[HistogramPoint], quantiles: &[f64]) -> Option<HistogramSummary> {
    let percentiles = percentiles_of(points, quantiles)?;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for p in points {
        min = min.min(p.value);
        max = max.max(p.value);
    }
    Some(HistogramSummary {
        count: points.len(),
        min,
        max,
        percentiles,
    })
}

/// Renders `(name, tags)` into one canonical key: tags sorted by key, so
/// the same series is reached regardless of tag order at the call site.
fn composite_key(name: &str, tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut sorted: Vec<(&str, &str)> = tags.to_vec();
    sorted.sort_by_key(|(k, _)| *k);

    let mut key = String::with_capacity(name.len() + 16 * sorted.len());
    key.push_str(name);
    key.push('{');
    for (i, (k, v)) in sorted.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key.push('}');
    key
}

/// Builder for [`MetricsCollector`].
pub struct MetricsCollectorBuilder {
    quantiles: Vec<f64>,
    retention: Duration,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl MetricsCollectorBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            quantiles: vec![50.0, 95.0, 99.0, 99.9],
            retention: Duration::from_secs(24 * 60 * 60),
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the quantiles reported by percentile extraction.
    ///
    /// Default: 50, 95, 99, 99.9
    pub fn quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = quantiles;
        self
    }

    /// Sets how long histogram samples are retained.
    ///
    /// Default: 24 hours
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Writes flush snapshots to the given store.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the collector.
    pub fn build(self) -> MetricsCollector {
        MetricsCollector {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            quantiles: self.quantiles,
            retention: self.retention,
            store: self.store,
            clock: self.clock,
        }
    }
}

impl Default for MetricsCollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_utils_core::{ManualClock, MemoryStore};

    fn collector_on(clock: Arc<ManualClock>) -> MetricsCollector {
        MetricsCollector::builder().clock(clock).build()
    }

    #[test]
    fn counters_add() {
        let collector = collector_on(Arc::new(ManualClock::new(0)));

        collector.increment("hits", &[], 1);
        collector.increment("hits", &[], 2);
        assert_eq!(collector.counter_value("hits", &[]), Some(3));
        assert_eq!(collector.counter_value("misses", &[]), None);
    }

    #[test]
    fn gauges_keep_the_last_write() {
        let clock = Arc::new(ManualClock::new(0));
        let collector = collector_on(clock.clone());

        collector.gauge("depth", &[], 4.0);
        clock.advance_millis(10);
        collector.gauge("depth", &[], 2.0);

        let point = collector.gauge_value("depth", &[]).unwrap();
        assert_eq!(point.value, 2.0);
        assert_eq!(point.timestamp_millis, 10);
    }

    #[test]
    fn tag_order_does_not_split_series() {
        let collector = collector_on(Arc::new(ManualClock::new(0)));

        collector.increment("req", &[("a", "1"), ("b", "2")], 1);
        collector.increment("req", &[("b", "2"), ("a", "1")], 1);
        assert_eq!(collector.counter_value("req", &[("a", "1"), ("b", "2")]), Some(2));
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let collector = MetricsCollector::builder()
            .quantiles(vec![50.0, 99.0])
            .clock(Arc::new(ManualClock::new(0)))
            .build();

        for v in 1..=100 {
            collector.histogram("rt", &[], v as f64);
        }

        let percentiles = collector.histogram_percentiles("rt", &[]).unwrap();
        assert_eq!(percentiles, vec![(50.0, 50.0), (99.0, 99.0)]);
        assert_eq!(collector.histogram_percentiles("empty", &[]), None);
    }

    #[tokio::test]
    async fn flush_prunes_expired_samples() {
        let clock = Arc::new(ManualClock::new(0));
        let collector = MetricsCollector::builder()
            .retention(Duration::from_secs(60))
            .clock(clock.clone())
            .build();

        collector.histogram("rt", &[], 10.0);
        clock.advance_millis(61_000);
        collector.histogram("rt", &[], 20.0);

        let snapshot = collector.flush().await.unwrap();
        let summary = &snapshot.histograms["rt"];
        assert_eq!(summary.count, 1);
        assert_eq!(summary.min, 20.0);
    }

    #[tokio::test]
    async fn flush_writes_a_snapshot_keyed_by_time() {
        let clock = Arc::new(ManualClock::new(5_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let collector = MetricsCollector::builder()
            .store(store.clone())
            .clock(clock)
            .build();

        collector.increment("hits", &[("zone", "edge")], 7);
        collector.flush().await.unwrap();

        let raw = store.get("metrics:5000").await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["counters"]["hits{zone=edge}"], 7);
        assert_eq!(parsed["timestamp_millis"], 5_000);
    }
}
