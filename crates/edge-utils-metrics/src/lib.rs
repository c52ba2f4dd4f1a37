//! In-process metrics sink for the edge-utils toolkit.
//!
//! Three primitive series types, each keyed by `(name, tags)` with tags
//! rendered canonically (sorted by key) into one composite key:
//!
//! - **Counter**: integer add
//! - **Gauge**: last-write-wins with a timestamp
//! - **Histogram**: timestamped samples with on-demand percentile
//!   extraction (defaults 50 / 95 / 99 / 99.9)
//!
//! [`MetricsCollector::flush`] prunes histogram samples past the retention
//! window and, when a store is configured, serialises a snapshot under
//! `metrics:<millis>`. A failing store defers the flush; nothing is lost.
//!
//! ## Example
//!
//! ```rust
//! use edge_utils_metrics::MetricsCollector;
//!
//! let collector = MetricsCollector::builder().build();
//!
//! collector.increment("requests_total", &[("endpoint", "a")], 1);
//! collector.gauge("active_requests", &[], 17.0);
//! collector.histogram("response_time_ms", &[], 42.0);
//!
//! let percentiles = collector.histogram_percentiles("response_time_ms", &[]);
//! assert_eq!(percentiles.unwrap().len(), 4);
//! ```

pub use collector::{
    GaugePoint, HistogramSummary, MetricsCollector, MetricsCollectorBuilder, MetricsSnapshot,
};

mod collector;
