//! Traffic-management toolkit for edge and serverless HTTP runtimes.
//!
//! `edge-utils` bundles the components a request passes through between the
//! edge entry point and an upstream origin. Each component is available as
//! an individual crate and as a feature of this meta-crate.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! edge-utils = { version = "0.1", features = ["balancer", "ratelimiter"] }
//! ```
//!
//! # Components
//!
//! - **Balancer** (`balancer`): a health-tracked endpoint pool with six
//!   selection policies (round-robin, weighted round-robin,
//!   least-connections, random, IP-hash, adaptive composite scoring),
//!   sticky sessions, a bounded performance history, and adaptive weights
//!   recomputed from recent samples.
//! - **Circuit breaker** (`circuitbreaker`): closed/open/half-open
//!   protection around upstream calls; fail-closed while tripped, with the
//!   underlying error always rethrown.
//! - **Rate limiter** (`ratelimiter`): token-bucket and sliding-window
//!   algorithms keyed by a configurable client identity, with exemption
//!   lists, `X-RateLimit-*` headers, and an optional shared store that
//!   fails open.
//! - **Metrics** (`metrics`): counters, gauges, and histograms with
//!   percentile extraction, retention, and timestamped snapshot flushes.
//! - **Trace** (`trace`): W3C Trace Context extraction/injection and a
//!   minimal span lifecycle with ratio sampling.
//!
//! The pieces compose along the request path:
//!
//! ```text
//! entry → rate limiter → circuit breaker → balancer → upstream
//!            │                 │               │
//!            └── headers       └── outcome     └── samples → adaptive weights
//! ```
//!
//! Every instance is independent (there are no global singletons), and
//! all time- and randomness-sensitive logic reads through the injectable
//! [`edge_utils_core::Clock`] and [`edge_utils_core::RandomSource`], so
//! tests run fully deterministically.
//!
//! # Example
//!
//! ```rust
//! # #[cfg(all(feature = "balancer", feature = "circuitbreaker"))]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use edge_utils::prelude::*;
//! use std::time::Duration;
//!
//! let balancer = LoadBalancer::builder()
//!     .endpoint("http://origin-a:8080")
//!     .endpoint("http://origin-b:8080")
//!     .policy(SelectionPolicy::LeastConnections)
//!     .build();
//!
//! let breaker = CircuitBreaker::builder()
//!     .failure_threshold(5)
//!     .recovery_timeout(Duration::from_secs(60))
//!     .build();
//!
//! let target = balancer.next_endpoint(None)?;
//! balancer.record_request_start(&target);
//! let outcome: Result<&str, _> = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>("response") })
//!     .await;
//! balancer.record_request_end(&target, 42.0, outcome.is_ok());
//! # Ok(())
//! # }
//! ```

pub use edge_utils_core as core;

#[cfg(feature = "balancer")]
pub use edge_utils_balancer as balancer;

#[cfg(feature = "circuitbreaker")]
pub use edge_utils_circuitbreaker as circuitbreaker;

#[cfg(feature = "metrics")]
pub use edge_utils_metrics as metrics;

#[cfg(feature = "ratelimiter")]
pub use edge_utils_ratelimiter as ratelimiter;

#[cfg(feature = "trace")]
pub use edge_utils_trace as trace;

/// Commonly used types, re-exported in one place.
pub mod prelude {
    pub use edge_utils_core::{Clock, KeyValueStore, MemoryStore, MonotonicClock, RandomSource};

    #[cfg(feature = "balancer")]
    pub use edge_utils_balancer::{BalancerError, LoadBalancer, SelectionPolicy};

    #[cfg(feature = "circuitbreaker")]
    pub use edge_utils_circuitbreaker::{BreakerError, CircuitBreaker, CircuitState};

    #[cfg(feature = "metrics")]
    pub use edge_utils_metrics::MetricsCollector;

    #[cfg(feature = "ratelimiter")]
    pub use edge_utils_ratelimiter::{RateLimitManager, RateLimitStrategy, RateLimitVerdict};

    #[cfg(feature = "trace")]
    pub use edge_utils_trace::{Sampler, TraceContext, Tracer};
}
