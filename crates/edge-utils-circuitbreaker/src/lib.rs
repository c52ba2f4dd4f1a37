//! Circuit breaker for calls to an upstream origin.
//!
//! A circuit breaker prevents cascading failures by tracking consecutive
//! failures against a protected target and temporarily refusing calls once
//! the target looks dead.
//!
//! ## States
//! - **Closed**: normal operation, calls pass through
//! - **Open**: the breaker is tripped, calls fail fast with [`BreakerError::Open`]
//! - **Half-open**: probing recovery, a short run of successes re-closes
//!
//! The breaker is *fail-closed* while tripped: callers should treat
//! [`BreakerError::Open`] as a routable failure (a 503 with `Retry-After`),
//! not as a transport error to retry immediately. When the wrapped operation
//! itself fails, the breaker records the failure and rethrows the underlying
//! error unmodified so callers always see the root cause.
//!
//! ## Example
//!
//! ```rust
//! use edge_utils_circuitbreaker::{BreakerError, CircuitBreaker, CircuitState};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::builder()
//!     .failure_threshold(5)
//!     .recovery_timeout(Duration::from_secs(60))
//!     .name("origin-pool")
//!     .build();
//!
//! let result: Result<&str, BreakerError<std::io::Error>> = breaker
//!     .execute(|| async { Ok("upstream response") })
//!     .await;
//!
//! assert!(result.is_ok());
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! # }
//! ```
//!
//! ## Observability
//!
//! State transitions and call outcomes are surfaced three ways, all
//! optional: event listeners registered on the builder, `tracing` logs
//! behind the `tracing` feature, and `metrics` counters/gauges behind the
//! `metrics` feature.

pub use breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::BreakerError;
pub use events::CircuitBreakerEvent;

mod breaker;
mod config;
mod error;
mod events;
