//! Keyed rate limiting for edge request handling.
//!
//! Two algorithms are provided as a closed set of strategies:
//!
//! - **Token bucket**: burstable capacity with a steady refill rate.
//!   Tokens are refilled lazily on every decision, so no background work is
//!   needed.
//! - **Sliding window**: a rolling log of request timestamps; at most
//!   `max_requests` are admitted in any window of the configured length.
//!
//! [`KeyedLimiter`] applies one strategy across many independent keys.
//! [`RateLimitManager`] sits above named strategies and handles what the
//! HTTP entry point needs: client identity extraction from headers,
//! exemption and whitelist sets, `X-RateLimit-*` response headers, and an
//! optional shared store so several instances agree on counts. When the
//! store misbehaves the manager fails open rather than refusing traffic.
//!
//! ## Example
//!
//! ```rust
//! use edge_utils_ratelimiter::{RateLimitManager, RateLimitStrategy};
//! use http::HeaderMap;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let manager = RateLimitManager::builder()
//!     .strategy("api", RateLimitStrategy::TokenBucket {
//!         capacity: 100.0,
//!         refill_rate_per_sec: 10.0,
//!     })
//!     .strategy("login", RateLimitStrategy::SlidingWindow {
//!         window: Duration::from_secs(60),
//!         max_requests: 10,
//!     })
//!     .exempt("10.0.0.1")
//!     .build();
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("cf-connecting-ip", "203.0.113.7".parse().unwrap());
//!
//! let verdict = manager.check(&headers, "api", None).await.unwrap();
//! assert!(verdict.allowed);
//! assert!(verdict.headers.contains_key("x-ratelimit-remaining"));
//! # }
//! ```

pub use config::{RateLimitManagerConfig, RateLimitManagerConfigBuilder, RateLimitStrategy};
pub use error::RateLimitError;
pub use limiter::{KeyedLimiter, LimitDecision};
pub use manager::{RateLimitManager, RateLimitVerdict};

mod config;
mod error;
mod limiter;
mod manager;
