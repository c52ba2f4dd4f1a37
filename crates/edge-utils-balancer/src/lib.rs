//! Adaptive load balancing for edge request handling.
//!
//! The [`LoadBalancer`] coordinates four cooperating pieces:
//!
//! - An **endpoint pool** with lock-free per-endpoint counters and a
//!   copy-on-write endpoint list ([`EndpointPool`]).
//! - A **performance recorder** keeping a bounded ring of samples per
//!   endpoint ([`PerformanceRecorder`]).
//! - **Selection policies**: round-robin, weighted round-robin,
//!   least-connections, random, IP-hash, and adaptive composite scoring
//!   ([`SelectionPolicy`]).
//! - Two background loops: **health probing** that drives the eligible
//!   set, and **adaptive weight recomputation** fed by the recorder.
//!
//! Optional **sticky sessions** pin a client to one endpoint for a bounded
//! lifetime, as long as that endpoint stays eligible.
//!
//! ## Example
//!
//! ```rust
//! use edge_utils_balancer::{LoadBalancer, SelectionPolicy};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let balancer = LoadBalancer::builder()
//!     .endpoint("http://origin-a:8080")
//!     .endpoint("http://origin-b:8080")
//!     .policy(SelectionPolicy::Adaptive)
//!     .sticky_sessions(Duration::from_secs(30 * 60))
//!     .health_check_interval(Duration::from_secs(30))
//!     .build();
//!
//! balancer.start();
//!
//! if let Ok(target) = balancer.next_endpoint(Some("203.0.113.7")) {
//!     balancer.record_request_start(&target);
//!     // ... proxy the request ...
//!     balancer.record_request_end(&target, 42.0, true);
//! }
//!
//! balancer.destroy();
//! # }
//! ```
//!
//! Time and randomness are injected ([`edge_utils_core::Clock`],
//! [`edge_utils_core::RandomSource`]), so every TTL, window, and jittered
//! decision is deterministic under test.

pub use balancer::{EndpointStats, LoadBalancer};
pub use config::LoadBalancerBuilder;
pub use error::BalancerError;
pub use events::BalancerEvent;
#[cfg(feature = "http")]
pub use health::HttpProber;
pub use health::ProbeTransport;
pub use policy::SelectionPolicy;
pub use pool::{Endpoint, EndpointPool};
pub use recorder::{PerformanceRecorder, PerformanceSample};
pub use sticky::StickySessions;

mod adaptive;
mod balancer;
mod config;
mod error;
mod events;
mod health;
mod policy;
mod pool;
mod recorder;
mod sticky;
