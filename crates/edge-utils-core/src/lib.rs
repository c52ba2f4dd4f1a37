//! Core infrastructure for edge-utils.
//!
//! This crate provides shared functionality used across all edge-utils
//! components:
//! - Event system for observability
//! - Injectable clocks so time-based logic is deterministic in tests
//! - Injectable randomness for jittered policies and samplers
//! - Pluggable key-value store contract for distributed state

pub mod clock;
pub mod events;
pub mod random;
pub mod store;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use events::{EdgeEvent, EventListener, EventListeners, FnListener};
pub use random::{FixedSource, RandomSource, ThreadRngSource};
pub use store::{KeyValueStore, MemoryStore, StoreError};
