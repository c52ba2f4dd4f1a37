//! Injectable randomness.
//!
//! Jittered selection scoring and trace sampling draw through
//! [`RandomSource`] so tie-breaks can be made deterministic in tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of randomness for jitter, sampling, and id generation.
pub trait RandomSource: Send + Sync + std::fmt::Debug {
    /// A uniform value in `[0, 1)`.
    fn next_f64(&self) -> f64;

    /// A uniform 64-bit value.
    fn next_u64(&self) -> u64;
}

/// Default source backed by the thread-local RNG.
#[derive(Debug, Clone, Default)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_f64(&self) -> f64 {
        rand::random::<f64>()
    }

    fn next_u64(&self) -> u64 {
        rand::random::<u64>()
    }
}

/// Deterministic source returning a fixed fraction and sequential ids.
///
/// With a fixed fraction every jitter multiplier is identical, so score
/// comparisons reduce to the un-jittered ordering.
#[derive(Debug)]
pub struct FixedSource {
    fraction: f64,
    counter: AtomicU64,
}

impl FixedSource {
    /// Creates a source that always returns `fraction` from [`next_f64`].
    ///
    /// [`next_f64`]: RandomSource::next_f64
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction,
            counter: AtomicU64::new(1),
        }
    }
}

impl RandomSource for FixedSource {
    fn next_f64(&self) -> f64 {
        self.fraction
    }

    fn next_u64(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}
