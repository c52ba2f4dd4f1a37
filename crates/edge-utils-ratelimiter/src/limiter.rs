use crate::config::RateLimitStrategy;
use dashmap::DashMap;
use edge_utils_core::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Token bucket state for a single key.
///
/// Tokens refill lazily: every decision first credits the elapsed time at
/// the configured rate, capped at capacity, then tries to consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenBucketState {
    pub(crate) tokens: f64,
    pub(crate) last_refill_millis: u64,
}

impl TokenBucketState {
    fn new(capacity: f64, now: u64) -> Self {
        Self {
            tokens: capacity,
            last_refill_millis: now,
        }
    }

    fn refill(&mut self, capacity: f64, rate_per_sec: f64, now: u64) {
        let elapsed_sec = now.saturating_sub(self.last_refill_millis) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed_sec * rate_per_sec).min(capacity);
        self.last_refill_millis = now;
    }

    fn try_consume(&mut self, cost: f64) -> bool {
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Earliest instant at which a cost-1 request could pass.
    fn reset_time_millis(&self, rate_per_sec: f64, now: u64) -> u64 {
        if self.tokens >= 1.0 || rate_per_sec <= 0.0 {
            now
        } else {
            let wait_sec = (1.0 - self.tokens) / rate_per_sec;
            now + (wait_sec * 1000.0).ceil() as u64
        }
    }
}

/// Sliding window state for a single key: a rolling log of admit times.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SlidingWindowState {
    pub(crate) timestamps: VecDeque<u64>,
}

impl SlidingWindowState {
    fn prune(&mut self, window_millis: u64, now: u64) {
        let cutoff = now.saturating_sub(window_millis);
        while let Some(&front) = self.timestamps.front() {
            if front < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_admit(&mut self, max_requests: usize, now: u64) -> bool {
        if self.timestamps.len() < max_requests {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    fn reset_time_millis(&self, window_millis: u64, now: u64) -> u64 {
        match self.timestamps.front() {
            Some(&oldest) => (oldest + window_millis).max(now),
            None => now,
        }
    }
}

/// Per-key state, one variant per strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum KeyState {
    Bucket(TokenBucketState),
    Window(SlidingWindowState),
}

impl KeyState {
    pub(crate) fn fresh(strategy: &RateLimitStrategy, now: u64) -> Self {
        match strategy {
            RateLimitStrategy::TokenBucket { capacity, .. } => {
                KeyState::Bucket(TokenBucketState::new(*capacity, now))
            }
            RateLimitStrategy::SlidingWindow { .. } => {
                KeyState::Window(SlidingWindowState::default())
            }
        }
    }
}

/// Outcome of one rate-limit decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitDecision {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// The configured ceiling (bucket capacity or window maximum).
    pub limit: i64,
    /// Requests still available right now.
    pub remaining: i64,
    /// Clock position, in seconds, when another cost-1 request could pass.
    pub reset_at_secs: u64,
}

/// Applies `strategy` to `state`, consuming on allow.
///
/// Resets mismatched state (a corrupt or foreign store value) to fresh
/// before deciding.
pub(crate) fn apply_strategy(
    strategy: &RateLimitStrategy,
    state: &mut KeyState,
    cost: f64,
    now: u64,
) -> LimitDecision {
    realign(strategy, state, now);

    match (strategy, state) {
        (
            RateLimitStrategy::TokenBucket {
                capacity,
                refill_rate_per_sec,
            },
            KeyState::Bucket(bucket),
        ) => {
            bucket.refill(*capacity, *refill_rate_per_sec, now);
            let allowed = bucket.try_consume(cost);
            LimitDecision {
                allowed,
                limit: *capacity as i64,
                remaining: bucket.tokens.floor() as i64,
                reset_at_secs: millis_to_secs(bucket.reset_time_millis(*refill_rate_per_sec, now)),
            }
        }
        (
            RateLimitStrategy::SlidingWindow {
                window,
                max_requests,
            },
            KeyState::Window(log),
        ) => {
            let window_millis = window.as_millis() as u64;
            log.prune(window_millis, now);
            let allowed = log.try_admit(*max_requests, now);
            LimitDecision {
                allowed,
                limit: *max_requests as i64,
                remaining: max_requests.saturating_sub(log.timestamps.len()) as i64,
                reset_at_secs: millis_to_secs(log.reset_time_millis(window_millis, now)),
            }
        }
        _ => unreachable!("realign pins state to the strategy variant"),
    }
}

/// Like [`apply_strategy`] but never consumes: refills/prunes and reports.
pub(crate) fn probe_strategy(
    strategy: &RateLimitStrategy,
    state: &mut KeyState,
    now: u64,
) -> LimitDecision {
    realign(strategy, state, now);

    match (strategy, state) {
        (
            RateLimitStrategy::TokenBucket {
                capacity,
                refill_rate_per_sec,
            },
            KeyState::Bucket(bucket),
        ) => {
            bucket.refill(*capacity, *refill_rate_per_sec, now);
            LimitDecision {
                allowed: bucket.tokens >= 1.0,
                limit: *capacity as i64,
                remaining: bucket.tokens.floor() as i64,
                reset_at_secs: millis_to_secs(bucket.reset_time_millis(*refill_rate_per_sec, now)),
            }
        }
        (
            RateLimitStrategy::SlidingWindow {
                window,
                max_requests,
            },
            KeyState::Window(log),
        ) => {
            let window_millis = window.as_millis() as u64;
            log.prune(window_millis, now);
            let len = log.timestamps.len();
            LimitDecision {
                allowed: len < *max_requests,
                limit: *max_requests as i64,
                remaining: max_requests.saturating_sub(len) as i64,
                reset_at_secs: millis_to_secs(log.reset_time_millis(window_millis, now)),
            }
        }
        _ => unreachable!("realign pins state to the strategy variant"),
    }
}

fn realign(strategy: &RateLimitStrategy, state: &mut KeyState, now: u64) {
    let mismatched = !matches!(
        (strategy, &*state),
        (RateLimitStrategy::TokenBucket { .. }, KeyState::Bucket(_))
            | (RateLimitStrategy::SlidingWindow { .. }, KeyState::Window(_))
    );
    if mismatched {
        *state = KeyState::fresh(strategy, now);
    }
}

fn millis_to_secs(millis: u64) -> u64 {
    millis.div_ceil(1000)
}

/// One strategy applied across many independent keys.
///
/// Decisions for the same key are serialised; distinct keys only contend on
/// their hash shard.
pub struct KeyedLimiter {
    strategy: RateLimitStrategy,
    states: DashMap<String, KeyState>,
    clock: Arc<dyn Clock>,
}

impl KeyedLimiter {
    /// Creates a limiter on the wall clock.
    pub fn new(strategy: RateLimitStrategy) -> Self {
        Self::with_clock(strategy, Arc::new(SystemClock))
    }

    /// Creates a limiter reading time from the given clock.
    pub fn with_clock(strategy: RateLimitStrategy, clock: Arc<dyn Clock>) -> Self {
        Self {
            strategy,
            states: DashMap::new(),
            clock,
        }
    }

    /// Decides whether `key` may proceed, consuming `cost` on allow.
    pub fn check(&self, key: &str, cost: f64) -> LimitDecision {
        let now = self.clock.now_millis();
        let mut entry = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| KeyState::fresh(&self.strategy, now));
        apply_strategy(&self.strategy, entry.value_mut(), cost, now)
    }

    /// Requests currently available for `key`, without consuming.
    pub fn remaining(&self, key: &str) -> i64 {
        self.probe(key).remaining
    }

    /// Clock position, in seconds, when `key` could next pass a cost-1
    /// request.
    pub fn reset_time(&self, key: &str) -> u64 {
        self.probe(key).reset_at_secs
    }

    /// The strategy this limiter applies.
    pub fn strategy(&self) -> &RateLimitStrategy {
        &self.strategy
    }

    fn probe(&self, key: &str) -> LimitDecision {
        let now = self.clock.now_millis();
        let mut entry = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| KeyState::fresh(&self.strategy, now));
        probe_strategy(&self.strategy, entry.value_mut(), now)
    }
}
