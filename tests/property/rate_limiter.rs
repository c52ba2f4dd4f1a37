//! Property tests for the rate limiter.
//!
//! Invariants tested:
//! - Token counts stay in [0, capacity] and only shrink on allowed calls
//! - No window of the configured length ever admits more than the cap

use edge_utils_core::{Clock, ManualClock};
use edge_utils_ratelimiter::{KeyedLimiter, RateLimitStrategy};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: across arbitrary check/advance sequences, the remaining
    /// token count stays within [0, capacity], and a denied call never
    /// consumes.
    #[test]
    fn token_bucket_conserves_tokens(
        capacity in 1u32..100,
        rate in 1u32..50,
        ops in prop::collection::vec((0u64..5_000, 1u32..20), 1..100),
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = KeyedLimiter::with_clock(
            RateLimitStrategy::TokenBucket {
                capacity: f64::from(capacity),
                refill_rate_per_sec: f64::from(rate),
            },
            clock.clone(),
        );

        for (advance_millis, cost) in ops {
            clock.advance_millis(advance_millis);
            let before = limiter.remaining("key");
            let decision = limiter.check("key", f64::from(cost));
            let after = limiter.remaining("key");

            prop_assert!((0..=i64::from(capacity)).contains(&after));
            if !decision.allowed {
                // Denial must not consume: the balance never drops.
                prop_assert!(after >= before);
            }
        }
    }

    /// Property: replaying the accepted timestamps, no window of the
    /// configured length ever contains more than max_requests of them.
    #[test]
    fn sliding_window_caps_every_window(
        max_requests in 1usize..20,
        window_secs in 1u64..60,
        ops in prop::collection::vec(0u64..3_000, 1..200),
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = KeyedLimiter::with_clock(
            RateLimitStrategy::SlidingWindow {
                window: Duration::from_secs(window_secs),
                max_requests,
            },
            clock.clone(),
        );

        let window_millis = window_secs * 1000;
        let mut accepted: Vec<u64> = Vec::new();

        for advance_millis in ops {
            clock.advance_millis(advance_millis);
            if limiter.check("key", 1.0).allowed {
                accepted.push(clock.now_millis());
            }
        }

        for (i, &start) in accepted.iter().enumerate() {
            let in_window = accepted[i..]
                .iter()
                .take_while(|&&t| t - start <= window_millis)
                .count();
            prop_assert!(
                in_window <= max_requests,
                "{in_window} admits inside one {window_millis}ms window (cap {max_requests})"
            );
        }
    }
}
