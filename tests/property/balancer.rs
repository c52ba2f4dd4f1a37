//! Property tests for the balancer.
//!
//! Invariants tested:
//! - Active counts never go negative and settle at starts − ends
//! - Round-robin visits every endpoint exactly once per cycle
//! - Weighted round-robin honors integer weight proportions
//! - Adaptive weights stay in [0.1, 3.0] for arbitrary sample histories
//! - Sticky bindings are stable while the eligible set is unchanged

use edge_utils_balancer::{LoadBalancer, SelectionPolicy};
use edge_utils_core::{FixedSource, ManualClock};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn balancer_of(n: usize, policy: SelectionPolicy) -> LoadBalancer {
    let mut builder = LoadBalancer::builder()
        .policy(policy)
        .clock(Arc::new(ManualClock::new(0)))
        .random(Arc::new(FixedSource::new(0.0)));
    for i in 0..n {
        builder = builder.endpoint(format!("http://e{i}"));
    }
    builder.build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: for any interleaving of starts and ends, the active count
    /// stays non-negative and a quiescent pool reads starts − ends
    /// (floored at zero per endpoint by the excess-end rule).
    #[test]
    fn active_counts_never_go_negative(
        ops in prop::collection::vec((0usize..3, prop::bool::ANY), 0..200),
    ) {
        let balancer = balancer_of(3, SelectionPolicy::RoundRobin);
        let mut expected = [0i64; 3];

        for (endpoint, is_start) in ops {
            let url = format!("http://e{endpoint}");
            if is_start {
                balancer.record_request_start(&url);
                expected[endpoint] += 1;
            } else {
                balancer.record_request_end(&url, 10.0, true);
                expected[endpoint] = (expected[endpoint] - 1).max(0);
            }
        }

        for (i, stats) in balancer.endpoint_stats().iter().enumerate() {
            prop_assert_eq!(i64::from(stats.active_requests), expected[i]);
        }
    }

    /// Property: round-robin over a static healthy set of size N yields
    /// each endpoint exactly once per N selections.
    #[test]
    fn round_robin_is_fair_per_cycle(
        n in 1usize..12,
        cycles in 1usize..8,
    ) {
        let balancer = balancer_of(n, SelectionPolicy::RoundRobin);

        for _ in 0..cycles {
            let mut seen = HashMap::new();
            for _ in 0..n {
                *seen.entry(balancer.next_endpoint(None).unwrap()).or_insert(0) += 1;
            }
            prop_assert_eq!(seen.len(), n);
            prop_assert!(seen.values().all(|&count| count == 1));
        }
    }

    /// Property: weighted round-robin yields endpoint i exactly w_i times
    /// per Σw selections.
    #[test]
    fn weighted_round_robin_honors_proportions(
        weights in prop::collection::vec(1u32..6, 2..6),
    ) {
        let mut builder = LoadBalancer::builder()
            .policy(SelectionPolicy::WeightedRoundRobin)
            .clock(Arc::new(ManualClock::new(0)));
        for (i, weight) in weights.iter().enumerate() {
            builder = builder.weighted_endpoint(format!("http://e{i}"), f64::from(*weight));
        }
        let balancer = builder.build();

        let total: u32 = weights.iter().sum();
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..total {
            *counts.entry(balancer.next_endpoint(None).unwrap()).or_insert(0) += 1;
        }

        for (i, weight) in weights.iter().enumerate() {
            let url = format!("http://e{i}");
            prop_assert_eq!(counts.get(&url).copied().unwrap_or(0), *weight);
        }
    }

    /// Property: after a weight recomputation over arbitrary samples,
    /// every adaptive weight lands in [0.1, 3.0].
    #[test]
    fn adaptive_weights_stay_in_bounds(
        samples in prop::collection::vec(
            (0usize..3, 0.0f64..20_000.0, prop::bool::ANY, 0u32..100),
            1..120,
        ),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut builder = LoadBalancer::builder()
                .clock(Arc::new(ManualClock::new(0)))
                .sample_trigger(1);
            for i in 0..3 {
                builder = builder.weighted_endpoint(format!("http://e{i}"), 5.0);
            }
            let balancer = builder.build();
            balancer.start();

            for (endpoint, rt_ms, success, active) in samples {
                let url = format!("http://e{endpoint}");
                for _ in 0..active.min(3) {
                    balancer.record_request_start(&url);
                }
                balancer.record_request_end(&url, rt_ms, success);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;

            for stats in balancer.endpoint_stats() {
                prop_assert!(
                    (0.1..=3.0).contains(&stats.adaptive_weight),
                    "weight {} out of bounds",
                    stats.adaptive_weight
                );
            }
            balancer.destroy();
            Ok(())
        })?;
    }

    /// Property: a sticky binding is returned unchanged for any number of
    /// lookups while the eligible set and the TTL hold.
    #[test]
    fn sticky_bindings_are_stable(
        client in "[a-z0-9.:]{1,24}",
        lookups in 1usize..50,
    ) {
        let balancer = LoadBalancer::builder()
            .endpoint("http://e0")
            .endpoint("http://e1")
            .endpoint("http://e2")
            .sticky_sessions(Duration::from_secs(1800))
            .clock(Arc::new(ManualClock::new(0)))
            .build();

        let bound = balancer.next_endpoint(Some(&client)).unwrap();
        for _ in 0..lookups {
            prop_assert_eq!(balancer.next_endpoint(Some(&client)).unwrap(), bound.clone());
        }
    }
}
