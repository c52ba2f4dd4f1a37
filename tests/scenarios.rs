//! Deterministic end-to-end scenarios across the toolkit.
//!
//! Every scenario runs on a manual clock and a fixed random source, so the
//! assertions are exact rather than statistical.

use edge_utils_balancer::{LoadBalancer, SelectionPolicy};
use edge_utils_circuitbreaker::{BreakerError, CircuitBreaker, CircuitState};
use edge_utils_core::{FixedSource, ManualClock};
use edge_utils_ratelimiter::{KeyedLimiter, RateLimitStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn abc_balancer(policy: SelectionPolicy) -> LoadBalancer {
    LoadBalancer::builder()
        .weighted_endpoint("http://a", 1.0)
        .weighted_endpoint("http://b", 1.0)
        .weighted_endpoint("http://c", 2.0)
        .policy(policy)
        .clock(Arc::new(ManualClock::new(0)))
        .random(Arc::new(FixedSource::new(0.0)))
        .build()
}

#[test]
fn round_robin_is_deterministic() {
    let balancer = abc_balancer(SelectionPolicy::RoundRobin);

    let picks: Vec<String> = (0..6)
        .map(|_| balancer.next_endpoint(None).unwrap())
        .collect();
    assert_eq!(
        picks,
        vec!["http://a", "http://b", "http://c", "http://a", "http://b", "http://c"]
    );
}

#[test]
fn weighted_round_robin_matches_the_weight_table() {
    let balancer = abc_balancer(SelectionPolicy::WeightedRoundRobin);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..8 {
        *counts
            .entry(balancer.next_endpoint(None).unwrap())
            .or_insert(0) += 1;
    }
    assert_eq!(counts["http://a"], 2);
    assert_eq!(counts["http://b"], 2);
    assert_eq!(counts["http://c"], 4);
}

#[tokio::test(start_paused = true)]
async fn adaptive_policy_prefers_the_fast_endpoint() {
    let clock = Arc::new(ManualClock::new(0));
    let balancer = LoadBalancer::builder()
        .endpoint("http://fast")
        .endpoint("http://slow")
        .endpoint("http://err")
        .policy(SelectionPolicy::Adaptive)
        .clock(clock)
        .random(Arc::new(FixedSource::new(0.0)))
        .sample_trigger(60)
        .build();
    balancer.start();
    tokio::time::sleep(Duration::from_millis(1)).await;

    for i in 0..20 {
        balancer.record_request_start("http://fast");
        balancer.record_request_end("http://fast", 50.0 + (i % 2) as f64 * 50.0, true);

        balancer.record_request_start("http://slow");
        balancer.record_request_end("http://slow", 2000.0 + (i % 2) as f64 * 1000.0, true);

        balancer.record_request_start("http://err");
        // 70% success rate: fail 6 of every 20.
        balancer.record_request_end("http://err", 500.0 + (i % 2) as f64 * 500.0, i % 10 >= 3);
    }
    // The 60th sample fired the adaptive-weight trigger.
    tokio::time::sleep(Duration::from_millis(1)).await;

    let stats: HashMap<String, f64> = balancer
        .endpoint_stats()
        .into_iter()
        .map(|s| (s.url, s.adaptive_weight))
        .collect();
    assert!(stats["http://fast"] > 1.0, "fast weight {stats:?}");
    assert!(stats["http://slow"] < 1.0, "slow weight {stats:?}");

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..10 {
        *counts
            .entry(balancer.next_endpoint(None).unwrap())
            .or_insert(0) += 1;
    }
    let fast = counts.get("http://fast").copied().unwrap_or(0);
    let slow = counts.get("http://slow").copied().unwrap_or(0);
    let err = counts.get("http://err").copied().unwrap_or(0);
    assert!(fast > slow, "fast {fast} vs slow {slow}");
    assert!(fast > err, "fast {fast} vs err {err}");

    balancer.destroy();
}

#[test]
fn token_bucket_refills_while_idle() {
    let clock = Arc::new(ManualClock::new(0));
    let limiter = KeyedLimiter::with_clock(
        RateLimitStrategy::TokenBucket {
            capacity: 100.0,
            refill_rate_per_sec: 10.0,
        },
        clock.clone(),
    );

    for _ in 0..9 {
        assert!(limiter.check("client", 10.0).allowed);
    }

    clock.advance_millis(600);
    assert!(limiter.check("client", 5.0).allowed);
}

#[test]
fn sliding_window_denies_the_eleventh_request() {
    let clock = Arc::new(ManualClock::new(0));
    let limiter = KeyedLimiter::with_clock(
        RateLimitStrategy::SlidingWindow {
            window: Duration::from_secs(60),
            max_requests: 10,
        },
        clock,
    );

    let verdicts: Vec<bool> = (0..11).map(|_| limiter.check("client", 1.0).allowed).collect();
    assert_eq!(verdicts[..10], [true; 10]);
    assert!(!verdicts[10]);
}

#[tokio::test]
async fn breaker_walks_open_half_open_closed() {
    let clock = Arc::new(ManualClock::new(0));
    let breaker = CircuitBreaker::builder()
        .failure_threshold(3)
        .recovery_timeout(Duration::from_millis(100))
        .clock(clock.clone())
        .build();

    for _ in 0..3 {
        let result: Result<(), _> = breaker
            .execute(|| async { Err::<(), std::io::Error>(std::io::Error::other("boom")) })
            .await;
        assert!(result.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected: Result<(), BreakerError<std::io::Error>> =
        breaker.execute(|| async { Ok(()) }).await;
    assert!(matches!(rejected, Err(BreakerError::Open { .. })));

    clock.advance_millis(200);
    breaker
        .execute(|| async { Ok::<(), std::io::Error>(()) })
        .await
        .unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker
        .execute(|| async { Ok::<(), std::io::Error>(()) })
        .await
        .unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn sticky_binding_survives_restarts_of_other_clients() {
    let clock = Arc::new(ManualClock::new(0));
    let balancer = LoadBalancer::builder()
        .endpoint("http://a")
        .endpoint("http://b")
        .endpoint("http://c")
        .sticky_sessions(Duration::from_secs(1800))
        .clock(clock.clone())
        .build();

    let bound = balancer.next_endpoint(Some("client-7")).unwrap();
    for _ in 0..20 {
        balancer.next_endpoint(Some("other-client")).unwrap();
        assert_eq!(balancer.next_endpoint(Some("client-7")).unwrap(), bound);
    }

    // Binding expires with its TTL; the re-hash lands on the same endpoint
    // while the eligible set is unchanged.
    clock.advance_millis(1_800_000);
    assert_eq!(balancer.next_endpoint(Some("client-7")).unwrap(), bound);
}
