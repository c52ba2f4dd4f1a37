//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - Only legal state transitions occur, under any outcome/clock sequence
//! - The breaker tracks a reference model of the state machine

use edge_utils_circuitbreaker::{CircuitBreaker, CircuitState};
use edge_utils_core::{Clock, ManualClock};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FAILURE_THRESHOLD: u32 = 5;
const RECOVERY_MILLIS: u64 = 60_000;
const HALF_OPEN_SUCCESSES: u32 = 2;

/// Reference model of the breaker state machine.
struct Model {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: u64,
    half_open_successes: u32,
}

impl Model {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: 0,
            half_open_successes: 0,
        }
    }

    fn apply(&mut self, now: u64, success: bool) {
        if self.state == CircuitState::Open {
            if now.saturating_sub(self.last_failure_at) > RECOVERY_MILLIS {
                self.state = CircuitState::HalfOpen;
                self.half_open_successes = 0;
            } else {
                // Rejected: the operation never runs.
                return;
            }
        }

        if success {
            self.consecutive_failures = 0;
            if self.state == CircuitState::HalfOpen {
                self.half_open_successes += 1;
                if self.half_open_successes >= HALF_OPEN_SUCCESSES {
                    self.state = CircuitState::Closed;
                }
            }
        } else {
            self.consecutive_failures += 1;
            self.last_failure_at = now;
            if self.consecutive_failures >= FAILURE_THRESHOLD {
                self.state = CircuitState::Open;
            }
        }
    }
}

fn legal(from: CircuitState, to: CircuitState) -> bool {
    matches!(
        (from, to),
        (CircuitState::Closed, CircuitState::Open)
            | (CircuitState::Open, CircuitState::HalfOpen)
            | (CircuitState::HalfOpen, CircuitState::Closed)
            | (CircuitState::HalfOpen, CircuitState::Open)
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: the breaker follows the reference model exactly, and
    /// every observed transition edge is legal.
    #[test]
    fn breaker_matches_the_reference_model(
        ops in prop::collection::vec((prop::bool::ANY, 0u64..200_000), 1..120),
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let transitions_clone = Arc::clone(&transitions);

        let breaker = CircuitBreaker::builder()
            .failure_threshold(FAILURE_THRESHOLD)
            .recovery_timeout(Duration::from_millis(RECOVERY_MILLIS))
            .half_open_required_successes(HALF_OPEN_SUCCESSES)
            .clock(clock.clone())
            .on_state_transition(move |from, to| {
                transitions_clone.lock().unwrap().push((from, to));
            })
            .build();

        let mut model = Model::new();

        for (success, advance_millis) in ops {
            clock.advance_millis(advance_millis);
            model.apply(clock.now_millis(), success);

            let _ = futures::executor::block_on(breaker.execute(|| async move {
                if success {
                    Ok::<(), &str>(())
                } else {
                    Err("failure")
                }
            }));

            prop_assert_eq!(breaker.state(), model.state);
        }

        for (from, to) in transitions.lock().unwrap().iter() {
            prop_assert!(legal(*from, *to), "illegal transition {from:?} -> {to:?}");
        }
    }
}
