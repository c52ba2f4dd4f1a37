use crate::config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
use crate::error::BreakerError;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed,
    /// The circuit is open and calls are rejected.
    Open,
    /// The circuit is half-open and probing recovery.
    HalfOpen,
}

impl CircuitState {
    fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

/// Snapshot of breaker state for observability.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerStats {
    /// Current state of the breaker.
    pub state: CircuitState,
    /// Consecutive failures recorded since the last success.
    pub consecutive_failures: u32,
    /// Calls recorded in the current monitoring window.
    pub request_count: u64,
    /// Failure rate over the monitoring window just closed. Present only
    /// when the window had elapsed at the time of the call; taking the
    /// stats then starts a fresh window.
    pub failure_rate: Option<f64>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at_millis: u64,
    half_open_successes: u32,
    request_count: u64,
    failure_count: u64,
    window_started_at_millis: u64,
}

/// Per-target circuit breaker.
///
/// Cloning is cheap and all clones share the same state, so one breaker can
/// guard a target from many request handlers. Transitions are serialised by
/// a single mutex per breaker; the protected operation itself runs outside
/// the lock.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<BreakerInner>>,
    config: Arc<CircuitBreakerConfig>,
}

impl CircuitBreaker {
    /// Returns a new builder with default settings.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    pub(crate) fn from_config(config: CircuitBreakerConfig) -> Self {
        let now = config.clock.now_millis();
        Self {
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at_millis: 0,
                half_open_successes: 0,
                request_count: 0,
                failure_count: 0,
                window_started_at_millis: now,
            })),
            config: Arc::new(config),
        }
    }

    /// Runs `op` under breaker protection.
    ///
    /// Returns [`BreakerError::Open`] without invoking `op` while the
    /// circuit is open; otherwise runs the operation, records its outcome,
    /// and passes any operation error through as [`BreakerError::Inner`].
    pub async fn execute<T, E, Fut, Op>(&self, op: Op) -> Result<T, BreakerError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Name given to this breaker for observability.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the current stats, closing and resetting the monitoring
    /// window if it has elapsed.
    pub fn stats(&self) -> BreakerStats {
        let now = self.config.clock.now_millis();
        let mut inner = self.inner.lock().unwrap();

        let window_elapsed = now.saturating_sub(inner.window_started_at_millis)
            >= self.config.monitoring_period.as_millis() as u64;

        let failure_rate = if window_elapsed {
            let rate = if inner.request_count > 0 {
                inner.failure_count as f64 / inner.request_count as f64
            } else {
                0.0
            };
            Some(rate)
        } else {
            None
        };

        let stats = BreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            request_count: inner.request_count,
            failure_rate,
        };

        if window_elapsed {
            inner.request_count = 0;
            inner.failure_count = 0;
            inner.window_started_at_millis = now;
        }

        stats
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        let now = self.config.clock.now_millis();
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure_at_millis = now;
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Resets the breaker to closed with cleared counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        self.transition(&mut inner, CircuitState::Closed);
    }

    fn try_acquire<E>(&self) -> Result<(), BreakerError<E>> {
        let now = self.config.clock.now_millis();
        let mut inner = self.inner.lock().unwrap();

        if inner.state == CircuitState::Open {
            let elapsed = now.saturating_sub(inner.last_failure_at_millis);
            let recovery = self.config.recovery_timeout.as_millis() as u64;
            if elapsed > recovery {
                self.transition(&mut inner, CircuitState::HalfOpen);
            } else {
                self.config
                    .event_listeners
                    .emit(&CircuitBreakerEvent::CallRejected {
                        breaker_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                    });

                #[cfg(feature = "metrics")]
                counter!("circuitbreaker_rejected_total", "circuitbreaker" => self.config.name.clone())
                    .increment(1);

                return Err(BreakerError::Open {
                    retry_after: Duration::from_millis(recovery.saturating_sub(elapsed)),
                });
            }
        }

        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallPermitted {
                breaker_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state: inner.state,
            });
        Ok(())
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.request_count += 1;
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.half_open_required_successes {
                self.transition(&mut inner, CircuitState::Closed);
            }
        }

        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::SuccessRecorded {
                breaker_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state: inner.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => self.config.name.clone(), "outcome" => "success")
            .increment(1);
    }

    fn record_failure(&self) {
        let now = self.config.clock.now_millis();
        let mut inner = self.inner.lock().unwrap();
        inner.request_count += 1;
        inner.failure_count += 1;
        inner.consecutive_failures += 1;
        inner.last_failure_at_millis = now;

        if inner.state != CircuitState::Open
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            self.transition(&mut inner, CircuitState::Open);
        }

        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::FailureRecorded {
                breaker_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state: inner.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => self.config.name.clone(), "outcome" => "failure")
            .increment(1);
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        if inner.state == to {
            return;
        }

        let from = inner.state;
        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                breaker_name: self.config.name.clone(),
                timestamp: Instant::now(),
                from_state: from,
                to_state: to,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(
            breaker = %self.config.name,
            from = from.as_str(),
            to = to.as_str(),
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => self.config.name.clone(),
                "from" => from.as_str(),
                "to" => to.as_str()
            )
            .increment(1);

            gauge!("circuitbreaker_state", "circuitbreaker" => self.config.name.clone())
                .set(match to {
                    CircuitState::Closed => 0.0,
                    CircuitState::Open => 1.0,
                    CircuitState::HalfOpen => 2.0,
                });
        }

        inner.state = to;
        if to == CircuitState::HalfOpen {
            inner.half_open_successes = 0;
        }
    }
}
