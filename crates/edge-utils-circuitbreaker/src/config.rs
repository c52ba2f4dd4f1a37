use crate::breaker::{CircuitBreaker, CircuitState};
use crate::events::CircuitBreakerEvent;
use edge_utils_core::{Clock, EventListeners, FnListener, MonotonicClock};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the circuit breaker.
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) recovery_timeout: Duration,
    pub(crate) half_open_required_successes: u32,
    pub(crate) monitoring_period: Duration,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

/// Builder for configuring and constructing a [`CircuitBreaker`].
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_required_successes: u32,
    monitoring_period: Duration,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_required_successes: 2,
            monitoring_period: Duration::from_secs(10),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Sets the number of consecutive failures that trips the circuit open.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets how long the circuit stays open before probing recovery.
    ///
    /// Default: 60 seconds
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Sets the number of consecutive half-open successes that re-close the
    /// circuit.
    ///
    /// Default: 2
    pub fn half_open_required_successes(mut self, successes: u32) -> Self {
        self.half_open_required_successes = successes;
        self
    }

    /// Sets the length of the rolling window used by
    /// [`CircuitBreaker::stats`] to compute the failure rate.
    ///
    /// Default: 10 seconds
    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = period;
        self
    }

    /// Give this breaker a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a callback for state transition events.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Register a callback for call rejected events.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if matches!(event, CircuitBreakerEvent::CallRejected { .. }) {
                    f();
                }
            }));
        self
    }

    /// Register a callback for recorded failures.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::FailureRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Builds the breaker.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::from_config(CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            recovery_timeout: self.recovery_timeout,
            half_open_required_successes: self.half_open_required_successes.max(1),
            monitoring_period: self.monitoring_period,
            event_listeners: self.event_listeners,
            name: self.name,
            clock: self.clock,
        })
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
