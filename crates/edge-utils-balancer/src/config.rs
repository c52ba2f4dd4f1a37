use crate::balancer::LoadBalancer;
use crate::events::BalancerEvent;
use crate::health::{HealthCheckSettings, ProbeTransport};
use crate::policy::SelectionPolicy;
use edge_utils_core::{Clock, EventListeners, FnListener, MonotonicClock, RandomSource, ThreadRngSource};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct LoadBalancerConfig {
    pub endpoints: Vec<(String, f64)>,
    pub policy: SelectionPolicy,
    pub sticky_ttl: Option<Duration>,
    pub health: HealthCheckSettings,
    pub probe_transport: Option<Arc<dyn ProbeTransport>>,
    pub weight_update_interval: Duration,
    pub sample_trigger: u64,
    pub sample_capacity: usize,
    pub listeners: EventListeners<BalancerEvent>,
    pub name: String,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
}

/// Builder for [`LoadBalancer`].
pub struct LoadBalancerBuilder {
    endpoints: Vec<(String, f64)>,
    policy: SelectionPolicy,
    sticky_ttl: Option<Duration>,
    health: HealthCheckSettings,
    probe_transport: Option<Arc<dyn ProbeTransport>>,
    weight_update_interval: Duration,
    sample_trigger: u64,
    sample_capacity: usize,
    listeners: EventListeners<BalancerEvent>,
    name: String,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl LoadBalancerBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            policy: SelectionPolicy::default(),
            sticky_ttl: None,
            health: HealthCheckSettings::default(),
            probe_transport: None,
            weight_update_interval: Duration::from_secs(30),
            sample_trigger: 100,
            sample_capacity: 100,
            listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
            clock: Arc::new(MonotonicClock::default()),
            random: Arc::new(ThreadRngSource),
        }
    }

    /// Adds an endpoint with weight 1.
    pub fn endpoint<U: Into<String>>(self, url: U) -> Self {
        self.weighted_endpoint(url, 1.0)
    }

    /// Adds an endpoint with a static weight.
    pub fn weighted_endpoint<U: Into<String>>(mut self, url: U, weight: f64) -> Self {
        self.endpoints.push((url.into(), weight));
        self
    }

    /// Sets the selection policy.
    ///
    /// Default: round-robin
    pub fn policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enables sticky sessions with the given binding TTL.
    ///
    /// Default TTL when enabled: 30 minutes
    pub fn sticky_sessions(mut self, ttl: Duration) -> Self {
        self.sticky_ttl = Some(ttl);
        self
    }

    /// Sets the health probe interval.
    ///
    /// Default: 30 seconds
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health.interval = interval;
        self
    }

    /// Sets the path appended to each endpoint URL when probing.
    ///
    /// Default: `/health`
    pub fn health_check_path<P: Into<String>>(mut self, path: P) -> Self {
        self.health.path = path.into();
        self
    }

    /// Sets the per-probe deadline. A probe missing it counts as a failure.
    ///
    /// Default: 5 seconds
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health.timeout = timeout;
        self
    }

    /// Sets the consecutive probe failures that mark an endpoint unhealthy.
    ///
    /// Default: 3
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.health.failure_threshold = threshold;
        self
    }

    /// Sets the consecutive probe successes that mark an endpoint healthy
    /// again.
    ///
    /// Default: 2
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.health.success_threshold = threshold;
        self
    }

    /// Sets the probe transport. Without one, [`LoadBalancer::start`] runs
    /// no health loop and every endpoint keeps its current health bit.
    pub fn probe_transport<T>(mut self, transport: T) -> Self
    where
        T: ProbeTransport + 'static,
    {
        self.probe_transport = Some(Arc::new(transport));
        self
    }

    /// Sets the fallback interval for adaptive weight recomputation. The
    /// recorder's sample trigger can wake the loop earlier.
    ///
    /// Default: 30 seconds
    pub fn weight_update_interval(mut self, interval: Duration) -> Self {
        self.weight_update_interval = interval;
        self
    }

    /// Sets how many samples across all endpoints force an early weight
    /// recomputation.
    ///
    /// Default: 100
    pub fn sample_trigger(mut self, samples: u64) -> Self {
        self.sample_trigger = samples;
        self
    }

    /// Sets the per-endpoint sample ring capacity.
    ///
    /// Default: 100
    pub fn sample_capacity(mut self, capacity: usize) -> Self {
        self.sample_capacity = capacity;
        self
    }

    /// Give this balancer a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the random source (useful for deterministic tests).
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Register a callback for endpoint health changes.
    pub fn on_health_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &BalancerEvent| {
                if let BalancerEvent::HealthChanged {
                    endpoint, healthy, ..
                } = event
                {
                    f(endpoint, *healthy);
                }
            }));
        self
    }

    /// Register a callback for adaptive weight recomputations.
    pub fn on_weights_recomputed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners
            .add(FnListener::new(move |event: &BalancerEvent| {
                if matches!(event, BalancerEvent::WeightsRecomputed { .. }) {
                    f();
                }
            }));
        self
    }

    /// Builds the balancer. Background loops start with
    /// [`LoadBalancer::start`].
    pub fn build(self) -> LoadBalancer {
        LoadBalancer::from_config(LoadBalancerConfig {
            endpoints: self.endpoints,
            policy: self.policy,
            sticky_ttl: self.sticky_ttl,
            health: self.health,
            probe_transport: self.probe_transport,
            weight_update_interval: self.weight_update_interval,
            sample_trigger: self.sample_trigger,
            sample_capacity: self.sample_capacity,
            listeners: self.listeners,
            name: self.name,
            clock: self.clock,
            random: self.random,
        })
    }
}

impl Default for LoadBalancerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
