use crate::adaptive::recompute_weights;
use crate::config::{LoadBalancerBuilder, LoadBalancerConfig};
use crate::error::BalancerError;
use crate::events::BalancerEvent;
use crate::health::HealthChecker;
use crate::policy::{SelectionContext, SelectionPolicy};
use crate::pool::EndpointPool;
use crate::recorder::PerformanceRecorder;
use crate::sticky::StickySessions;
use edge_utils_core::{Clock, EventListeners, RandomSource};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Read-only view of one endpoint's counters, for dashboards and the
/// metrics sink.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStats {
    /// Endpoint URL.
    pub url: String,
    /// Current health bit.
    pub healthy: bool,
    /// In-flight requests.
    pub active_requests: u32,
    /// Cumulative successes.
    pub total_successes: u64,
    /// Cumulative failures.
    pub total_failures: u64,
    /// Moving-average response time in milliseconds.
    pub avg_response_time_ms: f64,
    /// Current adaptive weight.
    pub adaptive_weight: f64,
}

/// The traffic coordinator: endpoint pool, performance history, sticky
/// bindings, selection policy, and the two background loops (health
/// probing, adaptive weight recomputation).
///
/// # Example
///
/// ```rust
/// use edge_utils_balancer::{LoadBalancer, SelectionPolicy};
///
/// # async fn example() {
/// let balancer = LoadBalancer::builder()
///     .endpoint("http://origin-a:8080")
///     .weighted_endpoint("http://origin-b:8080", 2.0)
///     .policy(SelectionPolicy::WeightedRoundRobin)
///     .build();
///
/// let target = balancer.next_endpoint(None).unwrap();
/// balancer.record_request_start(&target);
/// // ... proxy the request ...
/// balancer.record_request_end(&target, 42.0, true);
/// # }
/// ```
pub struct LoadBalancer {
    pool: Arc<EndpointPool>,
    recorder: Arc<PerformanceRecorder>,
    sticky: Option<StickySessions>,
    policy: SelectionPolicy,
    health: Option<Arc<HealthChecker>>,
    weight_update_interval: Duration,
    listeners: EventListeners<BalancerEvent>,
    name: String,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LoadBalancer {
    /// Returns a new builder with default settings.
    pub fn builder() -> LoadBalancerBuilder {
        LoadBalancerBuilder::new()
    }

    pub(crate) fn from_config(config: LoadBalancerConfig) -> Self {
        let pool = Arc::new(EndpointPool::new(config.endpoints));
        let recorder = Arc::new(PerformanceRecorder::new(
            config.sample_capacity,
            config.sample_trigger,
            Arc::clone(&config.clock),
        ));
        let sticky = config.sticky_ttl.map(|ttl| {
            StickySessions::new(ttl.as_millis() as u64, Arc::clone(&config.clock))
        });
        let health = config.probe_transport.map(|transport| {
            Arc::new(HealthChecker::new(
                Arc::clone(&pool),
                transport,
                config.health,
                config.listeners.clone(),
                config.name.clone(),
            ))
        });

        Self {
            pool,
            recorder,
            sticky,
            policy: config.policy,
            health,
            weight_update_interval: config.weight_update_interval,
            listeners: config.listeners,
            name: config.name,
            clock: config.clock,
            random: config.random,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts the background loops. Must be called on a tokio runtime.
    ///
    /// Idempotent in effect but not in resources: call once.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap();

        if let Some(health) = &self.health {
            tasks.push(Arc::clone(health).spawn());
        }

        let pool = Arc::clone(&self.pool);
        let recorder = Arc::clone(&self.recorder);
        let notify = self.recorder.update_notify();
        let listeners = self.listeners.clone();
        let name = self.name.clone();
        let interval = self.weight_update_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The interval's first tick is immediate; consume it so the
            // loop waits a full period (or a sample burst) before the
            // first recomputation.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = notify.notified() => {}
                }
                recompute_weights(&pool, &recorder);
                listeners.emit(&BalancerEvent::WeightsRecomputed {
                    balancer_name: name.clone(),
                    timestamp: Instant::now(),
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(balancer = %name, "adaptive weights recomputed");
            }
        }));
    }

    /// Stops the background loops. Safe to call multiple times.
    pub fn destroy(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    /// Picks an endpoint for the next request.
    ///
    /// With sticky sessions enabled and a client key present, the client's
    /// live binding wins; otherwise the configured policy runs over the
    /// eligible list. Errors when no endpoint is eligible.
    pub fn next_endpoint(&self, client_key: Option<&str>) -> Result<String, BalancerError> {
        let eligible = self.pool.eligible();
        if eligible.is_empty() {
            return Err(BalancerError::NoEligibleEndpoint);
        }

        if let (Some(sticky), Some(key)) = (&self.sticky, client_key) {
            if let Some(endpoint) = sticky.sticky_endpoint(key, &eligible) {
                return Ok(endpoint.url().to_string());
            }
        }

        let ctx = SelectionContext {
            client_key,
            pool: &self.pool,
            recorder: &self.recorder,
            random: self.random.as_ref(),
        };
        let endpoint = self
            .policy
            .select(&eligible, &ctx)
            .ok_or(BalancerError::NoEligibleEndpoint)?;

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "balancer_selections_total",
            "balancer" => self.name.clone(),
            "endpoint" => endpoint.url().to_string()
        )
        .increment(1);

        Ok(endpoint.url().to_string())
    }

    /// Marks a request in flight on `endpoint_url`. Unknown URLs are
    /// no-ops.
    pub fn record_request_start(&self, endpoint_url: &str) {
        if let Some(endpoint) = self.pool.get(endpoint_url) {
            endpoint.begin_request();
        }
    }

    /// Records a finished request: drops the active count, folds the
    /// response time into the endpoint's average, bumps the outcome
    /// counter, and appends a performance sample. Unknown URLs (including
    /// endpoints removed mid-flight) are no-ops.
    pub fn record_request_end(&self, endpoint_url: &str, response_time_ms: f64, success: bool) {
        let Some(endpoint) = self.pool.get(endpoint_url) else {
            return;
        };

        let active_at_start = endpoint.end_request();
        endpoint.record_outcome(success);
        endpoint.push_response_time(response_time_ms);
        self.recorder
            .append(endpoint_url, response_time_ms, success, active_at_start);
    }

    /// Replaces the endpoint list; surviving URLs keep their counters.
    pub fn set_endpoints(&self, entries: Vec<(String, f64)>) {
        self.pool.set_endpoints(entries);
    }

    /// Adds an endpoint to the pool.
    pub fn add_endpoint(&self, url: &str, weight: f64) {
        self.pool.add_endpoint(url, weight);
    }

    /// Removes an endpoint and its sample history. Outstanding
    /// `record_request_end` calls against it become no-ops.
    pub fn remove_endpoint(&self, url: &str) {
        self.pool.remove_endpoint(url);
        self.recorder.remove(url);
    }

    /// Drops expired sticky bindings, when sticky sessions are enabled.
    pub fn cleanup_sticky_sessions(&self) {
        if let Some(sticky) = &self.sticky {
            sticky.cleanup();
        }
    }

    /// Per-endpoint counters for dashboards and the metrics sink.
    pub fn endpoint_stats(&self) -> Vec<EndpointStats> {
        self.pool
            .all()
            .iter()
            .map(|e| EndpointStats {
                url: e.url().to_string(),
                healthy: e.is_healthy(),
                active_requests: e.active_requests(),
                total_successes: e.total_successes(),
                total_failures: e.total_failures(),
                avg_response_time_ms: e.avg_response_time(),
                adaptive_weight: e.adaptive_weight(),
            })
            .collect()
    }

    /// The endpoint pool.
    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// The performance recorder.
    pub fn recorder(&self) -> &PerformanceRecorder {
        &self.recorder
    }

    /// Name given to this balancer for observability.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The clock this balancer reads.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Runs one probe cycle immediately, outside the timer. No-op without
    /// a probe transport.
    pub async fn probe_now(&self) {
        if let Some(health) = &self.health {
            health.probe_all().await;
        }
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        self.destroy();
    }
}
