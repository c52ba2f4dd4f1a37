//! Background health checking.
//!
//! Each cycle probes every endpoint concurrently with a per-probe deadline.
//! Anything other than a positive probe result inside the deadline counts
//! as a failure: timeouts, DNS errors, and transport errors all look the
//! same to the pool. Probing never blocks request-time selection; the
//! healthy bit is read lock-free.

use crate::events::BalancerEvent;
use crate::pool::EndpointPool;
use edge_utils_core::EventListeners;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Transport used to probe an endpoint.
///
/// Implemented for closures returning a boxed future, so tests can fake a
/// fleet in one line:
///
/// ```rust
/// use edge_utils_balancer::ProbeTransport;
/// use futures::future::BoxFuture;
/// use futures::FutureExt;
///
/// let transport = |url: String| -> BoxFuture<'static, bool> {
///     async move { url.contains("healthy") }.boxed()
/// };
/// let _: &dyn ProbeTransport = &transport;
/// ```
pub trait ProbeTransport: Send + Sync {
    /// Probes the URL; `true` means a 2xx response.
    fn probe(&self, url: String) -> BoxFuture<'static, bool>;
}

impl<F> ProbeTransport for F
where
    F: Fn(String) -> BoxFuture<'static, bool> + Send + Sync,
{
    fn probe(&self, url: String) -> BoxFuture<'static, bool> {
        self(url)
    }
}

/// GET prober over a shared HTTP client. A 2xx status is healthy.
#[cfg(feature = "http")]
pub struct HttpProber {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpProber {
    /// Creates a prober with a default client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Creates a prober over an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
impl ProbeTransport for HttpProber {
    fn probe(&self, url: String) -> BoxFuture<'static, bool> {
        let client = self.client.clone();
        Box::pin(async move {
            match client.get(&url).send().await {
                Ok(response) => response.status().is_success(),
                Err(_) => false,
            }
        })
    }
}

#[derive(Clone)]
pub(crate) struct HealthCheckSettings {
    pub interval: Duration,
    pub path: String,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            path: String::from("/health"),
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
            success_threshold: 2,
        }
    }
}

pub(crate) struct HealthChecker {
    pool: Arc<EndpointPool>,
    transport: Arc<dyn ProbeTransport>,
    settings: HealthCheckSettings,
    listeners: EventListeners<BalancerEvent>,
    balancer_name: String,
}

impl HealthChecker {
    pub(crate) fn new(
        pool: Arc<EndpointPool>,
        transport: Arc<dyn ProbeTransport>,
        settings: HealthCheckSettings,
        listeners: EventListeners<BalancerEvent>,
        balancer_name: String,
    ) -> Self {
        Self {
            pool,
            transport,
            settings,
            listeners,
            balancer_name,
        }
    }

    /// Spawns the probe loop; the returned handle is aborted on shutdown.
    pub(crate) fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.settings.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                self.probe_all().await;
            }
        })
    }

    /// Probes every endpoint once, in parallel, and applies the results.
    pub(crate) async fn probe_all(&self) {
        let endpoints = self.pool.all();
        let mut probes = Vec::with_capacity(endpoints.len());

        for endpoint in &endpoints {
            let url = format!("{}{}", endpoint.url(), self.settings.path);
            let transport = Arc::clone(&self.transport);
            let deadline = self.settings.timeout;
            probes.push(tokio::spawn(async move {
                tokio::time::timeout(deadline, transport.probe(url))
                    .await
                    .unwrap_or(false)
            }));
        }

        for (endpoint, probe) in endpoints.iter().zip(probes) {
            let success = probe.await.unwrap_or(false);
            let flipped = endpoint.observe_probe(
                success,
                self.settings.failure_threshold,
                self.settings.success_threshold,
            );

            if let Some(healthy) = flipped {
                self.listeners.emit(&BalancerEvent::HealthChanged {
                    balancer_name: self.balancer_name.clone(),
                    timestamp: Instant::now(),
                    endpoint: endpoint.url().to_string(),
                    healthy,
                });

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    balancer = %self.balancer_name,
                    endpoint = endpoint.url(),
                    healthy,
                    "endpoint health changed"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "balancer_health_flips_total",
                    "balancer" => self.balancer_name.clone(),
                    "to" => if healthy { "healthy" } else { "unhealthy" }
                )
                .increment(1);
            }
        }
    }
}
