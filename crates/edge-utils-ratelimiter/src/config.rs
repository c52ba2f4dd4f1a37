use crate::manager::RateLimitManager;
use edge_utils_core::{Clock, KeyValueStore, SystemClock};
use http::HeaderMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Type alias for a named identity extractor.
pub(crate) type IdentityExtractor = Arc<dyn Fn(&HeaderMap) -> Option<String> + Send + Sync>;

/// The closed set of rate-limit algorithms.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitStrategy {
    /// Burstable capacity refilled continuously.
    TokenBucket {
        /// Maximum (and initial) token count.
        capacity: f64,
        /// Tokens credited per second.
        refill_rate_per_sec: f64,
    },
    /// At most `max_requests` admitted in any rolling window.
    SlidingWindow {
        /// Window length.
        window: Duration,
        /// Admission cap within one window.
        max_requests: usize,
    },
}

impl RateLimitStrategy {
    /// Suggested TTL for persisted per-key state: long enough that live
    /// state survives, short enough that idle keys expire.
    pub(crate) fn state_ttl(&self) -> Duration {
        match self {
            RateLimitStrategy::TokenBucket {
                capacity,
                refill_rate_per_sec,
            } => {
                if *refill_rate_per_sec > 0.0 {
                    Duration::from_secs_f64((capacity / refill_rate_per_sec).max(1.0) * 2.0)
                } else {
                    Duration::from_secs(3600)
                }
            }
            RateLimitStrategy::SlidingWindow { window, .. } => *window * 2,
        }
    }
}

/// Configuration for the [`RateLimitManager`].
pub struct RateLimitManagerConfig {
    pub(crate) strategies: HashMap<String, RateLimitStrategy>,
    pub(crate) exemptions: HashSet<String>,
    pub(crate) whitelist: HashSet<String>,
    pub(crate) extractors: HashMap<String, IdentityExtractor>,
    pub(crate) store: Option<Arc<dyn KeyValueStore>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl RateLimitManagerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimitManagerConfigBuilder {
        RateLimitManagerConfigBuilder::new()
    }
}

/// Builder for configuring and constructing a [`RateLimitManager`].
pub struct RateLimitManagerConfigBuilder {
    strategies: HashMap<String, RateLimitStrategy>,
    exemptions: HashSet<String>,
    whitelist: HashSet<String>,
    extractors: HashMap<String, IdentityExtractor>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl RateLimitManagerConfigBuilder {
    /// Creates a new builder with no strategies registered.
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            exemptions: HashSet::new(),
            whitelist: HashSet::new(),
            extractors: HashMap::new(),
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Registers a named strategy.
    pub fn strategy<N: Into<String>>(mut self, name: N, strategy: RateLimitStrategy) -> Self {
        self.strategies.insert(name.into(), strategy);
        self
    }

    /// Adds an identity to the exemption set (never limited).
    pub fn exempt<I: Into<String>>(mut self, identity: I) -> Self {
        self.exemptions.insert(identity.into());
        self
    }

    /// Adds an identity to the whitelist (never limited).
    pub fn whitelist<I: Into<String>>(mut self, identity: I) -> Self {
        self.whitelist.insert(identity.into());
        self
    }

    /// Registers a named identity extractor, selectable through the `by`
    /// argument of [`RateLimitManager::check`].
    ///
    /// The built-in `"ip"` extractor reads `cf-connecting-ip`, the first
    /// `x-forwarded-for` entry, then `x-real-ip`.
    pub fn extractor<N, F>(mut self, name: N, f: F) -> Self
    where
        N: Into<String>,
        F: Fn(&HeaderMap) -> Option<String> + Send + Sync + 'static,
    {
        self.extractors.insert(name.into(), Arc::new(f));
        self
    }

    /// Shares per-key state through an external store so several instances
    /// agree on counts. Store failures fail open.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the manager.
    pub fn build(self) -> RateLimitManager {
        RateLimitManager::from_config(RateLimitManagerConfig {
            strategies: self.strategies,
            exemptions: self.exemptions,
            whitelist: self.whitelist,
            extractors: self.extractors,
            store: self.store,
            clock: self.clock,
        })
    }
}

impl Default for RateLimitManagerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
