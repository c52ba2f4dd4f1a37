use crate::config::{RateLimitManagerConfig, RateLimitManagerConfigBuilder, RateLimitStrategy};
use crate::error::RateLimitError;
use crate::limiter::{apply_strategy, KeyState, LimitDecision};
use dashmap::DashMap;
use http::header::{HeaderMap, HeaderName, HeaderValue};
#[cfg(feature = "metrics")]
use metrics::counter;

/// `X-RateLimit-Limit` response header.
pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining` response header.
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset` response header (seconds).
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
/// `Retry-After` response header, attached on denial.
pub const HEADER_RETRY_AFTER: HeaderName = HeaderName::from_static("retry-after");

/// Outcome of a managed rate-limit check, ready to drive an HTTP response.
#[derive(Debug, Clone)]
pub struct RateLimitVerdict {
    /// Whether the request may proceed. Denials map to a 429.
    pub allowed: bool,
    /// Configured ceiling; `-1` when the identity is exempt.
    pub limit: i64,
    /// Requests still available; `-1` when the identity is exempt.
    pub remaining: i64,
    /// Clock position, in seconds, when the identity could next pass.
    pub reset_at_secs: u64,
    /// Seconds the client should wait before retrying; present on denial.
    pub retry_after_secs: Option<u64>,
    /// Ready-made `X-RateLimit-*` (and `Retry-After`) response headers.
    pub headers: HeaderMap,
}

/// Keyed rate limiting over named strategies with identity extraction,
/// exemptions, and response-header assembly.
///
/// With no store configured all state is in-process. With a store, per-key
/// state is shared under `rl:<strategy>:<identity>` keys; a failing store
/// never blocks traffic: the manager fails open and counts the incident.
pub struct RateLimitManager {
    config: RateLimitManagerConfig,
    states: DashMap<String, KeyState>,
}

impl RateLimitManager {
    /// Returns a new builder with no strategies registered.
    pub fn builder() -> RateLimitManagerConfigBuilder {
        RateLimitManagerConfigBuilder::new()
    }

    pub(crate) fn from_config(config: RateLimitManagerConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Checks the client identified by `headers` against the named strategy.
    ///
    /// `by` selects a registered identity extractor; `None` (or `"ip"`) uses
    /// the built-in client-IP extraction: `cf-connecting-ip`, then the first
    /// `x-forwarded-for` entry, then `x-real-ip`, then `127.0.0.1`.
    pub async fn check(
        &self,
        headers: &HeaderMap,
        strategy_name: &str,
        by: Option<&str>,
    ) -> Result<RateLimitVerdict, RateLimitError> {
        let strategy = self
            .config
            .strategies
            .get(strategy_name)
            .ok_or_else(|| RateLimitError::UnknownStrategy(strategy_name.to_string()))?;

        let identity = self.identity(headers, by)?;

        if self.config.exemptions.contains(&identity) || self.config.whitelist.contains(&identity) {
            return Ok(exempt_verdict());
        }

        let decision = match &self.config.store {
            Some(store) => {
                let key = format!("rl:{strategy_name}:{identity}");
                match self.check_via_store(store.as_ref(), &key, strategy).await {
                    Ok(decision) => decision,
                    Err(_err) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            strategy = strategy_name,
                            error = %_err,
                            "rate-limit store unavailable; failing open"
                        );

                        #[cfg(feature = "metrics")]
                        counter!("ratelimit_store_error_total", "strategy" => strategy_name.to_string())
                            .increment(1);

                        return Ok(exempt_verdict());
                    }
                }
            }
            None => {
                let now = self.config.clock.now_millis();
                let mut entry = self
                    .states
                    .entry(format!("{strategy_name}:{identity}"))
                    .or_insert_with(|| KeyState::fresh(strategy, now));
                apply_strategy(strategy, entry.value_mut(), 1.0, now)
            }
        };

        #[cfg(feature = "metrics")]
        if !decision.allowed {
            counter!("ratelimit_denied_total", "strategy" => strategy_name.to_string())
                .increment(1);
        }

        Ok(self.verdict_from(decision))
    }

    async fn check_via_store(
        &self,
        store: &dyn edge_utils_core::KeyValueStore,
        key: &str,
        strategy: &RateLimitStrategy,
    ) -> Result<LimitDecision, edge_utils_core::StoreError> {
        let now = self.config.clock.now_millis();

        let mut state = match store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| KeyState::fresh(strategy, now)),
            None => KeyState::fresh(strategy, now),
        };

        let decision = apply_strategy(strategy, &mut state, 1.0, now);
        store
            .put(key, serde_json::to_string(&state)?, Some(strategy.state_ttl()))
            .await?;
        Ok(decision)
    }

    fn identity(&self, headers: &HeaderMap, by: Option<&str>) -> Result<String, RateLimitError> {
        match by {
            None | Some("ip") => Ok(client_ip(headers)),
            Some(name) => {
                let extractor = self
                    .config
                    .extractors
                    .get(name)
                    .ok_or_else(|| RateLimitError::UnknownExtractor(name.to_string()))?;
                Ok(extractor(headers).unwrap_or_else(|| "127.0.0.1".to_string()))
            }
        }
    }

    fn verdict_from(&self, decision: LimitDecision) -> RateLimitVerdict {
        let retry_after_secs = (!decision.allowed).then(|| {
            decision
                .reset_at_secs
                .saturating_sub(self.config.clock.now_secs())
                .max(1)
        });

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_LIMIT, int_header(decision.limit));
        headers.insert(HEADER_REMAINING, int_header(decision.remaining.max(0)));
        headers.insert(HEADER_RESET, int_header(decision.reset_at_secs as i64));
        if let Some(wait) = retry_after_secs {
            headers.insert(HEADER_RETRY_AFTER, int_header(wait as i64));
        }

        RateLimitVerdict {
            allowed: decision.allowed,
            limit: decision.limit,
            remaining: decision.remaining.max(0),
            reset_at_secs: decision.reset_at_secs,
            retry_after_secs,
            headers,
        }
    }
}

fn exempt_verdict() -> RateLimitVerdict {
    RateLimitVerdict {
        allowed: true,
        limit: -1,
        remaining: -1,
        reset_at_secs: 0,
        retry_after_secs: None,
        headers: HeaderMap::new(),
    }
}

fn int_header(value: i64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Client identity extraction in precedence order.
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }
    "127.0.0.1".to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
