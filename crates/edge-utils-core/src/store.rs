//! Pluggable key-value store contract.
//!
//! Rate-limit state, sticky bindings, and metric snapshots can be shared
//! across processes through any backend implementing [`KeyValueStore`].
//! Values are flat strings (JSON by convention) with optional TTLs.
//! [`MemoryStore`] is the in-process default.

use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a store backend.
///
/// Callers are expected to degrade gracefully: the rate-limit manager fails
/// open and the metrics sink defers its flush.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The stored value does not have the shape the operation requires.
    #[error("stored value for `{key}` is not {expected}")]
    WrongType {
        /// Key whose value was malformed.
        key: String,
        /// Human-readable expected shape.
        expected: &'static str,
    },

    /// Value (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Flat key-value contract with TTLs, counters, and compare-and-swap.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetches the value under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` under `key`, replacing any prior value.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Adds `delta` to the integer under `key`, creating it at zero with the
    /// given TTL when absent, and returns the new value.
    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError>;

    /// Writes `new` only when the current value equals `expected`
    /// (`None` means the key must be absent). Returns whether the swap won.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at_millis: Option<u64>,
}

/// In-memory store with clock-driven TTL expiry.
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates a store on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store reading time from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = self.clock.now_millis();
        let (value, expired) = match self.entries.get(key) {
            None => return None,
            Some(entry) => {
                if entry.expires_at_millis.map_or(true, |at| now < at) {
                    (Some(entry.value.clone()), false)
                } else {
                    (None, true)
                }
            }
        };
        if expired {
            self.entries.remove(key);
        }
        value
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<u64> {
        ttl.map(|ttl| self.clock.now_millis() + ttl.as_millis() as u64)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live_value(key))
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at_millis: self.expiry(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let now = self.clock.now_millis();
        let expires_at = self.expiry(ttl);

        let mut entry = self.entries.entry(key.to_string()).or_insert(StoredValue {
            value: "0".to_string(),
            expires_at_millis: expires_at,
        });

        // Expired entries restart from zero with a fresh TTL.
        if entry.expires_at_millis.is_some_and(|at| now >= at) {
            entry.value = "0".to_string();
            entry.expires_at_millis = expires_at;
        }

        let current: i64 = entry.value.parse().map_err(|_| StoreError::WrongType {
            key: key.to_string(),
            expected: "an integer",
        })?;
        let next = current + delta;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let expires_at = self.expiry(ttl);
        let now = self.clock.now_millis();

        let mut won = false;
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let live = occupied
                    .get()
                    .expires_at_millis
                    .map_or(true, |at| now < at);
                let current = live.then(|| occupied.get().value.as_str());
                if current == expected {
                    occupied.insert(StoredValue {
                        value: new,
                        expires_at_millis: expires_at,
                    });
                    won = true;
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(StoredValue {
                        value: new,
                        expires_at_millis: expires_at,
                    });
                    won = true;
                }
            }
        }
        Ok(won)
    }
}
