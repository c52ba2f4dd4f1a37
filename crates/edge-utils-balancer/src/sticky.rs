//! Sticky sessions: client → endpoint bindings with a TTL.

use crate::policy::md5_index;
use crate::pool::Endpoint;
use dashmap::DashMap;
use edge_utils_core::Clock;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StickyEntry {
    endpoint_url: String,
    created_at_millis: u64,
}

/// Client-affinity table.
///
/// A binding holds while it is younger than the TTL *and* its endpoint is
/// still eligible; otherwise the client is re-hashed onto the current
/// eligible list and the binding replaced. A client therefore never jumps
/// endpoints while its binding is live and the bound endpoint healthy.
pub struct StickySessions {
    entries: DashMap<String, StickyEntry>,
    ttl_millis: u64,
    clock: Arc<dyn Clock>,
}

impl StickySessions {
    pub(crate) fn new(ttl_millis: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_millis,
            clock,
        }
    }

    /// Resolves the endpoint for `client_id`, binding on first contact and
    /// re-binding when the entry is stale or its endpoint ineligible.
    pub fn sticky_endpoint(
        &self,
        client_id: &str,
        eligible: &[Arc<Endpoint>],
    ) -> Option<Arc<Endpoint>> {
        if eligible.is_empty() {
            return None;
        }
        let now = self.clock.now_millis();

        if let Some(entry) = self.entries.get(client_id) {
            if now.saturating_sub(entry.created_at_millis) < self.ttl_millis {
                if let Some(endpoint) =
                    eligible.iter().find(|e| e.url() == entry.endpoint_url)
                {
                    return Some(Arc::clone(endpoint));
                }
            }
        }

        let endpoint = Arc::clone(&eligible[md5_index(client_id, eligible.len())]);
        self.entries.insert(
            client_id.to_string(),
            StickyEntry {
                endpoint_url: endpoint.url().to_string(),
                created_at_millis: now,
            },
        );
        Some(endpoint)
    }

    /// Drops every binding older than the TTL.
    pub fn cleanup(&self) {
        let now = self.clock.now_millis();
        let ttl = self.ttl_millis;
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.created_at_millis) < ttl);
    }

    /// Number of live bindings (stale entries count until cleanup).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
