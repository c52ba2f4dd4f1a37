//! Selection policies.
//!
//! A closed set of strategies with a single `select` operation over the
//! eligible (healthy) endpoint list. All policies return `None` on an empty
//! list and short-circuit a singleton.

use crate::pool::{Endpoint, EndpointPool};
use crate::recorder::PerformanceRecorder;
use edge_utils_core::RandomSource;
use md5::{Digest, Md5};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const TREND_WINDOW_MILLIS: u64 = 30_000;

const LOAD_SHARE: f64 = 0.25;
const RT_SHARE: f64 = 0.25;
const ERR_SHARE: f64 = 0.20;
const TREND_SHARE: f64 = 0.15;
const WEIGHT_SHARE: f64 = 0.15;
const RT_CEILING_MS: f64 = 3000.0;
const ACTIVE_CEILING: f64 = 20.0;
const JITTER_SPAN: f64 = 0.05;

/// How the balancer picks among eligible endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Cycle through the eligible list in insertion order.
    ///
    /// The shared index is deliberately not reset when the eligible set
    /// changes, so distribution can skew transiently after topology
    /// changes.
    #[default]
    RoundRobin,
    /// Cycle proportionally to static integer weights.
    WeightedRoundRobin,
    /// Pick the endpoint with the fewest in-flight requests; ties go to
    /// the earliest in insertion order.
    LeastConnections,
    /// Uniform random pick.
    Random,
    /// Hash the client key onto the list, pinning a client to one
    /// endpoint while the list is stable.
    IpHash,
    /// Composite scoring over load, latency, errors, trend, and the
    /// adaptive weight, with a small jitter to spread ties.
    Adaptive,
}

pub(crate) struct SelectionContext<'a> {
    pub client_key: Option<&'a str>,
    pub pool: &'a EndpointPool,
    pub recorder: &'a PerformanceRecorder,
    pub random: &'a dyn RandomSource,
}

impl SelectionPolicy {
    pub(crate) fn select(
        &self,
        eligible: &[Arc<Endpoint>],
        ctx: &SelectionContext<'_>,
    ) -> Option<Arc<Endpoint>> {
        if eligible.is_empty() {
            return None;
        }
        if eligible.len() == 1 {
            return Some(Arc::clone(&eligible[0]));
        }

        let picked = match self {
            SelectionPolicy::RoundRobin => {
                let index = ctx.pool.rr_index.fetch_add(1, Ordering::Relaxed);
                Arc::clone(&eligible[index % eligible.len()])
            }
            SelectionPolicy::WeightedRoundRobin => {
                let weights: Vec<usize> = eligible
                    .iter()
                    .map(|e| (e.weight().round() as usize).max(1))
                    .collect();
                let total: usize = weights.iter().sum();
                let index = ctx.pool.wrr_index.fetch_add(1, Ordering::Relaxed) % total;

                let mut cumulative = 0;
                let mut chosen = eligible.len() - 1;
                for (i, weight) in weights.iter().enumerate() {
                    cumulative += weight;
                    if cumulative > index {
                        chosen = i;
                        break;
                    }
                }
                Arc::clone(&eligible[chosen])
            }
            SelectionPolicy::LeastConnections => {
                let mut best = 0;
                let mut best_active = eligible[0].active_requests();
                for (i, endpoint) in eligible.iter().enumerate().skip(1) {
                    let active = endpoint.active_requests();
                    if active < best_active {
                        best = i;
                        best_active = active;
                    }
                }
                Arc::clone(&eligible[best])
            }
            SelectionPolicy::Random => {
                let index = (ctx.random.next_f64() * eligible.len() as f64) as usize;
                Arc::clone(&eligible[index.min(eligible.len() - 1)])
            }
            SelectionPolicy::IpHash => {
                let key = ctx.client_key.unwrap_or("default");
                Arc::clone(&eligible[md5_index(key, eligible.len())])
            }
            SelectionPolicy::Adaptive => {
                let now = ctx.recorder.now_millis();
                let mut best = 0;
                let mut best_score = f64::NEG_INFINITY;
                for (i, endpoint) in eligible.iter().enumerate() {
                    let jitter = 1.0 + ctx.random.next_f64() * JITTER_SPAN;
                    let score = composite_score(endpoint, ctx.recorder, now) * jitter;
                    if score > best_score {
                        best = i;
                        best_score = score;
                    }
                }
                Arc::clone(&eligible[best])
            }
        };
        Some(picked)
    }
}

fn composite_score(endpoint: &Endpoint, recorder: &PerformanceRecorder, now: u64) -> f64 {
    let load_score = (1.0 - endpoint.active_requests() as f64 / ACTIVE_CEILING).max(0.0);
    let rt_score = (1.0 - endpoint.avg_response_time() / RT_CEILING_MS).max(0.0);
    let err_score = (1.0 - endpoint.failure_rate()).max(0.0);
    let trend = trend_score(endpoint.url(), recorder, now);
    let weight_factor = endpoint.adaptive_weight().min(2.0) - 1.0;

    LOAD_SHARE * load_score
        + RT_SHARE * rt_score
        + ERR_SHARE * err_score
        + TREND_SHARE * trend
        + WEIGHT_SHARE * weight_factor
}

/// Latency and load movement of the last 30 seconds against the 30 seconds
/// before, folded around a neutral 0.5.
fn trend_score(url: &str, recorder: &PerformanceRecorder, now: u64) -> f64 {
    let mid = now.saturating_sub(TREND_WINDOW_MILLIS);
    let from = now.saturating_sub(2 * TREND_WINDOW_MILLIS);

    let recent = recorder.stats_between(url, mid, u64::MAX);
    let prior = recorder.stats_between(url, from, mid);

    match (recent, prior) {
        (Some(recent), Some(prior)) => {
            let rt_delta = (prior.avg_response_time - recent.avg_response_time)
                / prior.avg_response_time.max(1.0);
            let load_delta = (prior.avg_active - recent.avg_active) / prior.avg_active.max(1.0);
            (0.5 + 0.25 * rt_delta + 0.25 * load_delta).clamp(0.0, 1.0)
        }
        _ => 0.5,
    }
}

/// First 32 bits of the MD5 digest, modulo `len`.
pub(crate) fn md5_index(key: &str, len: usize) -> usize {
    let digest = Md5::digest(key.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix as usize % len
}
