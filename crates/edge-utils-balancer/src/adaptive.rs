//! Adaptive weight computation.
//!
//! Each endpoint's recent samples are folded into a performance score and
//! from there into a weight multiplier the adaptive selection policy reads.
//! Endpoints with no recent history sit at the neutral weight of 1.0.

use crate::pool::EndpointPool;
use crate::recorder::PerformanceRecorder;

/// Window of samples considered by the weight computation.
pub(crate) const SAMPLE_WINDOW_MILLIS: u64 = 5 * 60 * 1000;

const RT_CEILING_MS: f64 = 2000.0;
const ACTIVE_CEILING: f64 = 20.0;
const RT_SHARE: f64 = 0.60;
const SUCCESS_SHARE: f64 = 0.25;
const LOAD_SHARE: f64 = 0.15;

/// Recomputes every endpoint's adaptive weight from the last five minutes
/// of samples.
pub(crate) fn recompute_weights(pool: &EndpointPool, recorder: &PerformanceRecorder) {
    let now = recorder.now_millis();
    let from = now.saturating_sub(SAMPLE_WINDOW_MILLIS);

    for endpoint in pool.all() {
        let weight = match recorder.stats_between(endpoint.url(), from, u64::MAX) {
            None => 1.0,
            Some(stats) => {
                let rt_score = (1.0 - stats.avg_response_time / RT_CEILING_MS).max(0.0);
                let success_score = stats.success_rate;
                let load_score = (1.0 - stats.avg_active / ACTIVE_CEILING).max(0.0);

                let perf =
                    RT_SHARE * rt_score + SUCCESS_SHARE * success_score + LOAD_SHARE * load_score;
                endpoint.weight() * perf * 2.0
            }
        };
        // set_adaptive_weight clamps to [0.1, 3.0].
        endpoint.set_adaptive_weight(weight);
    }
}
