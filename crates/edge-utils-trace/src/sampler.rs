//! Sampling strategies for new traces.

use edge_utils_core::RandomSource;

/// Decides whether a parentless trace is recorded and exported.
///
/// Spans with a parent inherit the parent's sampled decision and never
/// consult the sampler.
#[derive(Debug, Clone)]
pub enum Sampler {
    /// Record every trace.
    Always,
    /// Record no traces.
    Never,
    /// Record the given fraction of traces, drawn from the injected
    /// random source.
    Ratio(f64),
}

impl Sampler {
    pub(crate) fn should_sample(&self, random: &dyn RandomSource) -> bool {
        match self {
            Sampler::Always => true,
            Sampler::Never => false,
            Sampler::Ratio(ratio) => random.next_f64() < *ratio,
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::Ratio(0.1)
    }
}
