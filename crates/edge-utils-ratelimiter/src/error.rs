use thiserror::Error;

/// Errors returned by the rate-limit manager.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The named strategy was never registered.
    #[error("unknown rate-limit strategy `{0}`")]
    UnknownStrategy(String),

    /// The named identity extractor was never registered.
    #[error("unknown identity extractor `{0}`")]
    UnknownExtractor(String),
}
