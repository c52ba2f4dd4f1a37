use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`CircuitBreaker::execute`].
///
/// [`CircuitBreaker::execute`]: crate::CircuitBreaker::execute
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the call was not attempted.
    #[error("circuit is open; retry after {retry_after:?}")]
    Open {
        /// Time remaining until the breaker will probe recovery.
        retry_after: Duration,
    },

    /// The protected operation failed; the breaker recorded the failure and
    /// passes the root cause through.
    #[error("inner operation error: {0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns true if the error indicates the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Returns the underlying operation error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
