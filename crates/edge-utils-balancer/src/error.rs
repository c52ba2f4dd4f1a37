use thiserror::Error;

/// Errors returned by the [`LoadBalancer`](crate::LoadBalancer).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalancerError {
    /// The pool has no healthy endpoints; callers should answer with a 503.
    #[error("no eligible endpoint in the pool")]
    NoEligibleEndpoint,
}
