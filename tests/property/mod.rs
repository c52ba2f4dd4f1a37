//! Property test suites, one module per component.

mod balancer;
mod circuit_breaker;
mod rate_limiter;
