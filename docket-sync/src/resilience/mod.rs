//! Resilience layer: retry with backoff, per-run circuit breaker, run lock

pub mod circuit_breaker;
pub mod retry;
pub mod run_lock;

pub use circuit_breaker::CircuitBreaker;
pub use retry::{RetryFailure, RetryPolicy};
