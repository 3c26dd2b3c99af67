//! Resilience patterns for docvqa-runtime.
//!
//! This module provides:
//! - Circuit breaker per collaborator
//! - Per-request token usage
//! - Retry with backoff for transient provider errors

mod circuit_breaker;
mod retry;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Collaborator};
pub use retry::with_retry;
pub use usage::{LlmUsage, UsageTracker};
