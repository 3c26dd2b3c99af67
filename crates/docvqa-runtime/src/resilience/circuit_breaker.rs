//! Circuit breaker to prevent cascade failures.
//!
//! When a collaborator fails repeatedly, its circuit opens and calls fail
//! fast with [`RuntimeError::CircuitOpen`](crate::RuntimeError::CircuitOpen)
//! until the recovery timeout passes. Nodes treat an open circuit exactly
//! like a collaborator failure.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// The external services a request depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    /// Text generation and classification
    Generation,
    /// Vector index (embedding + search)
    Search,
    /// Image-to-text extraction
    Vision,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::Generation => write!(f, "generation"),
            Collaborator::Search => write!(f, "search"),
            Collaborator::Vision => write!(f, "vision"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery
    #[serde(with = "crate::config::humantime_duration")]
    pub recovery_timeout: Duration,

    /// Successes needed to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, all calls fail fast
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

/// One circuit per collaborator, shared across requests.
pub struct CircuitBreaker {
    states: RwLock<HashMap<Collaborator, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls to `collaborator` should fail fast.
    pub fn is_open(&self, collaborator: Collaborator) -> bool {
        let states = self.states.read();
        match states.get(&collaborator) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(collaborator);
                    false
                } else {
                    true
                }
            }
            Some(CircuitState::HalfOpen { .. }) => false,
            _ => false,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, collaborator: Collaborator) {
        let mut states = self.states.write();
        match states.get(&collaborator).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(collaborator, CircuitState::Closed { failures: 0 });
                    tracing::info!(collaborator = %collaborator, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        collaborator,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(collaborator, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, collaborator: Collaborator) {
        let mut states = self.states.write();
        let failures = match states.get(&collaborator).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    collaborator,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(collaborator = %collaborator, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                collaborator,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                collaborator = %collaborator,
                failures,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(collaborator, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, collaborator: Collaborator) {
        let mut states = self.states.write();
        if matches!(states.get(&collaborator), Some(CircuitState::Open { .. })) {
            states.insert(collaborator, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(collaborator = %collaborator, "Circuit transitioning to half-open for recovery test");
        }
    }

    /// Get current state of a circuit.
    pub fn state(&self, collaborator: Collaborator) -> CircuitState {
        self.states
            .read()
            .get(&collaborator)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(Collaborator::Generation));
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        cb.record_failure(Collaborator::Search);
        assert!(!cb.is_open(Collaborator::Search));

        cb.record_failure(Collaborator::Search);
        assert!(cb.is_open(Collaborator::Search));
    }

    #[test]
    fn test_threshold_of_one_opens_immediately() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        cb.record_failure(Collaborator::Vision);
        assert!(cb.is_open(Collaborator::Vision));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        cb.record_failure(Collaborator::Generation);
        cb.record_failure(Collaborator::Generation);
        cb.record_success(Collaborator::Generation);

        cb.record_failure(Collaborator::Generation);
        cb.record_failure(Collaborator::Generation);
        assert!(!cb.is_open(Collaborator::Generation));
    }

    #[test]
    fn test_collaborators_are_independent() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        cb.record_failure(Collaborator::Vision);
        cb.record_failure(Collaborator::Vision);

        assert!(cb.is_open(Collaborator::Vision));
        assert!(!cb.is_open(Collaborator::Generation));
    }

    #[test]
    fn test_recovery_through_half_open() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::ZERO,
            success_threshold: 2,
        });

        cb.record_failure(Collaborator::Search);
        // Zero timeout: the next check moves to half-open
        assert!(!cb.is_open(Collaborator::Search));
        assert!(matches!(
            cb.state(Collaborator::Search),
            CircuitState::HalfOpen { successes: 0 }
        ));

        cb.record_success(Collaborator::Search);
        cb.record_success(Collaborator::Search);
        assert!(matches!(
            cb.state(Collaborator::Search),
            CircuitState::Closed { failures: 0 }
        ));
    }
}
