//! # docvqa-runtime
//!
//! Async collaborators and the orchestrator for self-checking legal
//! question answering.
//!
//! `docvqa-core` decides *where* a request goes next. This crate performs
//! the work at each stop: vision extraction, hypothetical-answer retrieval,
//! relevance filtering, generation, contradiction detection, and the two
//! self-checks, each through a capability trait so tests can substitute
//! deterministic fakes.
//!
//! ## Failure policy
//!
//! - Extraction, query expansion and contradiction detection fail open
//! - Generation, rewriting, search and classifiers propagate typed errors
//! - Classifier output is schema-validated; repeated violations surface as
//!   [`RuntimeError::ContractViolation`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use docvqa_runtime::{Orchestrator, RuntimeConfig};
//! use docvqa_core::AskRequest;
//!
//! let orchestrator = Orchestrator::builder()
//!     .config(RuntimeConfig::from_yaml_file("docvqa.yaml")?)
//!     .provider(provider)
//!     .search(search)
//!     .build()?;
//!
//! let (response, report) = orchestrator.ask(AskRequest::question("Điều 5 quy định gì?")).await?;
//! ```

use thiserror::Error;

use docvqa_core::{ContractViolation, MachineError};

pub mod cache;
pub mod classifier;
pub mod collaborators;
pub mod config;
#[cfg(feature = "qdrant")]
pub mod ingest;
pub mod nodes;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::RelevanceCache;
pub use classifier::{ClassifyError, ModelClient};
pub use collaborators::{ExtractionError, ImageExtractor, ImageInput, SearchError, VectorSearch};
pub use config::{ConfigError, RuntimeConfig};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
pub use resilience::{CircuitBreaker, Collaborator, UsageTracker};

/// Errors that end a request without a response.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Contract violation in {classifier}: {}", details.join("; "))]
    ContractViolation {
        classifier: &'static str,
        details: Vec<String>,
    },

    #[error("State machine error: {0}")]
    Machine(#[from] MachineError),

    #[error("Circuit open for {0} collaborator")]
    CircuitOpen(Collaborator),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ContractViolation> for RuntimeError {
    fn from(violation: ContractViolation) -> Self {
        RuntimeError::ContractViolation {
            classifier: violation.classifier,
            details: violation.details,
        }
    }
}

impl RuntimeError {
    /// Whether an external service, rather than this process, failed.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            RuntimeError::Provider(_)
                | RuntimeError::Search(_)
                | RuntimeError::Extraction(_)
                | RuntimeError::CircuitOpen(_)
                | RuntimeError::ContractViolation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvqa_core::{ContractKind, Signal, Stage};

    #[test]
    fn test_contract_violation_keeps_details() {
        let error: RuntimeError = ContractViolation::new(
            ContractKind::Relevance,
            vec!["\"maybe\" is not one of [\"relevant\",\"irrelevant\"] at /score".to_string()],
        )
        .into();

        match &error {
            RuntimeError::ContractViolation { classifier, details } => {
                assert_eq!(*classifier, "relevance_verdict");
                assert_eq!(details.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(error.to_string().contains("relevance_verdict"));
        assert!(error.is_collaborator_failure());
    }

    #[test]
    fn test_machine_errors_are_internal() {
        let error: RuntimeError = MachineError::InvalidTransition {
            stage: Stage::Done,
            signal: Signal::Continue,
        }
        .into();
        assert!(!error.is_collaborator_failure());
        assert!(RuntimeError::CircuitOpen(Collaborator::Search).is_collaborator_failure());
    }
}
