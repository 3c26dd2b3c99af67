//! One function per stage of the request graph.
//!
//! Node functions read the current [`RequestState`](docvqa_core::RequestState)
//! and return what the stage produced; they never mutate state themselves.
//! The orchestrator folds each result in with `RequestState::apply` and
//! turns it into a signal for the edge table.

use std::sync::Arc;

use docvqa_core::Document;

use crate::cache::RelevanceCache;
use crate::classifier::ModelClient;
use crate::collaborators::{ExtractionError, ImageExtractor, ImageInput, VectorSearch};
use crate::resilience::{CircuitBreaker, Collaborator};
use crate::RuntimeError;

mod contradictions;
mod extract;
mod generate;
mod grade;
mod retrieve;
mod rewrite;
mod route;

pub use contradictions::detect_contradictions;
pub use extract::extract;
pub use generate::generate;
pub use grade::{filter, grade_groundedness, grade_usefulness};
pub use retrieve::retrieve;
pub use rewrite::rewrite;
pub use route::route;

/// Everything a node may call, shared by all in-flight requests.
pub struct Collaborators {
    pub model: ModelClient,
    pub search: Arc<dyn VectorSearch>,
    pub extractor: Option<Arc<dyn ImageExtractor>>,
    pub breaker: Arc<CircuitBreaker>,
    pub cache: RelevanceCache,
    pub top_k: usize,
    pub filter_concurrency: usize,
    pub response_language: String,
}

impl Collaborators {
    /// Search through the search circuit.
    pub(crate) async fn search(&self, query: &str) -> Result<Vec<Document>, RuntimeError> {
        if self.breaker.is_open(Collaborator::Search) {
            return Err(RuntimeError::CircuitOpen(Collaborator::Search));
        }

        match self.search.search(query, self.top_k).await {
            Ok(documents) => {
                self.breaker.record_success(Collaborator::Search);
                Ok(documents)
            }
            Err(e) => {
                self.breaker.record_failure(Collaborator::Search);
                Err(e.into())
            }
        }
    }

    /// Extract through the vision circuit.
    pub(crate) async fn extract_image(&self, image: ImageInput) -> Result<String, RuntimeError> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| RuntimeError::NotConfigured("image extractor".to_string()))?;

        if self.breaker.is_open(Collaborator::Vision) {
            return Err(RuntimeError::CircuitOpen(Collaborator::Vision));
        }

        match extractor.extract(image).await {
            Ok(text) => {
                self.breaker.record_success(Collaborator::Vision);
                Ok(text)
            }
            // A bad payload says nothing about the service
            Err(e @ ExtractionError::InvalidImage(_)) => Err(e.into()),
            Err(e) => {
                self.breaker.record_failure(Collaborator::Vision);
                Err(e.into())
            }
        }
    }
}
