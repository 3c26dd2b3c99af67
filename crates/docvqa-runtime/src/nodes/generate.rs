//! Answer generation.

use docvqa_core::text;
use docvqa_core::{NodeResult, RequestState};

use super::Collaborators;
use crate::prompts;
use crate::resilience::UsageTracker;
use crate::RuntimeError;

/// Answer from the document text and surviving provisions.
///
/// Citations are derived from the provisions when the result is applied.
pub async fn generate(
    collaborators: &Collaborators,
    state: &RequestState,
    usage: &UsageTracker,
) -> Result<NodeResult, RuntimeError> {
    let context = text::generation_context(state.document(), &state.provisions);
    tracing::info!(
        provisions = state.provisions.len(),
        has_document = state.document().is_some(),
        "Generating answer"
    );

    let answer = collaborators
        .model
        .complete(
            prompts::generation(&state.question, &context, &collaborators.response_language),
            usage,
        )
        .await?;

    Ok(NodeResult::Generated { answer })
}
