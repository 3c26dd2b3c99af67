//! Retrieval with hypothetical-answer expansion.

use docvqa_core::text;
use docvqa_core::{Document, NodeResult, RequestState};

use super::Collaborators;
use crate::prompts;
use crate::resilience::UsageTracker;
use crate::RuntimeError;

/// Search with a generated ideal answer as the query.
///
/// If writing the hypothetical answer or searching with it fails, the
/// plain search string is used instead. Only a failure of that fallback
/// search is returned.
pub async fn retrieve(
    collaborators: &Collaborators,
    state: &RequestState,
    usage: &UsageTracker,
) -> Result<NodeResult, RuntimeError> {
    let search_string = text::search_string(&state.question, state.document());

    let provisions = match expanded_search(collaborators, &search_string, usage).await {
        Ok(provisions) => provisions,
        Err(e) => {
            tracing::warn!(error = %e, "Hypothetical-answer search failed, using plain query");
            collaborators.search(&search_string).await?
        }
    };

    tracing::info!(count = provisions.len(), "Provisions retrieved");
    Ok(NodeResult::Retrieved { provisions })
}

async fn expanded_search(
    collaborators: &Collaborators,
    search_string: &str,
    usage: &UsageTracker,
) -> Result<Vec<Document>, RuntimeError> {
    let hypothetical = collaborators
        .model
        .complete(
            prompts::hyde(search_string, &collaborators.response_language),
            usage,
        )
        .await?;
    tracing::debug!(chars = hypothetical.chars().count(), "Hypothetical answer written");

    collaborators.search(&hypothetical).await
}
