//! Branch decision after extraction.

use docvqa_core::{RequestState, RetrievalDecision, RouterVerdict};

use super::Collaborators;
use crate::prompts;
use crate::resilience::UsageTracker;
use crate::RuntimeError;

/// Retrieve when there is a document or a legal trigger term; otherwise
/// ask the router.
pub async fn route(
    collaborators: &Collaborators,
    state: &RequestState,
    usage: &UsageTracker,
) -> Result<RetrievalDecision, RuntimeError> {
    if let Some(decision) = RetrievalDecision::shortcut(state.document(), &state.question) {
        tracing::info!(decision = ?decision, "Routing without classifier");
        return Ok(decision);
    }

    let verdict: RouterVerdict = collaborators
        .model
        .classify(prompts::router(&state.question), usage)
        .await?;
    let decision = RetrievalDecision::from(&verdict);

    tracing::info!(verdict = ?verdict.decision, decision = ?decision, "Router decided");
    Ok(decision)
}
