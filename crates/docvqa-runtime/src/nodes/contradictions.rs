//! Contradiction detection between the document and the provisions.

use docvqa_core::text;
use docvqa_core::{NodeResult, RequestState};

use super::Collaborators;
use crate::prompts;
use crate::resilience::UsageTracker;

/// List discrepancies between document text and provisions.
///
/// Empty when either side is missing. Collaborator failures also give an
/// empty list.
pub async fn detect_contradictions(
    collaborators: &Collaborators,
    state: &RequestState,
    usage: &UsageTracker,
) -> NodeResult {
    let Some(document) = state.document() else {
        tracing::info!("No document text, skipping contradiction detection");
        return NodeResult::Detected {
            contradictions: Vec::new(),
        };
    };

    if state.provisions.is_empty() {
        tracing::info!("No provisions, skipping contradiction detection");
        return NodeResult::Detected {
            contradictions: Vec::new(),
        };
    }

    let contradictions = match collaborators
        .model
        .complete(prompts::contradiction(document, &state.provisions), usage)
        .await
    {
        Ok(response) => text::parse_contradictions(&response),
        Err(e) => {
            tracing::warn!(error = %e, "Contradiction detection failed, reporting none");
            Vec::new()
        }
    };

    if contradictions.is_empty() {
        tracing::info!("No contradictions found");
    } else {
        tracing::warn!(count = contradictions.len(), "Contradictions found");
    }

    NodeResult::Detected { contradictions }
}
