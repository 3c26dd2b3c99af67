//! Query rewriting.

use docvqa_core::{NodeResult, RequestState};

use super::Collaborators;
use crate::prompts;
use crate::resilience::UsageTracker;
use crate::RuntimeError;

/// Reformulate the question for another retrieval pass.
///
/// A blank rewrite keeps the current question.
pub async fn rewrite(
    collaborators: &Collaborators,
    state: &RequestState,
    usage: &UsageTracker,
) -> Result<NodeResult, RuntimeError> {
    let rewritten = collaborators
        .model
        .complete(
            prompts::rewrite(&state.question, &collaborators.response_language),
            usage,
        )
        .await?;

    let question = match rewritten.trim() {
        "" => {
            tracing::warn!("Rewriter returned nothing, keeping question");
            state.question.clone()
        }
        trimmed => trimmed.to_string(),
    };

    tracing::info!(question = %question, "Question rewritten");
    Ok(NodeResult::Rewritten { question })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::fixtures::collaborators;
    use crate::testing::{ScriptedProvider, StaticSearch, Task};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rewrite_replaces_question() {
        let provider = Arc::new(
            ScriptedProvider::new().respond(Task::Rewrite, "  Quy định về thời gian thử việc?\n"),
        );
        let ctx = collaborators(provider.clone(), Arc::new(StaticSearch::empty()), None);

        let result = rewrite(&ctx, &RequestState::new("thử việc"), &UsageTracker::new())
            .await
            .unwrap();

        assert_eq!(
            result,
            NodeResult::Rewritten {
                question: "Quy định về thời gian thử việc?".to_string()
            }
        );
        assert!(provider.messages(Task::Rewrite)[0][2]
            .content
            .starts_with("Câu hỏi gốc: thử việc"));
    }

    #[tokio::test]
    async fn test_blank_rewrite_keeps_question() {
        let provider = Arc::new(ScriptedProvider::new().respond(Task::Rewrite, "   "));
        let ctx = collaborators(provider, Arc::new(StaticSearch::empty()), None);

        let result = rewrite(&ctx, &RequestState::new("thử việc"), &UsageTracker::new())
            .await
            .unwrap();

        assert_eq!(
            result,
            NodeResult::Rewritten {
                question: "thử việc".to_string()
            }
        );
    }
}
