//! The three classifier gates: relevance, groundedness, usefulness.

use futures::stream::{self, StreamExt, TryStreamExt};

use docvqa_core::decision::is_relevant;
use docvqa_core::text;
use docvqa_core::{
    Document, FinalDraft, GroundednessDecision, GroundednessVerdict, NodeResult, RelevanceVerdict,
    RequestState, UsefulnessDecision, UsefulnessVerdict,
};

use super::Collaborators;
use crate::cache::RelevanceKey;
use crate::prompts;
use crate::resilience::UsageTracker;
use crate::RuntimeError;

/// Keep the provisions judged relevant, in their original order.
///
/// Each provision is classified independently; up to
/// `filter_concurrency` classifications run at once.
pub async fn filter(
    collaborators: &Collaborators,
    state: &RequestState,
    usage: &UsageTracker,
) -> Result<NodeResult, RuntimeError> {
    let judgements: Vec<_> = state
        .provisions
        .iter()
        .map(|document| judge(collaborators, &state.question, document, usage))
        .collect();
    let verdicts: Vec<bool> = stream::iter(judgements)
        .buffered(collaborators.filter_concurrency.max(1))
        .try_collect()
        .await?;

    let provisions: Vec<Document> = state
        .provisions
        .iter()
        .zip(verdicts)
        .filter(|(_, keep)| *keep)
        .map(|(document, _)| document.clone())
        .collect();

    tracing::info!(
        candidates = state.provisions.len(),
        kept = provisions.len(),
        "Relevance filter applied"
    );
    Ok(NodeResult::Filtered { provisions })
}

async fn judge(
    collaborators: &Collaborators,
    question: &str,
    document: &Document,
    usage: &UsageTracker,
) -> Result<bool, RuntimeError> {
    let key = RelevanceKey::new(question, &document.content);

    let verdict = match collaborators.cache.get(&key).await {
        Some(verdict) => verdict,
        None => {
            let verdict: RelevanceVerdict = collaborators
                .model
                .classify(prompts::relevance(question, &document.content), usage)
                .await?;
            collaborators.cache.insert(key, verdict).await;
            verdict
        }
    };

    let relevant = is_relevant(&verdict);
    tracing::debug!(source = ?document.source(), relevant, "Relevance verdict");
    Ok(relevant)
}

/// Is the answer supported by the surviving provisions?
pub async fn grade_groundedness(
    collaborators: &Collaborators,
    state: &RequestState,
    usage: &UsageTracker,
) -> Result<GroundednessDecision, RuntimeError> {
    let facts = text::join_provisions(&state.provisions);
    let verdict: GroundednessVerdict = collaborators
        .model
        .classify(
            prompts::groundedness(&state.question, &facts, &state.answer),
            usage,
        )
        .await?;

    let decision = GroundednessDecision::from(&verdict);
    tracing::info!(score = ?verdict.score, decision = ?decision, "Groundedness graded");
    Ok(decision)
}

/// Does the answer satisfy the question?
pub async fn grade_usefulness(
    collaborators: &Collaborators,
    draft: FinalDraft<'_>,
    usage: &UsageTracker,
) -> Result<UsefulnessDecision, RuntimeError> {
    let verdict: UsefulnessVerdict = collaborators
        .model
        .classify(prompts::usefulness(draft.question, draft.answer), usage)
        .await?;

    let decision = UsefulnessDecision::from(&verdict);
    tracing::info!(score = verdict.score, decision = ?decision, "Usefulness graded");
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::fixtures::collaborators;
    use crate::testing::{ScriptedProvider, StaticSearch, Task};
    use std::sync::Arc;

    fn state_with(provisions: Vec<Document>) -> RequestState {
        RequestState::new("Điều 5 quy định gì?").apply(NodeResult::Retrieved { provisions })
    }

    fn ctx(provider: &Arc<ScriptedProvider>) -> Collaborators {
        collaborators(provider.clone(), Arc::new(StaticSearch::empty()), None)
    }

    /// Relevant iff the provision text mentions "Điều 5".
    fn by_content() -> ScriptedProvider {
        ScriptedProvider::new().respond_with(Task::Relevance, |messages, _| {
            let score = if messages[1].content.contains("Điều 5") {
                "relevant"
            } else {
                "irrelevant"
            };
            Ok(format!(r#"{{"score": "{}"}}"#, score))
        })
    }

    #[tokio::test]
    async fn test_filter_keeps_relevant_in_order() {
        let provider = Arc::new(by_content());
        let state = state_with(vec![
            Document::new("Điều 5 khoản 1").with_source("a"),
            Document::new("Điều 9").with_source("b"),
            Document::new("Điều 5 khoản 2").with_source("c"),
        ]);

        let result = filter(&ctx(&provider), &state, &UsageTracker::new()).await.unwrap();

        match result {
            NodeResult::Filtered { provisions } => {
                let sources: Vec<_> = provisions.iter().map(|d| d.source().unwrap()).collect();
                assert_eq!(sources, vec!["a", "c"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(provider.calls(Task::Relevance), 3);
    }

    #[tokio::test]
    async fn test_filter_on_empty_candidates_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::new());
        let result = filter(&ctx(&provider), &state_with(vec![]), &UsageTracker::new())
            .await
            .unwrap();

        assert_eq!(result, NodeResult::Filtered { provisions: vec![] });
        assert_eq!(provider.calls(Task::Relevance), 0);
    }

    #[tokio::test]
    async fn test_verdicts_are_cached() {
        let provider = Arc::new(by_content());
        let ctx = ctx(&provider);
        let state = state_with(vec![Document::new("Điều 5"), Document::new("Điều 7")]);

        filter(&ctx, &state, &UsageTracker::new()).await.unwrap();
        filter(&ctx, &state, &UsageTracker::new()).await.unwrap();

        assert_eq!(provider.calls(Task::Relevance), 2);
    }

    #[tokio::test]
    async fn test_invalid_relevance_verdict_fails_filter() {
        let provider = Arc::new(ScriptedProvider::new().respond(Task::Relevance, r#"{"score": "maybe"}"#));
        let state = state_with(vec![Document::new("Điều 5")]);

        let result = filter(&ctx(&provider), &state, &UsageTracker::new()).await;

        assert!(matches!(result, Err(RuntimeError::ContractViolation { .. })));
    }

    #[tokio::test]
    async fn test_groundedness_scores() {
        let cases = [
            ("fully supported", GroundednessDecision::Accept),
            ("partially supported", GroundednessDecision::Accept),
            ("no support", GroundednessDecision::Regenerate),
        ];
        for (score, expected) in cases {
            let provider = Arc::new(
                ScriptedProvider::new()
                    .respond(Task::Groundedness, format!(r#"{{"score": "{}"}}"#, score)),
            );
            let state = state_with(vec![Document::new("Điều 5"), Document::new("Điều 6")]);

            let decision = grade_groundedness(&ctx(&provider), &state, &UsageTracker::new())
                .await
                .unwrap();
            assert_eq!(decision, expected);

            let sent = &provider.messages(Task::Groundedness)[0][1].content;
            assert!(sent.contains("Facts: Điều 5\n\nĐiều 6"));
        }
    }

    #[tokio::test]
    async fn test_usefulness_threshold() {
        for (score, expected) in [(3, UsefulnessDecision::Rewrite), (4, UsefulnessDecision::Finish)] {
            let provider = Arc::new(
                ScriptedProvider::new().respond(Task::Usefulness, format!(r#"{{"score": {}}}"#, score)),
            );
            let state = RequestState::new("q").apply(NodeResult::Generated {
                answer: "a".to_string(),
            });

            let decision = grade_usefulness(&ctx(&provider), state.final_draft(), &UsageTracker::new())
                .await
                .unwrap();
            assert_eq!(decision, expected);
        }
    }
}
