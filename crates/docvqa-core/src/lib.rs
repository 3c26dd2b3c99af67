//! # docvqa-core
//!
//! Deterministic control flow for self-checking legal question answering.
//!
//! This crate owns everything about a request that does not touch the
//! network: the request record, the classifier contracts, the branch rules,
//! and the state machine that sequences retrieval, filtering, generation,
//! and self-checks.
//!
//! ## Key Guarantees
//!
//! 1. **Single merge rule**: node output only reaches state through [`RequestState::apply`]
//! 2. **Closed decisions**: every branch is an enum checked exhaustively
//! 3. **Bounded loops**: [`LoopGuard`] caps regeneration and rewrite cycles
//! 4. **Validated verdicts**: classifier output is schema-checked before use
//!
//! ## Example
//!
//! ```rust
//! use docvqa_core::{RequestState, NodeResult, Document, FilterDecision};
//!
//! let state = RequestState::new("Điều 5 quy định gì?")
//!     .apply(NodeResult::Filtered { provisions: vec![Document::new("Điều 5. ...")] })
//!     .apply(NodeResult::Generated { answer: "Theo Điều 5...".to_string() });
//!
//! assert_eq!(state.citations.len(), 1);
//! assert_eq!(
//!     FilterDecision::decide(state.provisions.len(), state.no_relevant_streak),
//!     FilterDecision::Generate
//! );
//! ```

pub mod chunking;
pub mod contract;
pub mod decision;
pub mod machine;
pub mod state;
pub mod text;
pub mod types;

// Re-export main types at crate root
pub use chunking::TextChunker;
pub use contract::{
    Classification, ContractKind, ContractViolation, GroundednessScore, GroundednessVerdict,
    RelevanceScore, RelevanceVerdict, RouterDecision, RouterVerdict, UsefulnessVerdict,
};
pub use decision::{
    FilterDecision, GroundednessDecision, RetrievalDecision, UsefulnessDecision,
    LEGAL_TRIGGER_TERMS, NO_RELEVANT_LIMIT, USEFULNESS_THRESHOLD,
};
pub use machine::{LimitReached, LoopGuard, LoopLimits, MachineError, Outcome, Signal, Stage};
pub use state::{FinalDraft, NodeResult, RequestState, STATE_VERSION};
pub use text::{EXHAUSTED_MESSAGE, NO_ANSWER_MESSAGE};
pub use types::{AskRequest, AskResponse, Citation, Document, RunReport, UNKNOWN_SOURCE};

#[cfg(test)]
mod tests {
    use super::*;

    fn relevant() -> Document {
        Document::new("Điều 5. Người lao động có quyền...").with_source("Bộ luật Lao động")
    }

    /// Drive the machine with canned node outputs and return the path taken.
    fn walk(steps: Vec<(NodeResult, Option<Signal>)>) -> (RequestState, Vec<Stage>) {
        let mut state = RequestState::new("Điều 5 quy định gì?");
        let mut stage = Stage::INITIAL;
        let mut path = vec![stage];
        for (result, signal) in steps {
            state = state.apply(result);
            let signal = match signal {
                Some(signal) => signal,
                None => Signal::Filter(FilterDecision::decide(
                    state.provisions.len(),
                    state.no_relevant_streak,
                )),
            };
            stage = stage.next(signal).unwrap();
            path.push(stage);
        }
        (state, path)
    }

    #[test]
    fn test_streak_of_five_reaches_no_answer() {
        let mut steps = vec![(
            NodeResult::Extracted { text: String::new() },
            Some(Signal::Route(RetrievalDecision::Retrieve)),
        )];
        for i in 0..5 {
            steps.push((
                NodeResult::Retrieved {
                    provisions: vec![Document::new("x"), Document::new("y"), Document::new("z")],
                },
                Some(Signal::Continue),
            ));
            steps.push((NodeResult::Filtered { provisions: vec![] }, None));
            if i < 4 {
                steps.push((
                    NodeResult::Rewritten {
                        question: format!("Q{}", i),
                    },
                    Some(Signal::Continue),
                ));
            }
        }

        let (state, path) = walk(steps);
        assert_eq!(state.no_relevant_streak, NO_RELEVANT_LIMIT);
        assert_eq!(path.last(), Some(&Stage::NoAnswer));
        assert_eq!(path.len() as u32, LoopLimits::MIN_STEPS + 1);
    }

    #[test]
    fn test_relevant_pass_resets_streak() {
        let (state, path) = walk(vec![
            (
                NodeResult::Extracted { text: String::new() },
                Some(Signal::Route(RetrievalDecision::Retrieve)),
            ),
            (NodeResult::Retrieved { provisions: vec![] }, Some(Signal::Continue)),
            (NodeResult::Filtered { provisions: vec![] }, None),
            (
                NodeResult::Rewritten {
                    question: "Q'".to_string(),
                },
                Some(Signal::Continue),
            ),
            (
                NodeResult::Retrieved {
                    provisions: vec![relevant()],
                },
                Some(Signal::Continue),
            ),
            (
                NodeResult::Filtered {
                    provisions: vec![relevant()],
                },
                None,
            ),
        ]);
        assert_eq!(state.no_relevant_streak, 0);
        assert_eq!(path.last(), Some(&Stage::Generate));
    }
}
