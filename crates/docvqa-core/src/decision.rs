//! Closed decision types for every branching point, and the pure rules
//! that produce them from classifier verdicts.

use serde::{Deserialize, Serialize};

use crate::contract::{
    GroundednessScore, GroundednessVerdict, RelevanceScore, RelevanceVerdict, RouterDecision,
    RouterVerdict, UsefulnessVerdict,
};

/// Consecutive empty filter passes that end the request with no answer.
pub const NO_RELEVANT_LIMIT: u32 = 5;

/// Lowest usefulness score that finishes the request.
pub const USEFULNESS_THRESHOLD: u8 = 4;

/// Questions containing any of these always go to retrieval.
pub const LEGAL_TRIGGER_TERMS: &[&str] = &["luật", "điều", "quy định", "pháp lý", "hợp đồng", "văn bản"];

/// Branch taken after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalDecision {
    Retrieve,
    GenerateDirect,
}

impl RetrievalDecision {
    /// Decide without a classifier when possible.
    ///
    /// Returns `Some(Retrieve)` when document text is present or the question
    /// names a legal trigger term; `None` means the router must be consulted.
    pub fn shortcut(document_text: Option<&str>, question: &str) -> Option<Self> {
        let has_document = document_text.is_some_and(|text| !text.is_empty());
        if has_document || contains_trigger_term(question) {
            Some(RetrievalDecision::Retrieve)
        } else {
            None
        }
    }
}

impl From<&RouterVerdict> for RetrievalDecision {
    fn from(verdict: &RouterVerdict) -> Self {
        match verdict.decision {
            RouterDecision::Yes => RetrievalDecision::Retrieve,
            RouterDecision::No | RouterDecision::Continue => RetrievalDecision::GenerateDirect,
        }
    }
}

/// Case-insensitive substring match against [`LEGAL_TRIGGER_TERMS`].
pub fn contains_trigger_term(question: &str) -> bool {
    let lowered = question.to_lowercase();
    LEGAL_TRIGGER_TERMS.iter().any(|term| lowered.contains(term))
}

/// Whether a provision survives the relevance filter.
pub fn is_relevant(verdict: &RelevanceVerdict) -> bool {
    verdict.score == RelevanceScore::Relevant
}

/// Branch taken after the relevance filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDecision {
    Generate,
    Rewrite,
    NoAnswer,
}

impl FilterDecision {
    /// `streak` is the value after the filter pass has updated it.
    pub fn decide(kept: usize, streak: u32) -> Self {
        if kept > 0 {
            FilterDecision::Generate
        } else if streak >= NO_RELEVANT_LIMIT {
            FilterDecision::NoAnswer
        } else {
            FilterDecision::Rewrite
        }
    }
}

/// Branch taken after the groundedness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundednessDecision {
    Accept,
    Regenerate,
}

impl From<&GroundednessVerdict> for GroundednessDecision {
    fn from(verdict: &GroundednessVerdict) -> Self {
        match verdict.score {
            GroundednessScore::FullySupported | GroundednessScore::PartiallySupported => {
                GroundednessDecision::Accept
            }
            GroundednessScore::NoSupport => GroundednessDecision::Regenerate,
        }
    }
}

/// Branch taken after the usefulness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsefulnessDecision {
    Finish,
    Rewrite,
}

impl From<&UsefulnessVerdict> for UsefulnessDecision {
    fn from(verdict: &UsefulnessVerdict) -> Self {
        if verdict.score >= USEFULNESS_THRESHOLD {
            UsefulnessDecision::Finish
        } else {
            UsefulnessDecision::Rewrite
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortcut_on_document_text() {
        assert_eq!(
            RetrievalDecision::shortcut(Some("HỢP ĐỒNG THUÊ NHÀ"), "Hi there"),
            Some(RetrievalDecision::Retrieve)
        );
        assert_eq!(RetrievalDecision::shortcut(Some(""), "Hi there"), None);
        assert_eq!(RetrievalDecision::shortcut(None, "Hi there"), None);
    }

    #[test]
    fn test_trigger_terms_are_case_insensitive() {
        assert!(contains_trigger_term("Điều 5 quy định gì?"));
        assert!(contains_trigger_term("BỘ LUẬT DÂN SỰ"));
        assert!(contains_trigger_term("Mẫu Hợp Đồng thuê"));
        assert!(!contains_trigger_term("Self-RAG là gì?"));
    }

    #[test]
    fn test_only_yes_routes_to_retrieval() {
        let verdict = |decision| RouterVerdict { decision };
        assert_eq!(
            RetrievalDecision::from(&verdict(RouterDecision::Yes)),
            RetrievalDecision::Retrieve
        );
        assert_eq!(
            RetrievalDecision::from(&verdict(RouterDecision::No)),
            RetrievalDecision::GenerateDirect
        );
        assert_eq!(
            RetrievalDecision::from(&verdict(RouterDecision::Continue)),
            RetrievalDecision::GenerateDirect
        );
    }

    #[test]
    fn test_filter_decision() {
        assert_eq!(FilterDecision::decide(2, 0), FilterDecision::Generate);
        assert_eq!(FilterDecision::decide(0, 1), FilterDecision::Rewrite);
        assert_eq!(FilterDecision::decide(0, 4), FilterDecision::Rewrite);
        assert_eq!(FilterDecision::decide(0, 5), FilterDecision::NoAnswer);
    }

    #[test]
    fn test_groundedness_decision() {
        let verdict = |score| GroundednessVerdict { score };
        assert_eq!(
            GroundednessDecision::from(&verdict(GroundednessScore::FullySupported)),
            GroundednessDecision::Accept
        );
        assert_eq!(
            GroundednessDecision::from(&verdict(GroundednessScore::PartiallySupported)),
            GroundednessDecision::Accept
        );
        assert_eq!(
            GroundednessDecision::from(&verdict(GroundednessScore::NoSupport)),
            GroundednessDecision::Regenerate
        );
    }

    #[test]
    fn test_usefulness_threshold() {
        for score in 1..=5u8 {
            let expected = if score >= 4 {
                UsefulnessDecision::Finish
            } else {
                UsefulnessDecision::Rewrite
            };
            assert_eq!(UsefulnessDecision::from(&UsefulnessVerdict { score }), expected);
        }
    }

    #[test]
    fn test_relevance() {
        assert!(is_relevant(&RelevanceVerdict {
            score: RelevanceScore::Relevant
        }));
        assert!(!is_relevant(&RelevanceVerdict {
            score: RelevanceScore::Irrelevant
        }));
    }
}
