//! Typed classifier verdicts.

use serde::{Deserialize, Serialize};

use super::schema::ContractKind;
use super::Classification;

/// Router output: does the question need external lookup?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterVerdict {
    pub decision: RouterDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterDecision {
    /// Retrieve provisions
    Yes,
    /// General conversation, answer directly
    No,
    /// Answerable from conversation history; treated as `No`
    Continue,
}

/// Relevance of one provision to the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    pub score: RelevanceScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceScore {
    Relevant,
    Irrelevant,
}

/// How well the provisions support the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundednessVerdict {
    pub score: GroundednessScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroundednessScore {
    #[serde(rename = "fully supported")]
    FullySupported,
    #[serde(rename = "partially supported")]
    PartiallySupported,
    #[serde(rename = "no support")]
    NoSupport,
}

/// Usefulness of the answer, 1 (worst) to 5 (best).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsefulnessVerdict {
    pub score: u8,
}

impl Classification for RouterVerdict {
    const KIND: ContractKind = ContractKind::Router;
}

impl Classification for RelevanceVerdict {
    const KIND: ContractKind = ContractKind::Relevance;
}

impl Classification for GroundednessVerdict {
    const KIND: ContractKind = ContractKind::Groundedness;
}

impl Classification for UsefulnessVerdict {
    const KIND: ContractKind = ContractKind::Usefulness;
}
