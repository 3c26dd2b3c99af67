//! Per-request state and the single merge rule.
//!
//! Nodes never mutate [`RequestState`] directly. Each returns a
//! [`NodeResult`] and [`RequestState::apply`] folds it in, so every
//! invariant on the record is enforced in one place:
//!
//! - `no_relevant_streak` resets on a filter pass that keeps anything and
//!   increments by one on a pass that keeps nothing
//! - `document_text`, once non-empty, is never overwritten
//! - `citations` mirror the provisions present at generation time

use serde::{Deserialize, Serialize};

use crate::types::{AskRequest, AskResponse, Citation, Document};

/// Current layout of [`RequestState`].
pub const STATE_VERSION: u32 = 1;

/// The record threaded through every stage of one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestState {
    pub version: u32,

    /// Current question; replaced by the rewriter
    pub question: String,

    /// Latest generated answer, empty until generation
    #[serde(default)]
    pub answer: String,

    /// Retrieved, then filtered, provisions
    #[serde(default)]
    pub provisions: Vec<Document>,

    /// Document text, from the request or from vision extraction
    #[serde(default)]
    pub document_text: Option<String>,

    /// Base64 image awaiting extraction
    #[serde(default, skip_serializing)]
    pub image_base64: Option<String>,

    /// Consecutive filter passes that kept nothing
    #[serde(default)]
    pub no_relevant_streak: u32,

    /// One per provision at generation time
    #[serde(default)]
    pub citations: Vec<Citation>,

    /// Result of the latest contradiction pass
    #[serde(default)]
    pub contradictions: Option<Vec<String>>,
}

/// The state change produced by one node execution.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    /// Extraction gate output
    Extracted { text: String },
    /// Provisions as ranked by the index
    Retrieved { provisions: Vec<Document> },
    /// Provisions that survived the relevance filter
    Filtered { provisions: Vec<Document> },
    Generated { answer: String },
    Detected { contradictions: Vec<String> },
    Rewritten { question: String },
    /// Pass-through before the usefulness check
    Finalized,
    NoAnswer { message: String },
    Exhausted { message: String },
}

/// What the usefulness check sees.
#[derive(Debug, Clone, Copy)]
pub struct FinalDraft<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub provisions: &'a [Document],
    pub citations: &'a [Citation],
    pub contradictions: Option<&'a [String]>,
}

impl RequestState {
    /// A fresh state for a question with no document.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            question: question.into(),
            answer: String::new(),
            provisions: Vec::new(),
            document_text: None,
            image_base64: None,
            no_relevant_streak: 0,
            citations: Vec::new(),
            contradictions: None,
        }
    }

    /// Seed state from an inbound request.
    pub fn from_request(request: &AskRequest) -> Self {
        Self {
            document_text: request.document_context.clone(),
            image_base64: request.image_base64.clone(),
            ..Self::new(request.question.clone())
        }
    }

    /// Document text if present and non-empty.
    pub fn document(&self) -> Option<&str> {
        self.document_text.as_deref().filter(|text| !text.is_empty())
    }

    /// Fold one node's output into the state.
    pub fn apply(mut self, result: NodeResult) -> Self {
        match result {
            NodeResult::Extracted { text } => {
                if self.document().is_none() {
                    self.document_text = Some(text);
                }
                self.image_base64 = None;
            }
            NodeResult::Retrieved { provisions } => {
                self.provisions = provisions;
            }
            NodeResult::Filtered { provisions } => {
                if provisions.is_empty() {
                    self.no_relevant_streak += 1;
                } else {
                    self.no_relevant_streak = 0;
                }
                tracing::debug!(
                    kept = provisions.len(),
                    streak = self.no_relevant_streak,
                    "Relevance streak updated"
                );
                self.provisions = provisions;
            }
            NodeResult::Generated { answer } => {
                self.answer = answer;
                self.citations = self.provisions.iter().map(Citation::from_document).collect();
            }
            NodeResult::Detected { contradictions } => {
                self.contradictions = Some(contradictions);
            }
            NodeResult::Rewritten { question } => {
                self.question = question;
            }
            NodeResult::Finalized => {}
            NodeResult::NoAnswer { message } | NodeResult::Exhausted { message } => {
                self.answer = message;
                self.citations.clear();
                self.contradictions = None;
            }
        }
        self
    }

    /// Repackage for the usefulness check.
    pub fn final_draft(&self) -> FinalDraft<'_> {
        FinalDraft {
            question: &self.question,
            answer: &self.answer,
            provisions: &self.provisions,
            citations: &self.citations,
            contradictions: self.contradictions.as_deref(),
        }
    }

    /// Build the outbound response.
    pub fn into_response(self) -> AskResponse {
        AskResponse {
            answer: self.answer,
            citations: self.citations,
            document_context: self.document_text.filter(|text| !text.is_empty()),
            contradictions: self.contradictions,
        }
    }
}
