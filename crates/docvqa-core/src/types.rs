//! Request, response, and provision types shared by every stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::machine::{Outcome, Stage};

/// Sentinel used when a provision carries no `source` metadata.
pub const UNKNOWN_SOURCE: &str = "Nguồn không xác định";

/// A retrieved unit of legal text (a provision).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The provision text
    pub content: String,

    /// Metadata reported by the index; at minimum a `source` label
    #[serde(default)]
    pub source_metadata: BTreeMap<String, serde_json::Value>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_metadata: BTreeMap::new(),
        }
    }

    /// Attach a `source` label.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_metadata
            .insert("source".to_string(), serde_json::Value::String(source.into()));
        self
    }

    /// The `source` label, if the index provided a string one.
    pub fn source(&self) -> Option<&str> {
        self.source_metadata.get("source").and_then(|v| v.as_str())
    }
}

/// A provision cited by the generated answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Provision text, copied verbatim
    pub content: String,

    /// Source label, or [`UNKNOWN_SOURCE`]
    pub source: Option<String>,

    /// Always `None`: the relevance filter emits a binary verdict, not a score
    pub relevance_score: Option<f64>,
}

impl Citation {
    /// Derive a citation from a surviving provision.
    pub fn from_document(document: &Document) -> Self {
        Self {
            content: document.content.clone(),
            source: Some(
                document
                    .source()
                    .unwrap_or(UNKNOWN_SOURCE)
                    .to_string(),
            ),
            relevance_score: None,
        }
    }
}

/// Inbound question, as accepted by the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskRequest {
    /// The user's legal question
    pub question: String,

    /// Base64-encoded scan of the document, if any
    #[serde(default)]
    pub image_base64: Option<String>,

    /// Pre-extracted document text (Markdown), if any
    #[serde(default)]
    pub document_context: Option<String>,
}

impl AskRequest {
    /// A plain question with no document.
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Attach pre-extracted document text.
    pub fn with_document(mut self, text: impl Into<String>) -> Self {
        self.document_context = Some(text.into());
        self
    }

    /// Attach a base64-encoded image.
    pub fn with_image(mut self, image_base64: impl Into<String>) -> Self {
        self.image_base64 = Some(image_base64.into());
        self
    }
}

/// Outbound answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AskResponse {
    pub answer: String,

    #[serde(default)]
    pub citations: Vec<Citation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contradictions: Option<Vec<String>>,
}

/// What happened during one traversal of the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Correlation id for logs
    pub request_id: String,

    /// Terminal outcome
    pub outcome: Outcome,

    /// Every stage executed, in order, ending with the terminal stage
    pub path: Vec<Stage>,

    /// Tokens consumed across all collaborator calls
    pub total_tokens: u32,

    /// Number of LLM calls made
    pub llm_calls: u32,

    /// When the traversal started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_uses_source_metadata() {
        let doc = Document::new("Điều 5. Hợp đồng lao động").with_source("Bộ luật Lao động 2019");
        let citation = Citation::from_document(&doc);
        assert_eq!(citation.content, doc.content);
        assert_eq!(citation.source.as_deref(), Some("Bộ luật Lao động 2019"));
        assert!(citation.relevance_score.is_none());
    }

    #[test]
    fn test_citation_falls_back_to_unknown_source() {
        let citation = Citation::from_document(&Document::new("Điều 1."));
        assert_eq!(citation.source.as_deref(), Some(UNKNOWN_SOURCE));
    }

    #[test]
    fn test_request_optional_fields_default() {
        let req: AskRequest = serde_json::from_str(r#"{"question": "Hi there"}"#).unwrap();
        assert_eq!(req.question, "Hi there");
        assert!(req.image_base64.is_none());
        assert!(req.document_context.is_none());
    }

    #[test]
    fn test_response_omits_absent_contradictions() {
        let response = AskResponse {
            answer: "ok".to_string(),
            citations: vec![],
            document_context: None,
            contradictions: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("contradictions").is_none());
        assert!(json.get("document_context").is_none());
        assert_eq!(json["citations"], serde_json::json!([]));
    }
}
