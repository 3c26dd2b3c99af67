//! Classification contracts.
//!
//! Every grading step (router, relevance, groundedness, usefulness) must
//! produce a value that validates against its JSON Schema before it is
//! turned into a typed verdict. A response that does not is a
//! [`ContractViolation`], never a panic.

mod schema;
mod verdicts;

pub use schema::ContractKind;
pub use verdicts::{
    GroundednessScore, GroundednessVerdict, RelevanceScore, RelevanceVerdict, RouterDecision,
    RouterVerdict, UsefulnessVerdict,
};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Classifier output that failed to parse or failed its schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Contract violation in {classifier}: {}", details.join("; "))]
pub struct ContractViolation {
    /// Contract name, e.g. `relevance_verdict`
    pub classifier: &'static str,

    /// Parse or validation messages
    pub details: Vec<String>,
}

impl ContractViolation {
    pub fn new(kind: ContractKind, details: Vec<String>) -> Self {
        Self {
            classifier: kind.name(),
            details,
        }
    }
}

/// A verdict type bound to its contract.
pub trait Classification: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: ContractKind;

    /// Parse raw model output into a verdict.
    ///
    /// The first balanced JSON object is taken from `raw`, so prose or code
    /// fences around the object are tolerated.
    fn parse(raw: &str) -> Result<Self, ContractViolation> {
        let object = extract_json_object(raw).ok_or_else(|| {
            ContractViolation::new(Self::KIND, vec!["no JSON object in response".to_string()])
        })?;

        let value: serde_json::Value = serde_json::from_str(object)
            .map_err(|e| ContractViolation::new(Self::KIND, vec![e.to_string()]))?;

        Self::from_value(value)
    }

    /// Validate an already-parsed value and deserialise it.
    fn from_value(value: serde_json::Value) -> Result<Self, ContractViolation> {
        Self::KIND
            .validate(&value)
            .map_err(|errors| ContractViolation::new(Self::KIND, errors))?;

        serde_json::from_value(value)
            .map_err(|e| ContractViolation::new(Self::KIND, vec![e.to_string()]))
    }
}

/// Locate the first balanced `{...}` in `text`, honouring string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let verdict = RelevanceVerdict::parse(r#"{"score": "relevant"}"#).unwrap();
        assert_eq!(verdict.score, RelevanceScore::Relevant);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Here is my assessment:\n```json\n{\"score\": \"no support\"}\n```";
        let verdict = GroundednessVerdict::parse(raw).unwrap();
        assert_eq!(verdict.score, GroundednessScore::NoSupport);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let err = UsefulnessVerdict::parse(r#"{"score": 9}"#).unwrap_err();
        assert_eq!(err.classifier, "usefulness_verdict");
        assert!(!err.details.is_empty());
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = RouterVerdict::parse("yes").unwrap_err();
        assert_eq!(err.classifier, "router_verdict");
        assert!(err.to_string().contains("no JSON object"));
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let raw = r#"note {"decision": "yes", "why": "has } brace"} trailing"#;
        assert_eq!(
            extract_json_object(raw),
            Some(r#"{"decision": "yes", "why": "has } brace"}"#)
        );
    }

    #[test]
    fn test_extract_nested() {
        assert_eq!(extract_json_object(r#"{"a": {"b": 1}}"#), Some(r#"{"a": {"b": 1}}"#));
        assert_eq!(extract_json_object("{ unterminated"), None);
        assert_eq!(extract_json_object("none"), None);
    }
}
