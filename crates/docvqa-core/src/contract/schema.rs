//! JSON Schemas for classifier output.
//!
//! Each schema is compiled once and reused. Validation happens on the raw
//! JSON value, before deserialisation, so out-of-range values (a usefulness
//! score of 7, an unknown relevance label) are reported with their path.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

const ROUTER_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "decision": {
      "type": "string",
      "enum": ["yes", "no", "continue"],
      "description": "'yes' to retrieve, 'no' if general chat, 'continue' if using history."
    }
  },
  "required": ["decision"],
  "additionalProperties": false
}"#;

const RELEVANCE_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "score": {
      "type": "string",
      "enum": ["relevant", "irrelevant"],
      "description": "Is the provision relevant to the user question?"
    }
  },
  "required": ["score"],
  "additionalProperties": false
}"#;

const GROUNDEDNESS_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "score": {
      "type": "string",
      "enum": ["fully supported", "partially supported", "no support"],
      "description": "Is the answer supported by the provisions?"
    }
  },
  "required": ["score"],
  "additionalProperties": false
}"#;

const USEFULNESS_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "score": {
      "type": "integer",
      "minimum": 1,
      "maximum": 5,
      "description": "Score 1-5. 5 is best."
    }
  },
  "required": ["score"],
  "additionalProperties": false
}"#;

type Compiled = OnceLock<Result<(serde_json::Value, jsonschema::Validator), String>>;

static ROUTER: Compiled = OnceLock::new();
static RELEVANCE: Compiled = OnceLock::new();
static GROUNDEDNESS: Compiled = OnceLock::new();
static USEFULNESS: Compiled = OnceLock::new();

/// The four classification contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Router,
    Relevance,
    Groundedness,
    Usefulness,
}

impl ContractKind {
    /// Stable name, used in logs, errors, and structured-output requests.
    pub fn name(self) -> &'static str {
        match self {
            ContractKind::Router => "router_verdict",
            ContractKind::Relevance => "relevance_verdict",
            ContractKind::Groundedness => "groundedness_verdict",
            ContractKind::Usefulness => "usefulness_verdict",
        }
    }

    fn source(self) -> &'static str {
        match self {
            ContractKind::Router => ROUTER_SCHEMA,
            ContractKind::Relevance => RELEVANCE_SCHEMA,
            ContractKind::Groundedness => GROUNDEDNESS_SCHEMA,
            ContractKind::Usefulness => USEFULNESS_SCHEMA,
        }
    }

    fn slot(self) -> &'static Compiled {
        match self {
            ContractKind::Router => &ROUTER,
            ContractKind::Relevance => &RELEVANCE,
            ContractKind::Groundedness => &GROUNDEDNESS,
            ContractKind::Usefulness => &USEFULNESS,
        }
    }

    fn compiled(self) -> Result<&'static (serde_json::Value, jsonschema::Validator), String> {
        let result = self.slot().get_or_init(|| {
            let value: serde_json::Value = serde_json::from_str(self.source())
                .map_err(|e| format!("Invalid schema JSON: {}", e))?;
            let validator = jsonschema::options()
                .build(&value)
                .map_err(|e| format!("Failed to compile schema: {}", e))?;
            Ok((value, validator))
        });

        result.as_ref().map_err(Clone::clone)
    }

    /// The schema as a JSON value, for structured-output requests.
    pub fn schema(self) -> Result<&'static serde_json::Value, String> {
        self.compiled().map(|(value, _)| value)
    }

    /// Validate a value, returning every violation with its instance path.
    pub fn validate(self, value: &serde_json::Value) -> Result<(), Vec<String>> {
        let (_, validator) = self.compiled().map_err(|e| vec![e])?;

        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Check validity without collecting messages.
    pub fn is_valid(self, value: &serde_json::Value) -> bool {
        self.compiled()
            .map(|(_, validator)| validator.is_valid(value))
            .unwrap_or(false)
    }
}
