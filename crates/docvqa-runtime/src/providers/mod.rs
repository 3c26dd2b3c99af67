//! Chat-completion backends.
//!
//! Every LLM call in a traversal (routing, grading, HyDE, generation,
//! rewriting, contradiction detection) goes through [`LlmProvider`].
//! Keys are held as [`ApiCredential`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "reqwest")]
pub(crate) mod http;

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "qdrant")]
mod embeddings;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory, OPENAI_API_KEY_ENV};

#[cfg(feature = "qdrant")]
pub use embeddings::OpenAiEmbeddings;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ParseError(_)
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Per-call model parameters, derived from the `llm` config section.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Graders run at 0.0
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1500,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// One turn of an OpenAI-style chat; `role` is "system", "user" or "assistant".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// Few-shot answers in the router prompt.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }
}

/// JSON Schema a structured completion must satisfy.
#[derive(Debug, Clone, Copy)]
pub struct OutputSchema<'a> {
    /// Schema name, sent to backends that support named schemas
    pub name: &'a str,

    /// The JSON Schema document
    pub schema: &'a serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model that answered, as reported by the backend
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Token counts reported for one call; feeds the per-request budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A chat-completion backend.
///
/// One instance serves every in-flight request, so implementations hold no
/// per-request state.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Execute a completion whose content must be a JSON object matching
    /// `schema`.
    ///
    /// The default appends a JSON-only instruction and calls
    /// [`complete`](Self::complete). Backends with native structured output
    /// override this. Either way the caller validates the result.
    async fn complete_structured(
        &self,
        mut messages: Vec<ChatMessage>,
        schema: OutputSchema<'_>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        messages.push(ChatMessage::system(format!(
            "Respond with a single JSON object that validates against this JSON Schema, and nothing else:\n{}",
            schema.schema
        )));
        self.complete(messages, config).await
    }

    async fn health_check(&self) -> bool;

    /// Short backend name used in log fields.
    fn name(&self) -> &str;

    /// Rough count for calls whose backend reports no usage.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.chars().count() / 4) as u32
    }
}
