//! OpenAI-compatible chat completion provider.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol.
//! Structured calls use `response_format: json_schema` in strict mode.

use crate::config::LlmSettings;

use super::{
    factory::ProviderFactory,
    http,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, OutputSchema, ProviderError,
    TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completion provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a provider with an explicit key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_credential(
            ApiCredential::new(api_key, CredentialSource::Programmatic, "OpenAI API key"),
            DEFAULT_BASE_URL,
        )
    }

    /// Create a provider from an already-resolved credential.
    pub fn with_credential(
        credential: ApiCredential,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            credential,
            base_url: base_url.into(),
            client: http::build_client(Duration::from_secs(120))?,
        })
    }

    /// Create from the `llm` section; the key falls back to `OPENAI_API_KEY`.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(
            settings.api_key.as_deref(),
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;
        let base_url = settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::with_credential(credential, base_url)
    }

    async fn send(&self, request: &ChatRequest<'_>, timeout: Duration) -> Result<CompletionResponse, ProviderError> {
        // Credential is exposed only here
        let response = self
            .client
            .post(http::join_url(&self.base_url, "chat/completions"))
            .bearer_auth(self.credential.expose())
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| http::send_error(e, timeout))?;

        let body: ChatResponse = http::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: body
                .usage
                .map(|u| TokenUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
            model: body.model,
            stop_reason: choice.finish_reason,
        })
    }
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a JsonValue,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            response_format: None,
        };
        self.send(&request, config.timeout).await
    }

    async fn complete_structured(
        &self,
        messages: Vec<ChatMessage>,
        schema: OutputSchema<'_>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            response_format: Some(ResponseFormat {
                type_: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: schema.name,
                    schema: schema.schema,
                    strict: true,
                },
            }),
        };
        self.send(&request, config.timeout).await
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Registered as "openai"; also serves any OpenAI-compatible endpoint via
/// `llm.base_url`.
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_settings(settings)?))
    }
}
