//! The model boundary: every generation and classifier call goes through
//! [`ModelClient`].
//!
//! A call passes the generation circuit, is retried on transient errors,
//! and has its token usage recorded against the request. Classifier output
//! is then validated against its contract's JSON Schema; a response that
//! fails validation is re-requested up to the configured attempt count.

use std::sync::Arc;

use thiserror::Error;

use docvqa_core::{Classification, ContractViolation};

use crate::config::RetrySettings;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, OutputSchema, ProviderError};
use crate::resilience::{with_retry, CircuitBreaker, Collaborator, UsageTracker};
use crate::RuntimeError;

/// Why a classifier produced no verdict.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Circuit open for {0} collaborator")]
    CircuitOpen(Collaborator),

    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

impl From<ClassifyError> for RuntimeError {
    fn from(error: ClassifyError) -> Self {
        match error {
            ClassifyError::Provider(e) => RuntimeError::Provider(e),
            ClassifyError::CircuitOpen(c) => RuntimeError::CircuitOpen(c),
            ClassifyError::Contract(v) => v.into(),
        }
    }
}

/// Shared client for the generation service.
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    retry: RetrySettings,
    breaker: Arc<CircuitBreaker>,
    classifier_attempts: u32,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider.name())
            .field("model", &self.completion.model)
            .field("classifier_attempts", &self.classifier_attempts)
            .finish()
    }
}

impl ModelClient {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        retry: RetrySettings,
        breaker: Arc<CircuitBreaker>,
        classifier_attempts: u32,
    ) -> Self {
        Self {
            provider,
            completion,
            retry,
            breaker,
            classifier_attempts,
        }
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }

    /// Free-text completion.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        usage: &UsageTracker,
    ) -> Result<String, RuntimeError> {
        Ok(self.call(messages, None, usage).await?)
    }

    /// Structured completion validated against `C`'s contract.
    pub async fn classify<C: Classification>(
        &self,
        messages: Vec<ChatMessage>,
        usage: &UsageTracker,
    ) -> Result<C, ClassifyError> {
        let kind = C::KIND;
        let schema = kind
            .schema()
            .map_err(|e| ContractViolation::new(kind, vec![e]))?;
        let output = OutputSchema {
            name: kind.name(),
            schema,
        };

        let mut last_violation = None;
        for attempt in 1..=self.classifier_attempts {
            let raw = self.call(messages.clone(), Some(output), usage).await?;
            match C::parse(&raw) {
                Ok(verdict) => return Ok(verdict),
                Err(violation) => {
                    tracing::warn!(
                        classifier = kind.name(),
                        attempt,
                        details = ?violation.details,
                        "Classifier output violated its contract"
                    );
                    last_violation = Some(violation);
                }
            }
        }

        Err(last_violation
            .unwrap_or_else(|| ContractViolation::new(kind, vec!["no attempts allowed".to_string()]))
            .into())
    }

    async fn call(
        &self,
        messages: Vec<ChatMessage>,
        schema: Option<OutputSchema<'_>>,
        usage: &UsageTracker,
    ) -> Result<String, ClassifyError> {
        if self.breaker.is_open(Collaborator::Generation) {
            return Err(ClassifyError::CircuitOpen(Collaborator::Generation));
        }

        let provider = &self.provider;
        let config = &self.completion;
        let result = with_retry(&self.retry, "completion", || {
            let messages = messages.clone();
            async move {
                match schema {
                    Some(schema) => provider.complete_structured(messages, schema, config).await,
                    None => provider.complete(messages, config).await,
                }
            }
        })
        .await;

        match result {
            Ok(response) => {
                self.breaker.record_success(Collaborator::Generation);
                usage.record(&response.usage, &response.model);
                Ok(response.content)
            }
            Err(e) => {
                self.breaker.record_failure(Collaborator::Generation);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts;
    use crate::resilience::CircuitBreakerConfig;
    use crate::testing::{ScriptedProvider, Task};
    use docvqa_core::{RelevanceScore, RelevanceVerdict, UsefulnessVerdict};
    use std::time::Duration;

    fn client(provider: Arc<ScriptedProvider>, attempts: u32) -> ModelClient {
        ModelClient::new(
            provider,
            CompletionConfig::default(),
            RetrySettings {
                max_attempts: 2,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            Arc::new(CircuitBreaker::default()),
            attempts,
        )
    }

    #[tokio::test]
    async fn test_classify_accepts_wrapped_json() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond(Task::Relevance, "```json\n{\"score\": \"irrelevant\"}\n```"),
        );
        let usage = UsageTracker::new();
        let verdict: RelevanceVerdict = client(provider, 2)
            .classify(prompts::relevance("q", "d"), &usage)
            .await
            .unwrap();

        assert_eq!(verdict.score, RelevanceScore::Irrelevant);
        assert_eq!(usage.snapshot().llm_calls, 1);
    }

    #[tokio::test]
    async fn test_violation_is_retried_then_surfaced() {
        let provider = Arc::new(ScriptedProvider::new().respond(Task::Usefulness, r#"{"score": 9}"#));
        let usage = UsageTracker::new();
        let result: Result<UsefulnessVerdict, _> = client(provider.clone(), 2)
            .classify(prompts::usefulness("q", "a"), &usage)
            .await;

        match result {
            Err(ClassifyError::Contract(violation)) => {
                assert_eq!(violation.classifier, "usefulness_verdict");
            }
            other => panic!("expected contract violation, got {other:?}"),
        }
        assert_eq!(provider.calls(Task::Usefulness), 2);
    }

    #[tokio::test]
    async fn test_second_attempt_can_recover() {
        let provider = Arc::new(ScriptedProvider::new().respond_with(Task::Usefulness, |_, call| {
            Ok(if call == 0 { "không biết" } else { r#"{"score": 4}"# }.to_string())
        }));
        let usage = UsageTracker::new();
        let verdict: UsefulnessVerdict = client(provider, 2)
            .classify(prompts::usefulness("q", "a"), &usage)
            .await
            .unwrap();
        assert_eq!(verdict.score, 4);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let provider = Arc::new(ScriptedProvider::new());
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        breaker.record_failure(Collaborator::Generation);

        let client = ModelClient::new(
            provider.clone(),
            CompletionConfig::default(),
            RetrySettings::default(),
            breaker,
            1,
        );
        let result = client
            .complete(prompts::rewrite("q", "Vietnamese"), &UsageTracker::new())
            .await;

        assert!(matches!(result, Err(RuntimeError::CircuitOpen(Collaborator::Generation))));
        assert_eq!(provider.calls(Task::Rewrite), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_opens_circuit() {
        let provider = Arc::new(ScriptedProvider::new().fail(Task::Generation));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        let client = ModelClient::new(
            provider,
            CompletionConfig::default(),
            RetrySettings::default(),
            breaker.clone(),
            1,
        );

        let result = client
            .complete(prompts::generation("q", "", "Vietnamese"), &UsageTracker::new())
            .await;
        assert!(matches!(result, Err(RuntimeError::Provider(_))));
        assert!(breaker.is_open(Collaborator::Generation));
    }
}
