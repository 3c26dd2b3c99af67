//! Runtime orchestrator for the request state machine.
//!
//! One [`Orchestrator`] serves every request. Each call to
//! [`Orchestrator::ask`] owns its own [`RequestState`], [`LoopGuard`] and
//! [`UsageTracker`]; only the collaborators, the circuit breaker and the
//! relevance cache are shared.
//!
//! # Execution Flow
//! 1. Execute the current stage's node (strictly sequential)
//! 2. Fold its output into state with `RequestState::apply`
//! 3. Turn the output into a [`Signal`] and resolve the edge with `Stage::next`
//! 4. Admit the edge through the loop guard and token ceiling
//! 5. Stop at `Done`, `NoAnswer` or `Exhausted`

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::Instrument;

use docvqa_core::{
    AskRequest, AskResponse, FilterDecision, LimitReached, LoopGuard, LoopLimits, MachineError,
    NodeResult, Outcome, RequestState, RunReport, Signal, Stage,
};

use crate::cache::RelevanceCache;
use crate::classifier::ModelClient;
use crate::collaborators::{ImageExtractor, VectorSearch};
use crate::config::{MessageSettings, RuntimeConfig};
use crate::nodes::{self, Collaborators};
use crate::providers::LlmProvider;
use crate::resilience::{CircuitBreaker, UsageTracker};
use crate::RuntimeError;

/// Drives requests through the state machine.
pub struct Orchestrator {
    collaborators: Collaborators,
    limits: LoopLimits,
    max_tokens_per_request: Option<u32>,
    messages: MessageSettings,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Answer one request.
    ///
    /// Returns the response together with a report of the path taken.
    /// `NoAnswer` and `Exhausted` are successful outcomes carrying their
    /// fixed messages; only unrecoverable collaborator failures and
    /// contract violations are errors.
    pub async fn ask(&self, request: AskRequest) -> Result<(AskResponse, RunReport), RuntimeError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "ask",
            request_id = %request_id,
            question_chars = request.question.chars().count()
        );

        self.run(request, request_id).instrument(span).await
    }

    async fn run(
        &self,
        request: AskRequest,
        request_id: String,
    ) -> Result<(AskResponse, RunReport), RuntimeError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let usage = UsageTracker::new();
        let mut guard = LoopGuard::new(self.limits);
        let mut state = RequestState::from_request(&request);
        let mut stage = Stage::INITIAL;
        let mut path = vec![stage];

        let outcome = loop {
            let (stepped, signal) = self.step(stage, state, &usage).await?;
            state = stepped;

            let next = stage.next(signal)?;
            if let Err(reason) = guard
                .record(stage, next)
                .and_then(|()| self.check_budget(&usage, next))
            {
                path.push(Stage::Exhausted);
                break Outcome::Exhausted { reason };
            }

            path.push(next);
            stage = next;
            match stage {
                Stage::Done => break Outcome::Answered,
                Stage::NoAnswer => break Outcome::NoAnswer,
                _ => {}
            }
        };

        state = match outcome {
            Outcome::Answered => {
                tracing::info!(steps = guard.steps(), "Request answered");
                state
            }
            Outcome::NoAnswer => {
                tracing::warn!(streak = state.no_relevant_streak, "No relevant provisions, giving up");
                state.apply(NodeResult::NoAnswer {
                    message: self.messages.no_answer.clone(),
                })
            }
            Outcome::Exhausted { reason } => {
                tracing::warn!(
                    reason = %reason,
                    steps = guard.steps(),
                    regenerations = guard.regenerations(),
                    usefulness_rewrites = guard.usefulness_rewrites(),
                    "Loop limit reached, giving up"
                );
                state.apply(NodeResult::Exhausted {
                    message: self.messages.exhausted.clone(),
                })
            }
        };

        let snapshot = usage.snapshot();
        let report = RunReport {
            request_id,
            outcome,
            path,
            total_tokens: snapshot.total_tokens,
            llm_calls: snapshot.llm_calls,
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };

        Ok((state.into_response(), report))
    }

    /// Execute one non-terminal stage.
    async fn step(
        &self,
        stage: Stage,
        state: RequestState,
        usage: &UsageTracker,
    ) -> Result<(RequestState, Signal), RuntimeError> {
        let c = &self.collaborators;
        tracing::info!(stage = ?stage, "Entering stage");

        let stepped = match stage {
            Stage::Extract => {
                let extracted = nodes::extract(c, &state).await;
                let state = state.apply(extracted);
                let decision = nodes::route(c, &state, usage).await?;
                (state, Signal::Route(decision))
            }
            Stage::Retrieve => {
                let retrieved = nodes::retrieve(c, &state, usage).await?;
                (state.apply(retrieved), Signal::Continue)
            }
            Stage::Filter => {
                let filtered = nodes::filter(c, &state, usage).await?;
                let state = state.apply(filtered);
                let decision =
                    FilterDecision::decide(state.provisions.len(), state.no_relevant_streak);
                (state, Signal::Filter(decision))
            }
            Stage::Generate => {
                let generated = nodes::generate(c, &state, usage).await?;
                (state.apply(generated), Signal::Continue)
            }
            Stage::Detect => {
                let detected = nodes::detect_contradictions(c, &state, usage).await;
                (state.apply(detected), Signal::Continue)
            }
            Stage::GroundednessGate => {
                let decision = nodes::grade_groundedness(c, &state, usage).await?;
                (state, Signal::Grounded(decision))
            }
            Stage::Finalize => (state.apply(NodeResult::Finalized), Signal::Continue),
            Stage::UsefulnessGate => {
                let decision = nodes::grade_usefulness(c, state.final_draft(), usage).await?;
                (state, Signal::Useful(decision))
            }
            Stage::Rewrite => {
                let rewritten = nodes::rewrite(c, &state, usage).await?;
                (state.apply(rewritten), Signal::Continue)
            }
            // Terminal stages have no outgoing edge
            Stage::Done | Stage::NoAnswer | Stage::Exhausted => {
                return Err(MachineError::InvalidTransition {
                    stage,
                    signal: Signal::Continue,
                }
                .into())
            }
        };

        Ok(stepped)
    }

    fn check_budget(&self, usage: &UsageTracker, next: Stage) -> Result<(), LimitReached> {
        match self.max_tokens_per_request {
            Some(max) if !next.is_terminal() && usage.exceeds(Some(max)) => {
                Err(LimitReached::TokenBudget { max })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.collaborators.model)
            .field("search", &self.collaborators.search.name())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: RuntimeConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    search: Option<Arc<dyn VectorSearch>>,
    extractor: Option<Arc<dyn ImageExtractor>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn search(mut self, search: Arc<dyn VectorSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Without an extractor, image-only requests proceed with no document.
    pub fn extractor(mut self, extractor: Arc<dyn ImageExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Share a breaker with other orchestrators; defaults to a fresh one.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn build(self) -> Result<Orchestrator, RuntimeError> {
        let config = self.config;
        config.validate()?;

        let provider = self
            .provider
            .ok_or_else(|| RuntimeError::NotConfigured("LLM provider".to_string()))?;
        let search = self
            .search
            .ok_or_else(|| RuntimeError::NotConfigured("vector search".to_string()))?;
        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())));

        let model = ModelClient::new(
            provider,
            config.completion_config(),
            config.retry.clone(),
            breaker.clone(),
            config.limits.classifier_attempts,
        );

        Ok(Orchestrator {
            collaborators: Collaborators {
                model,
                search,
                extractor: self.extractor,
                breaker,
                cache: RelevanceCache::new(config.cache.max_entries, config.cache.ttl),
                top_k: config.search.top_k,
                filter_concurrency: config.search.filter_concurrency,
                response_language: config.messages.response_language.clone(),
            },
            limits: config.loop_limits(),
            max_tokens_per_request: config.limits.max_tokens_per_request,
            messages: config.messages,
        })
    }
}

#[cfg(all(feature = "openai", feature = "qdrant"))]
impl Orchestrator {
    /// Build the production stack from configuration.
    ///
    /// The vision extractor is attached only when `vision.enabled` is set,
    /// the `vision` feature is compiled in, and a key resolves.
    pub fn from_config(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let registry = crate::providers::ProviderRegistry::with_defaults();
        let provider = registry.create(&config.llm)?;
        let search = qdrant_search(&config)?;

        let mut builder = Orchestrator::builder()
            .provider(provider)
            .search(Arc::new(search));

        if let Some(extractor) = vision_extractor(&config)? {
            builder = builder.extractor(extractor);
        }

        builder.config(config).build()
    }
}

/// Qdrant search with OpenAI-compatible embeddings.
///
/// Embedding credentials and base URL fall back to the `llm` section.
#[cfg(all(feature = "openai", feature = "qdrant"))]
pub fn qdrant_search(
    config: &RuntimeConfig,
) -> Result<crate::collaborators::QdrantSearch, RuntimeError> {
    use crate::collaborators::{QdrantSearch, QDRANT_API_KEY_ENV};
    use crate::providers::{ApiCredential, OpenAiEmbeddings, OPENAI_API_KEY_ENV};

    let embedding_key = ApiCredential::resolve(
        config
            .embedding
            .api_key
            .as_deref()
            .or(config.llm.api_key.as_deref()),
        OPENAI_API_KEY_ENV,
        "Embedding API key",
    )?;
    let embedding_url = config
        .embedding
        .base_url
        .as_deref()
        .or(config.llm.base_url.as_deref())
        .unwrap_or(DEFAULT_OPENAI_URL);
    let embeddings = OpenAiEmbeddings::new(
        embedding_key,
        embedding_url,
        config.embedding.model.clone(),
        config.llm.timeout,
    )?;

    let search = QdrantSearch::new(
        config.qdrant.url.clone(),
        config.qdrant.collection.clone(),
        ApiCredential::resolve_optional(
            config.qdrant.api_key.as_deref(),
            QDRANT_API_KEY_ENV,
            "Qdrant API key",
        ),
        embeddings,
        config.llm.timeout,
    )?;
    Ok(search)
}

#[cfg(all(feature = "openai", feature = "qdrant"))]
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

#[cfg(all(feature = "openai", feature = "qdrant", feature = "vision"))]
fn vision_extractor(config: &RuntimeConfig) -> Result<Option<Arc<dyn ImageExtractor>>, RuntimeError> {
    use crate::collaborators::{VisionExtractor, DEEPSEEK_API_KEY_ENV};
    use crate::providers::ApiCredential;

    if !config.vision.enabled {
        return Ok(None);
    }

    let Some(credential) = ApiCredential::resolve_optional(
        config.vision.api_key.as_deref(),
        DEEPSEEK_API_KEY_ENV,
        "Vision API key",
    ) else {
        tracing::warn!("Vision enabled but no API key found, image extraction disabled");
        return Ok(None);
    };

    let extractor = VisionExtractor::new(
        credential,
        config.vision.base_url.clone(),
        config.vision.model.clone(),
        config.vision.max_tokens,
        config.vision.timeout,
    )?;
    Ok(Some(Arc::new(extractor)))
}

#[cfg(all(feature = "openai", feature = "qdrant", not(feature = "vision")))]
fn vision_extractor(config: &RuntimeConfig) -> Result<Option<Arc<dyn ImageExtractor>>, RuntimeError> {
    if config.vision.enabled {
        tracing::warn!("Vision enabled but the vision feature is not compiled in");
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, StaticSearch, Task};
    use docvqa_core::Document;

    fn orchestrator(provider: ScriptedProvider, search: StaticSearch) -> Orchestrator {
        Orchestrator::builder()
            .provider(Arc::new(provider))
            .search(Arc::new(search))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_collaborators() {
        let missing_search = Orchestrator::builder()
            .provider(Arc::new(ScriptedProvider::new()))
            .build();
        assert!(matches!(missing_search, Err(RuntimeError::NotConfigured(_))));

        let missing_provider = Orchestrator::builder()
            .search(Arc::new(StaticSearch::empty()))
            .build();
        assert!(matches!(missing_provider, Err(RuntimeError::NotConfigured(_))));
    }

    #[test]
    fn test_build_validates_config() {
        let mut config = RuntimeConfig::default();
        config.search.top_k = 0;
        let result = Orchestrator::builder()
            .config(config)
            .provider(Arc::new(ScriptedProvider::new()))
            .search(Arc::new(StaticSearch::empty()))
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_happy_path_visits_every_stage_once() {
        let orchestrator = orchestrator(
            ScriptedProvider::new(),
            StaticSearch::new(vec![Document::new("Điều 5.").with_source("luat")]),
        );

        let (response, report) = orchestrator
            .ask(AskRequest::question("Điều 5 quy định gì?"))
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::Answered);
        assert_eq!(
            report.path,
            vec![
                Stage::Extract,
                Stage::Retrieve,
                Stage::Filter,
                Stage::Generate,
                Stage::Detect,
                Stage::GroundednessGate,
                Stage::Finalize,
                Stage::UsefulnessGate,
                Stage::Done,
            ]
        );
        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.contradictions, Some(vec![]));
        // hyde, relevance, generation, groundedness, usefulness
        assert_eq!(report.llm_calls, 5);
        assert_eq!(report.total_tokens, 75);
        assert!(!report.request_id.is_empty());
    }

    #[tokio::test]
    async fn test_token_ceiling_exhausts() {
        let mut config = RuntimeConfig::default();
        config.limits.max_tokens_per_request = Some(20);
        let orchestrator = Orchestrator::builder()
            .config(config)
            .provider(Arc::new(ScriptedProvider::new()))
            .search(Arc::new(StaticSearch::new(vec![Document::new("Điều 5.")])))
            .build()
            .unwrap();

        let (response, report) = orchestrator
            .ask(AskRequest::question("Điều 5 quy định gì?"))
            .await
            .unwrap();

        // Retrieve (hyde 15) then Filter (relevance 15) crosses 20
        assert_eq!(
            report.outcome,
            Outcome::Exhausted {
                reason: LimitReached::TokenBudget { max: 20 }
            }
        );
        assert_eq!(report.path.last(), Some(&Stage::Exhausted));
        assert_eq!(response.answer, docvqa_core::EXHAUSTED_MESSAGE);
        assert!(response.citations.is_empty());
    }

    #[tokio::test]
    async fn test_router_failure_is_an_error() {
        let orchestrator = orchestrator(
            ScriptedProvider::new().fail(Task::Router),
            StaticSearch::empty(),
        );
        let result = orchestrator.ask(AskRequest::question("Hi there")).await;
        assert!(matches!(result, Err(RuntimeError::Provider(_))));
    }
}
