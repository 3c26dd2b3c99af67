//! Deterministic fakes for every collaborator.
//!
//! [`ScriptedProvider`] recognises which step a call belongs to from its
//! opening system prompt and answers from a per-step script, so a test can
//! steer every branch of the state machine without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use docvqa_core::Document;

use crate::collaborators::{ExtractionError, ImageExtractor, ImageInput, SearchError, VectorSearch};
use crate::prompts;
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};

/// Which step issued a model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Router,
    Relevance,
    Groundedness,
    Usefulness,
    Hyde,
    Generation,
    Rewrite,
    Contradiction,
}

impl Task {
    pub const ALL: [Task; 8] = [
        Task::Router,
        Task::Relevance,
        Task::Groundedness,
        Task::Usefulness,
        Task::Hyde,
        Task::Generation,
        Task::Rewrite,
        Task::Contradiction,
    ];

    pub fn system_prompt(self) -> &'static str {
        match self {
            Task::Router => prompts::ROUTER_SYSTEM_PROMPT,
            Task::Relevance => prompts::RELEVANCE_SYSTEM_PROMPT,
            Task::Groundedness => prompts::GROUNDEDNESS_SYSTEM_PROMPT,
            Task::Usefulness => prompts::USEFULNESS_SYSTEM_PROMPT,
            Task::Hyde => prompts::HYDE_SYSTEM_PROMPT,
            Task::Generation => prompts::GENERATION_SYSTEM_PROMPT,
            Task::Rewrite => prompts::REWRITE_SYSTEM_PROMPT,
            Task::Contradiction => prompts::CONTRADICTION_SYSTEM_PROMPT,
        }
    }

    /// Identify a call by its first message.
    pub fn identify(messages: &[ChatMessage]) -> Option<Task> {
        let first = messages.first()?;
        Task::ALL
            .into_iter()
            .find(|task| first.content == task.system_prompt())
    }

    fn default_response(self) -> &'static str {
        match self {
            Task::Router => r#"{"decision": "yes"}"#,
            Task::Relevance => r#"{"score": "relevant"}"#,
            Task::Groundedness => r#"{"score": "fully supported"}"#,
            Task::Usefulness => r#"{"score": 5}"#,
            Task::Hyde => "Theo quy định của pháp luật, người lao động có quyền...",
            Task::Generation => "Theo Điều luật 1, câu trả lời là...",
            Task::Rewrite => "Quy định pháp luật liên quan đến câu hỏi là gì?",
            Task::Contradiction => "",
        }
    }
}

type Responder = Box<dyn Fn(&[ChatMessage], usize) -> Result<String, ProviderError> + Send + Sync>;

/// A provider that answers from a per-task script.
///
/// Unscripted tasks get a benign default: route to retrieval, keep every
/// provision, accept the answer.
pub struct ScriptedProvider {
    responders: HashMap<Task, Responder>,
    calls: Mutex<HashMap<Task, usize>>,
    log: Mutex<Vec<(Task, Vec<ChatMessage>)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            responders: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Always answer `task` with `response`.
    pub fn respond(self, task: Task, response: impl Into<String>) -> Self {
        let response = response.into();
        self.respond_with(task, move |_, _| Ok(response.clone()))
    }

    /// Answer `task` from a closure given the messages and the zero-based
    /// call index for that task.
    pub fn respond_with(
        mut self,
        task: Task,
        responder: impl Fn(&[ChatMessage], usize) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.responders.insert(task, Box::new(responder));
        self
    }

    /// Fail every call for `task` with a non-transient error.
    pub fn fail(self, task: Task) -> Self {
        self.respond_with(task, |_, _| {
            Err(ProviderError::ApiError {
                status: 400,
                message: "scripted failure".to_string(),
            })
        })
    }

    /// Calls made for `task`.
    pub fn calls(&self, task: Task) -> usize {
        self.calls.lock().get(&task).copied().unwrap_or(0)
    }

    /// Messages sent for each call of `task`, in order.
    pub fn messages(&self, task: Task) -> Vec<Vec<ChatMessage>> {
        self.log
            .lock()
            .iter()
            .filter(|(t, _)| *t == task)
            .map(|(_, messages)| messages.clone())
            .collect()
    }

    /// Tasks in call order.
    pub fn sequence(&self) -> Vec<Task> {
        self.log.lock().iter().map(|(task, _)| *task).collect()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let task = Task::identify(&messages).ok_or_else(|| ProviderError::ApiError {
            status: 400,
            message: "unscripted prompt".to_string(),
        })?;

        let index = {
            let mut calls = self.calls.lock();
            let count = calls.entry(task).or_insert(0);
            *count += 1;
            *count - 1
        };
        self.log.lock().push((task, messages.clone()));

        let content = match self.responders.get(&task) {
            Some(responder) => responder(&messages, index)?,
            None => task.default_response().to_string(),
        };

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A fixed index that returns the same provisions for every query.
pub struct StaticSearch {
    documents: Vec<Document>,
    fail_first: usize,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            fail_first: 0,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// An index with nothing in it.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Fail the first `n` searches with a backend error.
    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Every query received, failed ones included.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl VectorSearch for StaticSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, SearchError> {
        let call = {
            let mut queries = self.queries.lock();
            queries.push(query.to_string());
            queries.len()
        };

        if call <= self.fail_first {
            return Err(SearchError::Backend(ProviderError::HttpError(
                "connection refused".to_string(),
            )));
        }

        Ok(self.documents.iter().take(k).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// An index that is always down.
#[derive(Default)]
pub struct FailingSearch {
    calls: AtomicUsize,
}

impl FailingSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearch for FailingSearch {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Document>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SearchError::Backend(ProviderError::ApiError {
            status: 503,
            message: "index unavailable".to_string(),
        }))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// An extractor with a fixed result.
pub struct StaticExtractor {
    result: Result<String, String>,
    calls: AtomicUsize,
}

impl StaticExtractor {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err("vision service unavailable".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageExtractor for StaticExtractor {
    async fn extract(&self, image: ImageInput) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        image.to_base64()?;
        self.result.clone().map_err(|message| {
            ExtractionError::Provider(ProviderError::ApiError {
                status: 503,
                message,
            })
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompt_builder_is_identifiable() {
        let cases = [
            (prompts::router("q"), Task::Router),
            (prompts::relevance("q", "d"), Task::Relevance),
            (prompts::groundedness("q", "f", "a"), Task::Groundedness),
            (prompts::usefulness("q", "a"), Task::Usefulness),
            (prompts::hyde("q", "Vietnamese"), Task::Hyde),
            (prompts::generation("q", "", "Vietnamese"), Task::Generation),
            (prompts::rewrite("q", "Vietnamese"), Task::Rewrite),
            (prompts::contradiction("d", &[]), Task::Contradiction),
        ];
        for (messages, task) in cases {
            assert_eq!(Task::identify(&messages), Some(task));
        }
        assert_eq!(Task::identify(&[ChatMessage::user("hello")]), None);
    }

    #[tokio::test]
    async fn test_scripted_provider_counts_calls() {
        let provider = ScriptedProvider::new().respond(Task::Rewrite, "câu hỏi mới");
        let config = CompletionConfig::default();

        let first = provider
            .complete(prompts::rewrite("q", "Vietnamese"), &config)
            .await
            .unwrap();
        provider
            .complete(prompts::rewrite("q", "Vietnamese"), &config)
            .await
            .unwrap();

        assert_eq!(first.content, "câu hỏi mới");
        assert_eq!(first.usage.total(), 15);
        assert_eq!(provider.calls(Task::Rewrite), 2);
        assert_eq!(provider.sequence(), vec![Task::Rewrite, Task::Rewrite]);
    }

    #[tokio::test]
    async fn test_static_search_honours_k_and_failures() {
        let search = StaticSearch::new(vec![Document::new("a"), Document::new("b")]).fail_first(1);

        assert!(search.search("q1", 1).await.is_err());
        let docs = search.search("q2", 1).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(search.queries(), vec!["q1".to_string(), "q2".to_string()]);
    }

    #[tokio::test]
    async fn test_static_extractor() {
        let extractor = StaticExtractor::text("# HỢP ĐỒNG");
        let text = extractor
            .extract(ImageInput::Bytes(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(text, "# HỢP ĐỒNG");

        let failing = StaticExtractor::failing();
        assert!(failing.extract(ImageInput::Bytes(vec![1])).await.is_err());
        assert_eq!(failing.calls(), 1);
    }
}
