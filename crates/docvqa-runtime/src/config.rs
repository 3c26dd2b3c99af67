//! Runtime configuration.
//!
//! Loaded from YAML; every section has defaults, so an empty file is a
//! valid configuration. Durations are human-readable strings such as
//! `"500ms"`, `"60s"` or `"1h"`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use docvqa_core::{LoopLimits, EXHAUSTED_MESSAGE, NO_ANSWER_MESSAGE};

use crate::providers::CompletionConfig;
use crate::resilience::CircuitBreakerConfig;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for `Duration` as a humantime string.
pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub project_name: String,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub qdrant: QdrantSettings,
    pub vision: VisionSettings,
    pub search: SearchSettings,
    pub limits: LimitSettings,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheSettings,
    pub messages: MessageSettings,
    pub server: ServerSettings,
    pub ingest: IngestSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            project_name: "Legal DocVQA".to_string(),
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            qdrant: QdrantSettings::default(),
            vision: VisionSettings::default(),
            search: SearchSettings::default(),
            limits: LimitSettings::default(),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheSettings::default(),
            messages: MessageSettings::default(),
            server: ServerSettings::default(),
            ingest: IngestSettings::default(),
        }
    }
}

/// Text generation and classification backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Registered provider type, e.g. "openai"
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    pub base_url: Option<String>,
    /// Falls back to `OPENAI_API_KEY`
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 1500,
            timeout: Duration::from_secs(60),
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantSettings {
    pub url: String,
    pub collection: String,
    /// Falls back to `QDRANT_API_KEY`
    pub api_key: Option<String>,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "legal_docs".to_string(),
            api_key: None,
        }
    }
}

/// Image-to-text extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    /// Falls back to `DEEPSEEK_API_KEY`
    pub api_key: Option<String>,
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "deepseek-chat".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Provisions requested per retrieval
    pub top_k: usize,
    /// Relevance classifications in flight at once
    pub filter_concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            filter_concurrency: 4,
        }
    }
}

/// Loop caps and per-request ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_steps: u32,
    pub max_regenerations: u32,
    pub max_usefulness_rewrites: u32,
    /// Attempts per classifier call before a contract violation surfaces
    pub classifier_attempts: u32,
    pub max_tokens_per_request: Option<u32>,
}

impl Default for LimitSettings {
    fn default() -> Self {
        let limits = LoopLimits::default();
        Self {
            max_steps: limits.max_steps,
            max_regenerations: limits.max_regenerations,
            max_usefulness_rewrites: limits.max_usefulness_rewrites,
            classifier_attempts: 2,
            max_tokens_per_request: None,
        }
    }
}

/// Backoff for transient provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    #[serde(with = "humantime_duration")]
    pub min_delay: Duration,
    #[serde(with = "humantime_duration")]
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: u64,
    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// User-facing fixed texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    pub no_answer: String,
    pub exhausted: String,
    /// Language generation, expansion and rewrite prompts answer in
    pub response_language: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            no_answer: NO_ANSWER_MESSAGE.to_string(),
            exhausted: EXHAUSTED_MESSAGE.to_string(),
            response_language: "Vietnamese".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Characters per chunk
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks embedded per request
    pub batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 64,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Reject settings the machine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.top_k == 0 {
            return Err(ConfigError::Invalid("search.top_k must be at least 1".to_string()));
        }

        if self.search.filter_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "search.filter_concurrency must be at least 1".to_string(),
            ));
        }

        if self.limits.max_steps < LoopLimits::MIN_STEPS {
            return Err(ConfigError::Invalid(format!(
                "limits.max_steps must be at least {} so the relevance streak can end a request",
                LoopLimits::MIN_STEPS
            )));
        }

        if self.limits.classifier_attempts == 0 {
            return Err(ConfigError::Invalid(
                "limits.classifier_attempts must be at least 1".to_string(),
            ));
        }

        if self.ingest.chunk_size == 0 || self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }

        let urls = [
            ("llm.base_url", self.llm.base_url.as_deref()),
            ("embedding.base_url", self.embedding.base_url.as_deref()),
            ("qdrant.url", Some(self.qdrant.url.as_str())),
            ("vision.base_url", Some(self.vision.base_url.as_str())),
        ];
        for (field, url) in urls {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "{} must be an http(s) URL, got '{}'",
                        field, url
                    )));
                }
            }
        }

        Ok(())
    }

    /// Settings for every generation and classifier call.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            timeout: self.llm.timeout,
        }
    }

    pub fn loop_limits(&self) -> LoopLimits {
        LoopLimits {
            max_steps: self.limits.max_steps,
            max_regenerations: self.limits.max_regenerations,
            max_usefulness_rewrites: self.limits.max_usefulness_rewrites,
        }
    }

    /// A copy safe to print: configured API keys are masked.
    pub fn redacted(&self) -> Self {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "********".to_string());
        let mut config = self.clone();
        config.llm.api_key = mask(&self.llm.api_key);
        config.embedding.api_key = mask(&self.embedding.api_key);
        config.qdrant.api_key = mask(&self.qdrant.api_key);
        config.vision.api_key = mask(&self.vision.api_key);
        config
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
