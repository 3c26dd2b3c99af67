//! Provider lookup by the configured `llm.provider` name.
//!
//! Adding a backend means registering a factory, not editing an enum.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{LlmProvider, ProviderError};
use crate::config::LlmSettings;

/// Builds an [`LlmProvider`] from the `llm` configuration section.
pub trait ProviderFactory: Send + Sync {
    /// Name matched against `llm.provider`, e.g. "openai".
    fn provider_type(&self) -> &'static str;

    fn create(&self, settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, ProviderError>;
}

/// Known provider factories, keyed by type name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider_type(), factory);
    }

    /// Build the provider named by `settings.provider`.
    pub fn create(&self, settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.factories.get(settings.provider.as_str()).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown LLM provider '{}'; registered: {}",
                settings.provider,
                self.provider_types().join(", ")
            ))
        })?;

        tracing::info!(provider = %settings.provider, model = %settings.model, "Creating LLM provider");
        factory.create(settings)
    }

    pub fn provider_types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Registry with every provider compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    struct ScriptedFactory;

    impl ProviderFactory for ScriptedFactory {
        fn provider_type(&self) -> &'static str {
            "scripted"
        }

        fn create(&self, _settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            Ok(Arc::new(ScriptedProvider::new()))
        }
    }

    fn settings(provider: &str) -> LlmSettings {
        LlmSettings {
            provider: provider.to_string(),
            ..LlmSettings::default()
        }
    }

    #[test]
    fn test_create_by_configured_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedFactory));

        let provider = registry.create(&settings("scripted")).unwrap();
        assert_eq!(provider.name(), "scripted");
    }

    #[test]
    fn test_unknown_provider_lists_registered() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedFactory));

        match registry.create(&settings("anthropic")) {
            Err(ProviderError::NotConfigured(message)) => {
                assert!(message.contains("'anthropic'"));
                assert!(message.contains("scripted"));
            }
            other => panic!("expected NotConfigured, got {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_defaults_include_openai() {
        assert_eq!(ProviderRegistry::with_defaults().provider_types(), vec!["openai"]);
    }
}
