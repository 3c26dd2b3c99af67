//! API keys for the generation, embedding, vision and Qdrant backends.
//!
//! Keys are held in [`SecretString`], print as `[REDACTED]`, and are zeroed
//! on drop. [`ApiCredential::expose`] is called only where a request header
//! is built.
//!
//! ```ignore
//! let key = ApiCredential::resolve(settings.api_key.as_deref(), OPENAI_API_KEY_ENV, "OpenAI API key")?;
//! request.bearer_auth(key.expose());
//! ```

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use super::ProviderError;

/// Where a key came from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The YAML configuration
    Config,
    /// An environment variable
    Environment,
    /// Passed in code
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "programmatic",
        })
    }
}

pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// A non-empty configured value wins; otherwise read `env_var`.
    pub fn resolve(
        configured: Option<&str>,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = configured.filter(|v| !v.is_empty()) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        match std::env::var(env_var) {
            Ok(value) if !value.is_empty() => {
                Ok(Self::new(value, CredentialSource::Environment, name))
            }
            _ => Err(ProviderError::NotConfigured(format!(
                "{} missing: set it in the config file or the {} environment variable",
                name, env_var
            ))),
        }
    }

    /// Like [`resolve`](Self::resolve), for backends that accept anonymous access.
    pub fn resolve_optional(
        configured: Option<&str>,
        env_var: &str,
        name: &'static str,
    ) -> Option<Self> {
        Self::resolve(configured, env_var, name).ok()
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [REDACTED]", self.name, self.source)
    }
}
