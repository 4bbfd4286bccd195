//! # generate: seam for text-generation backends
//!
//! Documents produced by the pipeline are handed to a generator together with optional
//! keywords and a target language. Backends implement [`ContextGenerator`] and are looked up by
//! name through a [`GeneratorRegistry`]. No backend ships with the core.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{info, warn};

/// Language the generated text should be written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    Korean,
    English,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Korean => "Korean",
            Language::English => "English",
        }
    }
}

impl From<&str> for Language {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "korean" | "ko" | "kr" => Language::Korean,
            "english" | "en" => Language::English,
            other => {
                warn!(language = other, "Unknown language, defaulting to Korean");
                Language::Korean
            }
        }
    }
}

/// Everything a backend receives for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub repository_name: String,
    /// The serialized project document.
    pub context: String,
    /// Comma-separated topics the output should emphasise.
    pub keywords: Option<String>,
    pub language: Language,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("unsupported generation provider: {0}")]
    UnknownProvider(String),
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },
}

/// A text-generation backend.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Keyed factory of generation backends. Names are matched case-insensitively.
#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    providers: BTreeMap<String, Arc<dyn ContextGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<G>(&mut self, name: &str, generator: G) -> &mut Self
    where
        G: ContextGenerator + 'static,
    {
        self.providers
            .insert(name.to_lowercase(), Arc::new(generator));
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ContextGenerator>, GenerationError> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| GenerationError::UnknownProvider(name.to_string()))
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Run `request` against the provider registered under `provider`.
    pub async fn generate(
        &self,
        provider: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let generator = self.get(provider)?;
        info!(
            provider,
            repository = %request.repository_name,
            language = request.language.as_str(),
            "Generating text from project document"
        );
        generator.generate(request).await
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
