//! Optional text generation for answer synthesis
//!
//! Backends are tried in configured order and the first one that
//! initializes is kept for the lifetime of the answerer. When none
//! initializes the answerer is unavailable and callers use their extractive
//! fallback instead.

mod ollama;
mod openai;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiCompatibleGenerator;

use crate::config::{LlmConfig, BACKEND_OLLAMA, BACKEND_OPENAI};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Backend initialization failed: {0}")]
    Initialization(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Backend returned an empty response")]
    EmptyResponse,

    #[error("No generation backend is available")]
    Unavailable,
}

/// A text generation backend
pub trait TextGenerator: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

type Constructor = Box<dyn FnOnce() -> Result<Box<dyn TextGenerator>, GenerationError>>;

/// A named, not yet constructed backend
pub struct BackendCandidate {
    pub name: String,
    constructor: Constructor,
}

impl BackendCandidate {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn TextGenerator>, GenerationError> + 'static,
    {
        Self {
            name: name.into(),
            constructor: Box::new(constructor),
        }
    }
}

/// Sampling and transport settings shared by the HTTP backends
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl From<&LlmConfig> for GenerationOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Ordered candidates for the configured backends
///
/// Disabled configuration yields no candidates; unknown names are skipped.
pub fn candidates_from_config(config: &LlmConfig) -> Vec<BackendCandidate> {
    if !config.enabled {
        return Vec::new();
    }

    let options = GenerationOptions::from(config);
    let mut candidates = Vec::new();

    for name in &config.backends {
        match name.as_str() {
            BACKEND_OLLAMA => {
                let ollama = config.ollama.clone();
                candidates.push(BackendCandidate::new(BACKEND_OLLAMA, move || {
                    let generator = OllamaGenerator::connect(&ollama.url, &ollama.model, options)?;
                    Ok(Box::new(generator) as Box<dyn TextGenerator>)
                }));
            }
            BACKEND_OPENAI => {
                let openai = config.openai.clone();
                candidates.push(BackendCandidate::new(BACKEND_OPENAI, move || {
                    let generator = OpenAiCompatibleGenerator::from_env(
                        &openai.base_url,
                        &openai.model,
                        &openai.api_key_env,
                        options,
                    )?;
                    Ok(Box::new(generator) as Box<dyn TextGenerator>)
                }));
            }
            other => {
                tracing::warn!("Unknown generation backend '{}', skipping", other);
            }
        }
    }

    candidates
}

/// The selected generation backend, if any
pub struct GenerativeAnswerer {
    backend: Option<Box<dyn TextGenerator>>,
}

impl GenerativeAnswerer {
    /// Construct candidates in order and keep the first that succeeds
    pub fn select(candidates: Vec<BackendCandidate>) -> Self {
        for candidate in candidates {
            match (candidate.constructor)() {
                Ok(backend) => {
                    tracing::info!("Using {} for answer generation", candidate.name);
                    return Self {
                        backend: Some(backend),
                    };
                }
                Err(e) => {
                    tracing::warn!("{} not available: {}", candidate.name, e);
                }
            }
        }

        tracing::warn!("No LLM available. Answers will be extracted from documents.");
        Self::unavailable()
    }

    /// Select from the configured backends
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::select(candidates_from_config(config))
    }

    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Box<dyn TextGenerator>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|backend| backend.name())
    }

    /// Generate once with the selected backend
    ///
    /// Returns the trimmed output; whitespace-only output is an error.
    pub fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let backend = self.backend.as_deref().ok_or(GenerationError::Unavailable)?;

        let output = backend.generate(prompt)?;
        let output = output.trim();
        if output.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(output.to_string())
    }
}
