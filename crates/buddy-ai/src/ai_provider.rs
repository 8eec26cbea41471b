use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::budget::{TokenBudget, DEFAULT_MAX_TOKENS};
use crate::providers::{ollama::OllamaProvider, openai::OpenAiProvider};

/// Prompt every classifier session is created with
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI content moderator. Analyze content for:\n\
    1. Harmful content\n\
    2. Cyberbullying\n\
    3. Inappropriate language\n\
    4. Personal information exposure\n\
    Respond with small analysis including type and risk level.";

/// Factory for stateful classifier sessions
#[async_trait]
pub trait ClassifierProvider: Send + Sync {
    /// Open a new session primed with `system_prompt`
    async fn create(&self, system_prompt: &str) -> Result<Box<dyn ClassifierSession>>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Check if the provider is reachable
    async fn is_available(&self) -> bool {
        true
    }
}

/// A conversation with a token budget. Every prompt consumes budget until
/// the session is destroyed and a new one is created.
#[async_trait]
pub trait ClassifierSession: Send + Sync {
    /// Classify `text` and return the raw model response
    async fn classify(&mut self, text: &str) -> Result<String>;

    /// Current token accounting for this session
    fn budget(&self) -> TokenBudget;

    /// Release the session. The handle must not be used afterwards.
    async fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Which backend serves classification requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama daemon
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint
    OpenAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// Classifier backend settings, the `[classifier]` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Context window per session. Unset means [`DEFAULT_MAX_TOKENS`].
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
    pub system_prompt: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: None,
            base_url: None,
            api_key: None,
            max_tokens: None,
            request_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn effective_model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, ProviderKind::Ollama) => "llama3.2",
            (None, ProviderKind::OpenAi) => "gpt-4o-mini",
        }
    }

    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, ProviderKind::Ollama) => "http://localhost:11434",
            (None, ProviderKind::OpenAi) => "https://api.openai.com/v1",
        }
    }

    /// API key from the config file, falling back to `OPENAI_API_KEY`
    #[must_use]
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    #[must_use]
    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    #[must_use]
    pub fn effective_system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

/// Create a provider instance based on configuration
///
/// # Errors
///
/// Returns an error if the API key is missing for providers that require one,
/// or if the HTTP client cannot be built.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn ClassifierProvider>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let model = config.effective_model();
    let base_url = config.effective_base_url();
    let max_tokens = config.effective_max_tokens();

    log::debug!(
        "Creating {} classifier provider (model: {model}, base url: {base_url})",
        config.provider
    );

    match config.provider {
        ProviderKind::Ollama => Ok(Box::new(OllamaProvider::new(
            client,
            Some(base_url),
            model,
            max_tokens,
        ))),
        ProviderKind::OpenAi => {
            let api_key = config
                .effective_api_key()
                .context("API Key required for OpenAI")?;
            Ok(Box::new(OpenAiProvider::new(
                client,
                &api_key,
                model,
                Some(base_url),
                max_tokens,
            )))
        }
    }
}
