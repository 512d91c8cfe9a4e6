pub mod cleaner;
pub mod models;
pub mod prompt;
pub mod providers;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::LlmConfig;
use crate::llm::cleaner::clean_sql;
use crate::llm::models::{GenerationResult, GenerationSettings};
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::llm::providers::chat_completion::ChatCompletionProvider;
use crate::llm::providers::ollama::OllamaProvider;

/// Preference value that means "walk the fallback order".
pub const AUTO_PREFERENCE: &str = "auto";

pub const ALL_PROVIDERS_FAILED: &str = "All LLM providers failed";

/// System instruction sent alongside every prompt.
pub const SYSTEM_PROMPT: &str =
    "You are an expert SQL developer. Generate only valid DuckDB SQL queries without explanations or formatting.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    Connection(String),
    #[error("LLM response error: {0}")]
    Response(String),
    #[error("LLM configuration error: {0}")]
    Config(String),
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Raw completion text for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Completes `prompt` and cleans the output down to SQL. Never fails;
    /// problems are reported in the result.
    async fn generate(&self, prompt: &str) -> GenerationResult {
        match self.complete(prompt).await {
            Ok(raw) => {
                let sql = clean_sql(&raw);
                if sql.is_empty() {
                    warn!("{} returned no SQL", self.name());
                    GenerationResult::failure(Some(self.name()), Some(self.model()), "Provider returned no SQL")
                } else {
                    GenerationResult::success(sql, self.name(), self.model())
                }
            }
            Err(e) => {
                warn!("{} failed: {}", self.name(), e);
                GenerationResult::failure(Some(self.name()), Some(self.model()), e.to_string())
            }
        }
    }
}

/// Registry of configured providers plus the order they are tried in.
pub struct LlmManager {
    providers: HashMap<String, Box<dyn SqlGenerator>>,
    fallback_order: Vec<String>,
}

impl LlmManager {
    pub fn new(fallback_order: Vec<String>) -> Self {
        Self {
            providers: HashMap::new(),
            fallback_order: fallback_order.into_iter().map(|name| name.to_lowercase()).collect(),
        }
    }

    /// Registers every provider whose credentials are present. A missing key
    /// simply leaves that provider out.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let settings = GenerationSettings::from(config);
        let mut manager = Self::new(config.fallback_order.clone());

        if config.openai.api_key.is_some() {
            manager.add_provider(Box::new(ChatCompletionProvider::openai(&config.openai, settings)?));
        }
        if config.deepinfra.api_key.is_some() {
            manager.add_provider(Box::new(ChatCompletionProvider::deepinfra(&config.deepinfra, settings)?));
        }
        if config.anthropic.api_key.is_some() {
            manager.add_provider(Box::new(AnthropicProvider::new(&config.anthropic, settings)?));
        }
        if config.ollama.api_url.is_some() {
            manager.add_provider(Box::new(OllamaProvider::new(&config.ollama, settings)?));
        }

        if manager.providers.is_empty() {
            warn!("No LLM providers configured; SQL generation will fail until an API key is set");
        } else {
            info!("LLM providers available: {}", manager.available_providers().join(", "));
        }
        Ok(manager)
    }

    /// Providers not named in the fallback order are tried last.
    pub fn add_provider(&mut self, provider: Box<dyn SqlGenerator>) {
        let name = provider.name().to_lowercase();
        if !self.fallback_order.contains(&name) {
            self.fallback_order.push(name.clone());
        }
        self.providers.insert(name, provider);
    }

    /// Names of registered providers in fallback order.
    pub fn available_providers(&self) -> Vec<String> {
        self.fallback_order
            .iter()
            .filter(|name| self.providers.contains_key(*name))
            .cloned()
            .collect()
    }

    pub fn fallback_order(&self) -> &[String] {
        &self.fallback_order
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.providers.contains_key(&name.to_lowercase())
    }

    /// Generates SQL with the preferred provider, or with each available
    /// provider in fallback order until one succeeds. A named but unavailable
    /// preference falls back to the full order.
    pub async fn generate_sql(&self, prompt: &str, preference: &str) -> GenerationResult {
        let preference = preference.trim().to_lowercase();

        let candidates: Vec<&dyn SqlGenerator> = match self.providers.get(&preference) {
            Some(provider) if preference != AUTO_PREFERENCE => vec![provider.as_ref()],
            _ => self
                .fallback_order
                .iter()
                .filter_map(|name| self.providers.get(name))
                .map(|provider| provider.as_ref())
                .collect(),
        };

        if candidates.is_empty() {
            warn!("No LLM provider available for preference '{}'", preference);
            return GenerationResult::failure(
                None,
                None,
                format!("No LLM providers configured or available for preference '{preference}'"),
            );
        }

        for provider in candidates {
            info!("Generating SQL with {} ({})", provider.name(), provider.model());
            let result = provider.generate(prompt).await;
            if result.success {
                return result;
            }
        }

        error!("{}", ALL_PROVIDERS_FAILED);
        GenerationResult::failure(None, None, ALL_PROVIDERS_FAILED)
    }

    /// Sends `prompt` to every available provider independently.
    pub async fn test_providers(&self, prompt: &str) -> Vec<(String, GenerationResult)> {
        let mut results = Vec::new();
        for name in self.available_providers() {
            if let Some(provider) = self.providers.get(&name) {
                results.push((name, provider.generate(prompt).await));
            }
        }
        results
    }
}
