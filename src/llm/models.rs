use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

/// Outcome of one generation attempt, or of a whole fallback run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub sql: String,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn success(sql: String, provider: &str, model: &str) -> Self {
        Self {
            success: true,
            sql,
            model: Some(model.to_string()),
            provider: Some(provider.to_string()),
            error: None,
        }
    }

    pub fn failure(provider: Option<&str>, model: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            sql: String::new(),
            model: model.map(str::to_string),
            provider: provider.map(str::to_string),
            error: Some(error.into()),
        }
    }
}

// Sampling and transport settings shared by every provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}
