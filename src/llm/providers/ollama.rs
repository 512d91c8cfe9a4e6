use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::llm::models::GenerationSettings;
use crate::llm::providers::{http_client, status_error};
use crate::llm::{LlmError, SYSTEM_PROMPT, SqlGenerator};

pub const OLLAMA_URL: &str = "http://localhost:11434/api/generate";
pub const OLLAMA_MODEL: &str = "sqlcoder";

/// Self-hosted models behind Ollama's generate endpoint. No key is needed;
/// the provider is only registered when an endpoint is configured.
pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
    settings: GenerationSettings,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig, settings: GenerationSettings) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(&settings)?,
            api_url: config.api_url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            model: config.model.clone().unwrap_or_else(|| OLLAMA_MODEL.to_string()),
            settings,
        })
    }
}

#[async_trait]
impl SqlGenerator for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let request = OllamaRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens,
            },
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error("Ollama", response).await);
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to read response body: {}", e)))?;

        let parsed: OllamaResponse = serde_json::from_str(&response_text).map_err(|e| {
            LlmError::Response(format!("Failed to parse Ollama response: {} - body: {}", e, response_text))
        })?;

        debug!("Ollama response: {}", parsed.response);
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::test_support::spawn_mock;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    fn provider(base_url: &str) -> OllamaProvider {
        let config = ProviderConfig {
            api_key: None,
            api_url: Some(format!("{base_url}/api/generate")),
            model: Some("duckdb-nsql".to_string()),
        };
        OllamaProvider::new(&config, GenerationSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_generate_disables_streaming() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], false);
                assert_eq!(body["model"], "duckdb-nsql");
                assert_eq!(body["options"]["num_predict"], 500);
                Json(json!({"model": "duckdb-nsql", "response": "SELECT AVG(age) FROM data;\n```", "done": true}))
            }),
        );
        let base_url = spawn_mock(router).await;

        let result = provider(&base_url).generate("average age").await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.sql, "SELECT AVG(age) FROM data;");
        assert_eq!(result.provider.as_deref(), Some("ollama"));
    }

    #[tokio::test]
    async fn test_missing_model_is_reported() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::NOT_FOUND, r#"{"error":"model 'duckdb-nsql' not found"}"#) }),
        );
        let base_url = spawn_mock(router).await;

        let err = provider(&base_url).complete("q").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
