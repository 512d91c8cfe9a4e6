use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::llm::models::GenerationSettings;
use crate::llm::providers::{http_client, status_error};
use crate::llm::{LlmError, SYSTEM_PROMPT, SqlGenerator};

pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_MODEL: &str = "gpt-4";
pub const DEEPINFRA_URL: &str = "https://api.deepinfra.com/v1/openai/chat/completions";
pub const DEEPINFRA_MODEL: &str = "meta-llama/Meta-Llama-3-70B-Instruct";

/// Any endpoint speaking the OpenAI chat-completions protocol with bearer auth.
pub struct ChatCompletionProvider {
    name: String,
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    settings: GenerationSettings,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionProvider {
    pub fn new(
        name: &str,
        api_url: String,
        api_key: String,
        model: String,
        settings: GenerationSettings,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            name: name.to_string(),
            client: http_client(&settings)?,
            api_url,
            api_key,
            model,
            settings,
        })
    }

    pub fn openai(config: &ProviderConfig, settings: GenerationSettings) -> Result<Self, LlmError> {
        Self::from_provider_config("openai", config, OPENAI_URL, OPENAI_MODEL, settings)
    }

    pub fn deepinfra(config: &ProviderConfig, settings: GenerationSettings) -> Result<Self, LlmError> {
        Self::from_provider_config("deepinfra", config, DEEPINFRA_URL, DEEPINFRA_MODEL, settings)
    }

    fn from_provider_config(
        name: &str,
        config: &ProviderConfig,
        default_url: &str,
        default_model: &str,
        settings: GenerationSettings,
    ) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Config(format!("API key is required for the {name} provider")))?;

        Self::new(
            name,
            config.api_url.clone().unwrap_or_else(|| default_url.to_string()),
            api_key,
            config.model.clone().unwrap_or_else(|| default_model.to_string()),
            settings,
        )
    }
}

#[async_trait]
impl SqlGenerator for ChatCompletionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = PromptRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        tracing::debug!("Sending chat completion request to {} ({})", self.name, self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(&self.name, response).await);
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))?;

        prompt_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Response("No choices in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::test_support::spawn_mock;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    fn provider(base_url: &str) -> ChatCompletionProvider {
        ChatCompletionProvider::new(
            "openai",
            format!("{base_url}/v1/chat/completions"),
            "sk-test".to_string(),
            "gpt-test".to_string(),
            GenerationSettings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_completion_sends_bearer_and_cleans_reply() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], "gpt-test");
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["messages"][1]["content"], "how many rows?");
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "```sql\nSELECT COUNT(*) FROM data;\n```"}}]
                }))
            }),
        );
        let base_url = spawn_mock(router).await;

        let result = provider(&base_url).generate("how many rows?").await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.sql, "SELECT COUNT(*) FROM data;");
        assert_eq!(result.provider.as_deref(), Some("openai"));
        assert_eq!(result.model.as_deref(), Some("gpt-test"));
    }

    #[tokio::test]
    async fn test_error_status_includes_body() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
        );
        let base_url = spawn_mock(router).await;

        let err = provider(&base_url).complete("q").await.unwrap_err();

        assert!(matches!(err, LlmError::Response(_)));
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base_url = spawn_mock(router).await;

        let result = provider(&base_url).generate("q").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("No choices"));
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let config = ProviderConfig {
            api_key: Some("key".to_string()),
            ..ProviderConfig::default()
        };
        let deepinfra = ChatCompletionProvider::deepinfra(&config, GenerationSettings::default()).unwrap();
        assert_eq!(deepinfra.api_url, DEEPINFRA_URL);
        assert_eq!(deepinfra.model(), DEEPINFRA_MODEL);

        let missing = ChatCompletionProvider::openai(&ProviderConfig::default(), GenerationSettings::default());
        assert!(matches!(missing, Err(LlmError::Config(_))));
    }
}
