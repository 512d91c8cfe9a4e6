pub mod anthropic;
pub mod chat_completion;
pub mod ollama;

use crate::llm::LlmError;
use crate::llm::models::GenerationSettings;

pub(crate) fn http_client(settings: &GenerationSettings) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(|e| LlmError::Config(e.to_string()))
}

/// Turns a non-2xx response into a `Response` error that carries the body,
/// which is where providers put the useful part (bad key, unknown model).
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) if !body.is_empty() => format!(" - Response body: {}", body),
        _ => String::new(),
    };

    tracing::error!("{} API responded with status code: {}{}", provider, status, body);
    LlmError::Response(format!("{} API responded with status code: {}{}", provider, status, body))
}
