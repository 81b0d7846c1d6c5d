//! Chat-completions connector for the `openai` and `openai_compatible`
//! `LLM_TYPE` variants (§4.4) — same wire format, different `api_base`.

use async_trait::async_trait;
use pipeline_core::prelude::*;
use reqwest::Client;
use std::time::Instant;
use tracing::{debug, info};

mod config;
mod models;

pub use config::OpenAiConfig;
use models::*;

pub struct OpenAiConnector {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiConnector {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn chat(&self, messages: Vec<OpenAiMessage>, max_tokens: u32) -> Result<String, LlmError> {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(max_tokens),
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
            return Err(LlmError::ApiError(format!("{status}: {body}")));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::ResponseParseError(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::ResponseParseError("response had no message content".to_string()))?;

        let latency = start.elapsed();
        if let Some(usage) = parsed.usage {
            info!(
                model = %self.config.model,
                latency_ms = latency.as_millis() as u64,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "openai chat completion finished"
            );
        } else {
            debug!(model = %self.config.model, latency_ms = latency.as_millis() as u64, "openai chat completion finished");
        }

        Ok(content)
    }
}

#[async_trait]
impl LlmConnector for OpenAiConnector {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let messages = vec![OpenAiMessage { role: "user".to_string(), content: prompt.to_string() }];
        self.chat(messages, max_tokens).await
    }

    /// Overridden: the backend already speaks a native chat-message array,
    /// so the `<System>/<User>/<Assistant>` tag framing used for local
    /// back-ends would just be wasted tokens here.
    async fn complete_chat(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String, LlmError> {
        let converted = messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();
        self.chat(converted, max_tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(api_base: String) -> OpenAiConnector {
        OpenAiConnector::new(OpenAiConfig::new("test-key").with_api_base(api_base)).unwrap()
    }

    #[tokio::test]
    async fn generate_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello from the model"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 4}
            })))
            .mount(&server)
            .await;

        let connector = connector(server.uri());
        let output = connector.generate("say hi", 32).await.unwrap();
        assert_eq!(output, "hello from the model");
    }

    #[tokio::test]
    async fn complete_chat_sends_native_message_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{}"}}]
            })))
            .mount(&server)
            .await;

        let connector = connector(server.uri());
        let messages = vec![ChatMessage::system("extract entities"), ChatMessage::user("Alice works at Acme")];
        let output = connector.complete_chat(&messages, 64).await.unwrap();
        assert_eq!(output, "{}");
    }

    #[tokio::test]
    async fn non_success_status_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let connector = connector(server.uri());
        let err = connector.generate("x", 8).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError(_)));
    }
}
