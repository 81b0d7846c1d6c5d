//! Configuration for the OpenAI-compatible chat-completions connector.
//!
//! Also backs the `openai_compatible` `LLM_TYPE` (§4.4): any server speaking
//! the OpenAI chat-completions wire format just needs a different `api_base`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            max_tokens: Some(4096),
            temperature: Some(0.1),
            timeout_ms: 30_000,
            max_retries: 3,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at an `openai_compatible` endpoint (e.g. a self-hosted gateway).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::new("")
    }
}
