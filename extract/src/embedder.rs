//! Embedding client for the external embedding service at `EMBED_ENDPOINT`
//! (§4.5 step 7), grounded on the original vector-search wrapper's `_embed`
//! call to a Jina-compatible HTTP endpoint.

use async_trait::async_trait;
use pipeline_core::errors::LlmError;
use reqwest::Client;
use serde::Deserialize;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: Client::new(), endpoint: endpoint.into() }
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ApiError(format!("embedding endpoint returned {}", response.status())));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| LlmError::ResponseParseError(e.to_string()))?;
        Ok(parsed.embedding)
    }
}
