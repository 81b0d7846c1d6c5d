//! Vector search client for the external index at `VECTOR_URL` /
//! `VECTOR_COLLECTION` (§4.5 step 8), grounded on `HttpEmbedder`'s own
//! reqwest-based wrapper for the sibling `EMBED_ENDPOINT` call -- both talk
//! to small JSON HTTP services fronting the actual vector store.

use async_trait::async_trait;
use pipeline_core::errors::GraphError;
use pipeline_core::traits::VectorIndex;
use reqwest::Client;
use serde::Deserialize;

pub struct HttpVectorIndex {
    client: Client,
    base_url: String,
    collection: String,
}

impl HttpVectorIndex {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into(), collection: collection.into() }
    }

    fn points_url(&self) -> String {
        format!("{}/collections/{}/points", self.base_url.trim_end_matches('/'), self.collection)
    }

    fn search_url(&self) -> String {
        format!("{}/collections/{}/points/search", self.base_url.trim_end_matches('/'), self.collection)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: String,
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: serde_json::Value) -> Result<(), GraphError> {
        let response = self
            .client
            .put(self.points_url())
            .json(&serde_json::json!({"points": [{"id": id, "vector": vector, "payload": payload}]}))
            .send()
            .await
            .map_err(|e| GraphError::PublicationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GraphError::PublicationFailed(format!("vector index upsert returned {}", response.status())));
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<String>, GraphError> {
        let response = self
            .client
            .post(self.search_url())
            .json(&serde_json::json!({"vector": vector, "limit": k}))
            .send()
            .await
            .map_err(|e| GraphError::PublicationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GraphError::PublicationFailed(format!("vector index search returned {}", response.status())));
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| GraphError::PublicationFailed(format!("failed to parse vector index response: {e}")))?;
        Ok(parsed.result.into_iter().map(|hit| hit.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_parses_hit_ids_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/documents/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": [{"id": "doc-1"}, {"id": "doc-2"}]})))
            .mount(&server)
            .await;

        let index = HttpVectorIndex::new(server.uri(), "documents");
        let hits = index.search(&[0.1, 0.2], 2).await.unwrap();
        assert_eq!(hits, vec!["doc-1".to_string(), "doc-2".to_string()]);
    }

    #[tokio::test]
    async fn upsert_sends_point_to_collection_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/documents/points"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let index = HttpVectorIndex::new(server.uri(), "documents");
        index.upsert("doc-1", vec![0.1, 0.2], serde_json::json!({"label": "doc"})).await.unwrap();
    }
}
