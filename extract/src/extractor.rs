//! The Extractor (§4.5): chunk → per-chunk LLM call → `smart_union` merge →
//! schema validation (demote on failure) → vector embedding → OSA pin →
//! local persistence → graph-update stream event.

use crate::chunking::{chunk_document, ChunkConfig};
use crate::classifier::classify;
use crate::embedder::Embedder;
use crate::merge::smart_union;
use crate::templates::TemplateStore;
use crate::validate::validate;
use pipeline_core::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Intermediate, partially-typed view of one chunk's (or the merged) LLM
/// output -- everything `ProcessedDocument` carries except the fields the
/// extractor itself is responsible for (`document_id`, `text_content`,
/// `metadata_cid`, `similar_docs`, `error`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub document_type: Option<DocumentClass>,
    #[serde(default)]
    pub project: Option<ProjectBlock>,
    #[serde(default)]
    pub patent: Option<PatentBlock>,
    #[serde(default)]
    pub research: Option<ResearchBlock>,
    #[serde(default)]
    pub locations: Vec<LocationRef>,
    #[serde(default)]
    pub entities: EntityBlock,
    #[serde(default)]
    pub relationships: Vec<RelationshipRef>,
    #[serde(default)]
    pub funding: FundingBlock,
    #[serde(default)]
    pub contact_info: ContactBlock,
    #[serde(default)]
    pub dates: Vec<DateRef>,
}

pub struct Extractor {
    llm: Arc<dyn LlmConnector>,
    templates: TemplateStore,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    object_store: Arc<dyn ObjectStore>,
    coordination: Arc<dyn CoordinationStore>,
    local_root: PathBuf,
    chunk_config: ChunkConfig,
    graph_update_stream_key: String,
    digest_table_key: String,
    max_tokens: u32,
}

impl Extractor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmConnector>,
        templates: TemplateStore,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        object_store: Arc<dyn ObjectStore>,
        coordination: Arc<dyn CoordinationStore>,
        local_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            templates,
            vector_index,
            embedder,
            object_store,
            coordination,
            local_root: local_root.into(),
            chunk_config: ChunkConfig::default(),
            graph_update_stream_key: "graph:updates".to_string(),
            digest_table_key: "extract:digests".to_string(),
            max_tokens: 2048,
        }
    }

    fn content_digest(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn title_of(fields: &ExtractedFields) -> Option<String> {
        fields
            .project
            .as_ref()
            .and_then(|p| p.name.clone())
            .or_else(|| fields.patent.as_ref().and_then(|p| p.title.clone()))
            .or_else(|| fields.research.as_ref().and_then(|r| r.title.clone()))
    }

    fn strip_code_fences(raw: &str) -> &str {
        raw.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```").trim()
    }

    pub async fn process(&self, document_id: &str, text: &str) -> Result<ProcessedDocument, ExtractError> {
        if text.trim().is_empty() {
            return Ok(ProcessedDocument::demoted(document_id, text, "empty document body"));
        }

        let digest = Self::content_digest(text);
        if let Some(cached) = self.coordination.hash_get(&self.digest_table_key, &digest).await.map_err(|e| {
            ExtractError::Llm(LlmError::InternalError(e.to_string()))
        })? {
            if let Ok(doc) = serde_json::from_value::<ProcessedDocument>(cached) {
                debug!(document_id, digest = %digest, "skipping already-processed document");
                return Ok(doc);
            }
        }

        let class_hint = classify(text);
        let chunks = chunk_document(text, self.chunk_config);

        let mut parsed_chunks = Vec::new();
        let mut parse_errors = Vec::new();
        for chunk in &chunks {
            let prompt = self.templates.render(class_hint, chunk).await;
            let raw = self.llm.generate(&prompt, self.max_tokens).await?;
            let cleaned = Self::strip_code_fences(&raw);
            match serde_json::from_str::<serde_json::Value>(cleaned) {
                Ok(value) => parsed_chunks.push(value),
                Err(err) => {
                    warn!(document_id, error = %err, "chunk failed strict JSON parse");
                    parse_errors.push(format!("parse error: {err}; raw: {cleaned}"));
                }
            }
        }

        if parsed_chunks.is_empty() {
            let error = parse_errors.join("; ");
            return Ok(ProcessedDocument::demoted(document_id, text, error));
        }

        let merged_value = smart_union(&parsed_chunks);
        let fields: ExtractedFields = match serde_json::from_value(merged_value) {
            Ok(fields) => fields,
            Err(err) => return Ok(ProcessedDocument::demoted(document_id, text, format!("schema deserialization failed: {err}"))),
        };

        let (document_type, fields) = match validate(fields) {
            Ok(result) => result,
            Err(err) => return Ok(ProcessedDocument::demoted(document_id, text, err)),
        };

        let mut processed = ProcessedDocument {
            document_id: document_id.to_string(),
            document_type,
            project: fields.project,
            patent: fields.patent,
            research: fields.research,
            locations: fields.locations,
            entities: fields.entities,
            relationships: fields.relationships,
            funding: fields.funding,
            contact_info: fields.contact_info,
            dates: fields.dates,
            text_content: text.to_string(),
            metadata_cid: None,
            similar_docs: Vec::new(),
            error: if parse_errors.is_empty() { None } else { Some(parse_errors.join("; ")) },
        };

        self.pin_and_embed(&mut processed).await?;
        self.persist_locally(&processed).await?;
        self.publish_graph_update(&processed).await?;

        let snapshot = serde_json::to_value(&processed).map_err(|e| ExtractError::ValidationFailed(e.to_string()))?;
        self.coordination
            .hash_set(&self.digest_table_key, &digest, snapshot)
            .await
            .map_err(|e| ExtractError::Llm(LlmError::InternalError(e.to_string())))?;

        info!(document_id, document_type = ?processed.document_type, "document processed");
        Ok(processed)
    }

    async fn pin_and_embed(&self, processed: &mut ProcessedDocument) -> Result<(), ExtractError> {
        let bytes = serde_json::to_vec(processed).map_err(|e| ExtractError::ValidationFailed(e.to_string()))?;
        let cid = self.object_store.put(&bytes).await.map_err(|e| ExtractError::Llm(LlmError::InternalError(e.to_string())))?;
        self.object_store
            .pin(&cid, serde_json::json!({"document_id": processed.document_id}))
            .await
            .map_err(|e| ExtractError::Llm(LlmError::InternalError(e.to_string())))?;
        processed.metadata_cid = Some(cid.clone());

        let title = Self::title_of(&ExtractedFields {
            document_type: Some(processed.document_type),
            project: processed.project.clone(),
            patent: processed.patent.clone(),
            research: processed.research.clone(),
            ..Default::default()
        })
        .unwrap_or_default();

        let vector_key = cid;
        let vector = self.embedder.embed(&processed.text_content).await?;
        self.vector_index
            .upsert(&vector_key, vector.clone(), serde_json::json!({"document_type": processed.document_type, "title": title}))
            .await
            .map_err(|e| ExtractError::ValidationFailed(e.to_string()))?;

        let neighbours = self.vector_index.search(&vector, 6).await.map_err(|e| ExtractError::ValidationFailed(e.to_string()))?;
        processed.similar_docs = neighbours.into_iter().filter(|id| id != &vector_key).take(5).collect();

        Ok(())
    }

    async fn persist_locally(&self, processed: &ProcessedDocument) -> Result<(), ExtractError> {
        tokio::fs::create_dir_all(self.local_root.join("processed"))
            .await
            .map_err(|e| ExtractError::ValidationFailed(e.to_string()))?;
        let path = self.local_root.join("processed").join(format!("{}.json", processed.document_id));
        let bytes = serde_json::to_vec_pretty(processed).map_err(|e| ExtractError::ValidationFailed(e.to_string()))?;
        tokio::fs::write(&path, bytes).await.map_err(|e| ExtractError::ValidationFailed(e.to_string()))
    }

    async fn publish_graph_update(&self, processed: &ProcessedDocument) -> Result<(), ExtractError> {
        let path = format!("processed/{}.json", processed.document_id);
        let payload = serde_json::json!({"path": path, "data": processed});
        self.coordination
            .stream_append(&self.graph_update_stream_key, payload)
            .await
            .map(|_| ())
            .map_err(|e| ExtractError::Llm(LlmError::InternalError(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;
    use pipeline_adapter_object_store::LocalObjectStore;

    struct StubLlm {
        response: String,
    }

    #[async_trait]
    impl LlmConnector for StubLlm {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
            Ok(self.response.clone())
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct StubVectorIndex;

    #[async_trait]
    impl VectorIndex for StubVectorIndex {
        async fn upsert(&self, _id: &str, _vector: Vec<f32>, _payload: serde_json::Value) -> Result<(), GraphError> {
            Ok(())
        }
        async fn search(&self, _vector: &[f32], _k: usize) -> Result<Vec<String>, GraphError> {
            Ok(Vec::new())
        }
    }

    async fn extractor(dir: &std::path::Path, llm_response: &str) -> Extractor {
        let object_store = Arc::new(LocalObjectStore::new(dir.join("objects")).await.unwrap());
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let templates = TemplateStore::new(dir.join("templates"), false);
        Extractor::new(
            Arc::new(StubLlm { response: llm_response.to_string() }),
            templates,
            Arc::new(StubVectorIndex),
            Arc::new(StubEmbedder),
            object_store,
            coordination,
            dir,
        )
    }

    #[tokio::test]
    async fn processes_a_well_formed_project_document() {
        let dir = tempfile::tempdir().unwrap();
        let response = r#"{"document_type": "project", "project": {"name": "Bay Bridge Widening", "status": "active"}}"#;
        let extractor = extractor(dir.path(), response).await;

        let doc = extractor.process("doc-1", "Project schedule and budget details follow.").await.unwrap();
        assert_eq!(doc.document_type, DocumentClass::Project);
        assert_eq!(doc.project.unwrap().name.as_deref(), Some("Bay Bridge Widening"));
        assert!(doc.metadata_cid.is_some());
        assert!(tokio::fs::metadata(dir.path().join("processed/doc-1.json")).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_json_demotes_to_other() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = extractor(dir.path(), "not json at all").await;

        let doc = extractor.process("doc-2", "some arbitrary document text").await.unwrap();
        assert_eq!(doc.document_type, DocumentClass::Other);
        assert!(doc.error.is_some());
    }

    #[tokio::test]
    async fn empty_text_demotes_without_calling_llm() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = extractor(dir.path(), "{}").await;

        let doc = extractor.process("doc-3", "   ").await.unwrap();
        assert_eq!(doc.document_type, DocumentClass::Other);
    }

    #[tokio::test]
    async fn reprocessing_identical_text_returns_cached_result() {
        let dir = tempfile::tempdir().unwrap();
        let response = r#"{"document_type": "research", "research": {"title": "Sea Level Rise Study"}}"#;
        let extractor = extractor(dir.path(), response).await;

        let first = extractor.process("doc-4", "Abstract: a novel methodology is presented.").await.unwrap();
        let second = extractor.process("doc-4", "Abstract: a novel methodology is presented.").await.unwrap();
        assert_eq!(first.metadata_cid, second.metadata_cid);
    }
}
