//! The Graph Writer Service (§4.6): single consumer of the graph-update
//! stream, turning a processed document into nodes and edges and publishing
//! a refreshed snapshot.

use crate::edge_mapping::EdgeMapper;
use crate::locality;
use md5::{Digest as Md5Digest, Md5};
use pipeline_core::errors::CoreError;
use pipeline_core::prelude::*;
use pipeline_core::types::ProcessedDocument;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const GRAPH_UPDATE_STREAM_KEY: &str = "graph:updates";
const CONSUMER_GROUP: &str = "graph_writers";

/// `{path, data: processed}`, matching the payload the Extractor appends to
/// the graph-update stream (§4.5 step 10).
#[derive(Debug, Deserialize)]
struct GraphUpdateEvent {
    path: String,
    data: ProcessedDocument,
}

pub struct GraphWriter {
    graph: Arc<dyn GraphStore>,
    object_store: Arc<dyn ObjectStore>,
    coordination: Arc<dyn CoordinationStore>,
    edge_mapper: EdgeMapper,
    consumer_name: String,
    graph_ipns_key: String,
    batch_size: usize,
    block_timeout: Duration,
}

impl GraphWriter {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        object_store: Arc<dyn ObjectStore>,
        coordination: Arc<dyn CoordinationStore>,
        edge_mapper: EdgeMapper,
        consumer_name: impl Into<String>,
        graph_ipns_key: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            object_store,
            coordination,
            edge_mapper,
            consumer_name: consumer_name.into(),
            graph_ipns_key: graph_ipns_key.into(),
            batch_size: 16,
            block_timeout: Duration::from_secs(5),
        }
    }

    /// Reads one batch from the stream and processes each message,
    /// acknowledging only those that succeed. Returns the number
    /// acknowledged.
    pub async fn run_once(&self) -> Result<usize, CoordinationError> {
        let entries = self
            .coordination
            .stream_read_group(
                GRAPH_UPDATE_STREAM_KEY,
                CONSUMER_GROUP,
                &self.consumer_name,
                self.batch_size,
                self.block_timeout,
            )
            .await?;

        let mut acked = 0;
        for entry in entries {
            match self.process_entry(&entry.payload).await {
                Ok(()) => {
                    self.coordination.stream_ack(GRAPH_UPDATE_STREAM_KEY, CONSUMER_GROUP, &entry.id).await?;
                    acked += 1;
                }
                Err(e) => {
                    // Never acknowledged: the message stays pending so another
                    // consumer instance can retry it (§4.6, §7).
                    error!(error = %e, entry_id = %entry.id, "graph writer failed to process event, leaving unacknowledged");
                }
            }
        }
        Ok(acked)
    }

    /// Loops `run_once` until `cancel` fires, sleeping `block_timeout`
    /// between empty batches.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("graph writer received shutdown signal");
                    return;
                }
                result = self.run_once() => {
                    match result {
                        Ok(0) => tokio::time::sleep(self.block_timeout).await,
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "graph writer batch read failed");
                            tokio::time::sleep(self.block_timeout).await;
                        }
                    }
                }
            }
        }
    }

    async fn process_entry(&self, payload: &serde_json::Value) -> Result<(), CoreError> {
        let event: GraphUpdateEvent =
            serde_json::from_value(payload.clone()).map_err(|e| CoreError::Internal(format!("malformed graph update event: {e}")))?;
        self.process_event(event).await
    }

    async fn process_event(&self, event: GraphUpdateEvent) -> Result<(), CoreError> {
        let basename = Path::new(&event.path).file_name().and_then(|f| f.to_str()).unwrap_or(&event.path).to_string();
        let doc_id = stable_document_id(&basename);

        let mut doc_node = GraphNode::new(doc_id.as_str(), NodeType::Document, basename.as_str())
            .with_property("document_type", json!(event.data.document_type));
        if let Some(cid) = self.pin_source_file(&event.path).await {
            doc_node.cid = Some(cid);
        }
        self.graph.upsert_node(doc_node).await?;

        let attached_localities = locality::add_locality_relations(self.graph.as_ref(), &doc_id, &event.data.text_content).await?;

        let first_date = event.data.dates.first().map(|d| d.date.clone());
        let anchor = if let Some(project) = event.data.project.as_ref().filter(|p| p.name.is_some()) {
            let project_id = self.upsert_project(project, first_date.as_deref()).await?;
            self.link_anchor(&doc_id, &project_id, &attached_localities).await?;
            project_id
        } else if let Some(patent) = event.data.patent.as_ref().filter(|p| p.title.is_some()) {
            let patent_id = self.upsert_patent(patent, first_date.as_deref()).await?;
            self.link_anchor(&doc_id, &patent_id, &attached_localities).await?;
            patent_id
        } else if let Some(research) = event.data.research.as_ref().filter(|r| r.title.is_some()) {
            let research_id = self.upsert_research(research, first_date.as_deref()).await?;
            self.link_anchor(&doc_id, &research_id, &attached_localities).await?;
            research_id
        } else {
            doc_id.clone()
        };

        self.attach_entities(&event.data.entities, &anchor).await?;
        self.attach_relationships(&event.data.relationships).await?;
        self.attach_similar_docs(&doc_id, &event.data.similar_docs).await?;

        self.publish_snapshot().await?;
        Ok(())
    }

    /// Attaches the anchor (project/patent/research node) back to its
    /// source document and carries forward any localities detected on the
    /// document, mirroring what was previously only done for projects.
    async fn link_anchor(&self, doc_id: &str, anchor_id: &str, attached_localities: &[String]) -> Result<(), GraphError> {
        self.graph.upsert_edge(GraphEdge::new(doc_id, anchor_id, EdgeType::ContainsDocument)).await?;
        for locality_id in attached_localities {
            self.graph.upsert_edge(GraphEdge::new(anchor_id, locality_id.as_str(), EdgeType::LocatedIn)).await?;
        }
        Ok(())
    }

    async fn upsert_project(&self, project: &ProjectBlock, date: Option<&str>) -> Result<String, GraphError> {
        let name = project.name.clone().expect("caller filters to named projects");
        let mut node = GraphNode::new(format!("proj_{}", slugify(&name)), NodeType::Project, name.as_str());
        if let Some(status) = &project.status {
            node = node.with_property("status", json!(status));
        }
        if let Some(summary) = &project.summary {
            node = node.with_property("summary", json!(summary));
        }
        if let Some(date) = date {
            node = node.with_property("date", json!(date));
        }
        self.graph.upsert_node(node).await
    }

    /// Creates or updates the anchor node for a patent block (§4.11: patents
    /// `derives_from`/`implements` their research parents via the explicit-
    /// relationship canonicalisation path, not here -- this only creates the
    /// node the lineage edge will later attach to).
    async fn upsert_patent(&self, patent: &PatentBlock, date: Option<&str>) -> Result<String, GraphError> {
        let title = patent.title.clone().expect("caller filters to titled patents");
        let mut node = GraphNode::new(format!("patent_{}", slugify(&title)), NodeType::Patent, title.as_str());
        if let Some(number) = &patent.number {
            node = node.with_property("number", json!(number));
        }
        if let Some(assignee) = &patent.assignee {
            node = node.with_property("assignee", json!(assignee));
        }
        if let Some(date) = date {
            node = node.with_property("date", json!(date));
        }
        self.graph.upsert_node(node).await
    }

    async fn upsert_research(&self, research: &ResearchBlock, date: Option<&str>) -> Result<String, GraphError> {
        let title = research.title.clone().expect("caller filters to titled research");
        let mut node = GraphNode::new(format!("research_{}", slugify(&title)), NodeType::ResearchPaper, title.as_str());
        if let Some(journal) = &research.journal {
            node = node.with_property("journal", json!(journal));
        }
        if let Some(abstract_text) = &research.abstract_text {
            node = node.with_property("abstract", json!(abstract_text));
        }
        if let Some(date) = date {
            node = node.with_property("date", json!(date));
        }
        self.graph.upsert_node(node).await
    }

    /// Inserts/links each person/organization/company entity. The closed
    /// 14-variant `NodeType` vocabulary has no separate organization/company
    /// kind, so all three categories land on `NodeType::Person`, tagged with
    /// an `entity_kind` property to keep the distinction visible.
    async fn attach_entities(&self, entities: &EntityBlock, anchor: &str) -> Result<(), GraphError> {
        for (kind, refs) in
            [("person", &entities.people), ("organization", &entities.organizations), ("company", &entities.companies)]
        {
            for entity in refs {
                let entity_id = format!("person_{}", slugify(&entity.name));
                let mut node = GraphNode::new(entity_id.as_str(), NodeType::Person, entity.name.as_str())
                    .with_property("entity_kind", json!(kind));
                if let Some(role) = &entity.role {
                    node = node.with_property("role", json!(role));
                }
                let inserted_id = self.graph.upsert_node(node).await?;

                let role_text = entity.role.clone().unwrap_or_else(|| "involved_in".to_string());
                let edge_type = self.edge_mapper.canonical_edge(&role_text).await.unwrap_or(EdgeType::InvolvedIn);
                self.graph.upsert_edge(GraphEdge::new(inserted_id.as_str(), anchor, edge_type)).await?;
            }
        }
        Ok(())
    }

    /// Explicit relationships (§4.6 step 6): dropped if either endpoint is
    /// missing from the graph, or if the relation text doesn't canonicalise.
    async fn attach_relationships(&self, relationships: &[RelationshipRef]) -> Result<(), GraphError> {
        for relationship in relationships {
            let Some(source) = self.find_any_label(&relationship.source).await? else { continue };
            let Some(target) = self.find_any_label(&relationship.target).await? else { continue };
            let Some(edge_type) = self.edge_mapper.canonical_edge(&relationship.relationship).await else { continue };
            self.graph.upsert_edge(GraphEdge::new(source.id, target.id, edge_type)).await?;
        }
        Ok(())
    }

    async fn find_any_label(&self, label: &str) -> Result<Option<GraphNode>, GraphError> {
        for node_type in [
            NodeType::Document,
            NodeType::Project,
            NodeType::Person,
            NodeType::ResearchPaper,
            NodeType::Patent,
            NodeType::Locality,
        ] {
            let type_str = node_type_label(node_type);
            if let Some(node) = self.graph.find_node_by_label(type_str, label).await? {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    /// `SIMILAR_TO` edges (§4.6 step 7), weighted 0.5 via `confidence`.
    async fn attach_similar_docs(&self, doc_id: &str, similar_docs: &[String]) -> Result<(), GraphError> {
        for cid in similar_docs {
            let edge = GraphEdge::new(doc_id, cid.as_str(), EdgeType::SimilarTo).with_confidence(0.5);
            self.graph.upsert_edge(edge).await?;
        }
        Ok(())
    }

    async fn pin_source_file(&self, path: &str) -> Option<String> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path, error = %e, "could not read source file to pin, document node created without a cid");
                return None;
            }
        };
        let cid = match self.object_store.put(&bytes).await {
            Ok(cid) => cid,
            Err(e) => {
                warn!(path, error = %e, "pin of source file failed, document node created without a cid");
                return None;
            }
        };
        if let Err(e) = self.object_store.pin(&cid, json!({"source_path": path})).await {
            warn!(path, error = %e, "pin metadata write failed");
        }
        Some(cid)
    }

    /// Atomically writes the current graph to the snapshot shape, pins it,
    /// and republishes the mutable `graph_ipns_key` name (§4.6 step 8).
    async fn publish_snapshot(&self) -> Result<(), CoreError> {
        let snapshot = self.graph.snapshot_json().await?;
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let cid = self.object_store.put(&bytes).await?;
        self.object_store.pin(&cid, json!({"kind": "graph_snapshot"})).await?;
        self.object_store.publish_name(&self.graph_ipns_key, &cid).await?;
        Ok(())
    }
}

fn stable_document_id(basename: &str) -> String {
    let digest = Md5::digest(basename.as_bytes());
    format!("doc_{}", &hex::encode(digest)[..8])
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn node_type_label(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::ResearchPaper => "research_paper",
        NodeType::Patent => "patent",
        NodeType::Project => "project",
        NodeType::Building => "building",
        NodeType::Dataset => "dataset",
        NodeType::Person => "person",
        NodeType::Funding => "funding",
        NodeType::Document => "document",
        NodeType::Locality => "locality",
        NodeType::Region => "region",
        NodeType::TelemetryStream => "telemetry_stream",
        NodeType::TelemetryReading => "telemetry_reading",
        NodeType::Metric => "metric",
        NodeType::Sensor => "sensor",
    }
}
