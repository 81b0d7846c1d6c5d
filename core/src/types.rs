//! Core data model: documents, jobs, the graph's closed node/edge vocabulary,
//! and telemetry readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// WGS-84 coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Promotion state of a `Document` as it moves through the object pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionState {
    Pending,
    Stored,
    Failed,
}

/// A raw, un-extracted source document tracked by the object pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// `file_id`, the stable content-digest-derived identifier (`"file_" + sha256(content)`).
    pub id: String,
    pub original_filename: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub replicas: Vec<String>,
    pub promotion_state: PromotionState,
    pub cid: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The document-class sum type. The source system carries these as dynamic
/// JSON blobs with an optional nested block per class; here each class gets
/// its own typed block and unrecognised or unvalidatable input demotes to
/// `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentClass {
    Project,
    Patent,
    Research,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectBlock {
    pub name: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatentBlock {
    pub number: Option<String>,
    pub title: Option<String>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchBlock {
    pub title: Option<String>,
    pub journal: Option<String>,
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRef {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityBlock {
    #[serde(default)]
    pub people: Vec<EntityRef>,
    #[serde(default)]
    pub organizations: Vec<EntityRef>,
    #[serde(default)]
    pub companies: Vec<EntityRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRef {
    pub source: String,
    pub target: String,
    pub relationship: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundingBlock {
    pub amount: Option<f64>,
    pub source: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactBlock {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRef {
    pub date: String,
}

/// The output of the extraction engine for a single source document, one per
/// source and immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub document_id: String,
    pub document_type: DocumentClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patent: Option<PatentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
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
    pub text_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_cid: Option<String>,
    #[serde(default)]
    pub similar_docs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedDocument {
    /// An "other"-classed document with no extracted structure, used on
    /// empty input or on a validation/parse failure (demotion).
    pub fn demoted(document_id: impl Into<String>, text_content: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            document_type: DocumentClass::Other,
            project: None,
            patent: None,
            research: None,
            locations: Vec::new(),
            entities: EntityBlock::default(),
            relationships: Vec::new(),
            funding: FundingBlock::default(),
            contact_info: ContactBlock::default(),
            dates: Vec::new(),
            text_content: text_content.into(),
            metadata_cid: None,
            similar_docs: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// A unit of work claimed by exactly one worker at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub doc_ref: String,
    pub submitter_id: String,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
    pub claiming_worker: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    /// Every worker id that has ever claimed this job, oldest first -- grows
    /// on each requeue so a reap can be observed in history.
    pub claim_history: Vec<String>,
}

impl Job {
    pub fn new(doc_ref: impl Into<String>, submitter_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doc_ref: doc_ref.into(),
            submitter_id: submitter_id.into(),
            submitted_at: Utc::now(),
            status: JobStatus::Pending,
            claiming_worker: None,
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            claim_history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub capabilities: HashMap<String, serde_json::Value>,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageNodeInfo {
    pub id: String,
    pub mount_path: String,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub last_updated: DateTime<Utc>,
    pub endpoint: String,
}

impl StorageNodeInfo {
    pub fn free_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }
}

/// The closed vocabulary of graph node kinds (§10.6 of the specification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    ResearchPaper,
    Patent,
    Project,
    Building,
    Dataset,
    Person,
    Funding,
    Document,
    Locality,
    Region,
    TelemetryStream,
    TelemetryReading,
    Metric,
    Sensor,
}

/// The closed vocabulary of graph edge kinds, grouped by concern in the
/// specification: lineage, spatial, collaboration, business, provenance, and
/// telemetry relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    // lineage
    DerivesFrom,
    Implements,
    Influenced,
    Supersedes,
    // spatial
    LocatedIn,
    Nearby,
    PartOf,
    // collaboration
    WorkedWith,
    CollaboratedWith,
    Authored,
    Advised,
    // business
    Funds,
    Owns,
    Employs,
    Contracts,
    Supplies,
    // containment / provenance
    Contains,
    ContainsDocument,
    SimilarTo,
    SourcedFrom,
    References,
    // telemetry
    Measures,
    Reports,
    // generic
    InvolvedIn,
    RelatedTo,
    Mentions,
}

impl EdgeType {
    /// Edge types that constitute a derivation "lineage" per the glossary.
    pub fn is_lineage(self) -> bool {
        matches!(self, EdgeType::DerivesFrom | EdgeType::Implements | EdgeType::Influenced | EdgeType::Supersedes)
    }
}

/// A node in the append-only knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub label: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    pub coordinates: Option<Coordinates>,
    pub cid: Option<String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            properties: HashMap::new(),
            coordinates: None,
            cid: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A directed, typed edge. Idempotently keyed by `(source, target, edge_type)`
/// per invariant 3 -- the writer must not insert a duplicate for the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub timestamp: DateTime<Utc>,
    pub confidence: Option<f64>,
    pub message: Option<String>,
    pub subtype: Option<String>,
    pub distance_km: Option<f64>,
    pub source_document: Option<String>,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
            timestamp: Utc::now(),
            confidence: None,
            message: None,
            subtype: None,
            distance_km: None,
            source_document: None,
        }
    }

    /// Key this edge is merged on (invariant: never deleted, idempotent insert).
    pub fn merge_key(&self) -> (String, String, EdgeType) {
        (self.source.clone(), self.target.clone(), self.edge_type)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_distance_km(mut self, distance_km: f64) -> Self {
        self.distance_km = Some(distance_km);
        self
    }

    pub fn with_source_document(mut self, source_document: impl Into<String>) -> Self {
        self.source_document = Some(source_document.into());
        self
    }
}

/// A single telemetry fact, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// `{stream_id}_{timestamp}`
    pub id: String,
    pub stream_id: String,
    pub value: f64,
    pub unit: String,
    pub coordinates: Coordinates,
    pub timestamp: DateTime<Utc>,
    pub source_url: Option<String>,
    pub license: String,
    pub locality: Option<String>,
    /// Either a CID (promoted) or a local time-partitioned file path.
    pub data_location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_starts_pending_with_no_claim_history() {
        let job = Job::new("doc:abc", "worker-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.claim_history.is_empty());
    }

    #[test]
    fn edge_merge_key_ignores_timestamp_and_confidence() {
        let a = GraphEdge::new("A", "B", EdgeType::WorkedWith).with_confidence(0.4);
        let b = GraphEdge::new("A", "B", EdgeType::WorkedWith).with_confidence(0.9);
        assert_eq!(a.merge_key(), b.merge_key());
    }

    #[test]
    fn storage_node_free_bytes_saturates() {
        let node = StorageNodeInfo {
            id: "n1".into(),
            mount_path: "/data".into(),
            capacity_bytes: 10,
            used_bytes: 20,
            last_updated: Utc::now(),
            endpoint: "http://n1".into(),
        };
        assert_eq!(node.free_bytes(), 0);
    }

    #[test]
    fn lineage_edge_types_are_exactly_four() {
        let all = [
            EdgeType::DerivesFrom,
            EdgeType::Implements,
            EdgeType::Influenced,
            EdgeType::Supersedes,
            EdgeType::LocatedIn,
            EdgeType::Nearby,
        ];
        let lineage_count = all.iter().filter(|e| e.is_lineage()).count();
        assert_eq!(lineage_count, 4);
    }
}
