//! Error types for the document-to-knowledge-graph pipeline.
//!
//! Each concern gets its own `thiserror` enum; `CoreError` is the top-level
//! sum type components that cross several boundaries (the orchestrator, the
//! read API) can return, with `#[from]` conversions wired per §7 of the
//! specification this crate implements.

use thiserror::Error;

/// Top-level error type for orchestrator- and API-facing code.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("coordination store error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("graph store error: {0}")]
    Graph(#[from] GraphError),

    #[error("llm connector error: {0}")]
    Llm(#[from] LlmError),

    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from the Distributed Object Pool and Object Store Adapter (§4.1).
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("peer replication failed: {0}")]
    ReplicationFailed(String),

    #[error("promotion to content-addressed store failed: {0}")]
    PromotionFailed(String),

    #[error("storage node has insufficient free space")]
    StorageFull,

    #[error("object not found for cid: {0}")]
    NotFound(String),

    #[error("name record not found: {0}")]
    NameNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the Coordination Adapter, Job Queue, and Worker Registry (§4.2).
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("connection to coordination store failed: {0}")]
    ConnectionFailed(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job is not in the expected state: expected {expected}, found {found}")]
    InvalidJobState { expected: String, found: String },

    #[error("timeout waiting for work")]
    Timeout,
}

/// Errors related to graph storage operations (§4.6).
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("snapshot publication failed: {0}")]
    PublicationFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors related to LLM client operations (§4.4).
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("api error from llm provider: {0}")]
    ApiError(String),

    #[error("timeout during llm call")]
    Timeout,

    #[error("failed to parse llm response: {0}")]
    ResponseParseError(String),

    #[error("llm response failed schema validation: {0}")]
    SchemaValidationError(String),

    #[error("extraction budget exceeded")]
    BudgetExceeded,

    #[error("internal connector error: {0}")]
    InternalError(String),
}

/// Errors from the Extractor (§4.3, §4.5). Most are recovered by demotion
/// rather than propagated -- see `ProcessedDocument::demoted`.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("llm returned no parseable json: {0}")]
    ParseFailed(String),

    #[error("processed document failed schema validation: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Errors from telemetry ingestion (§4.8). `RegionOutOfBounds`, `PiiDetected`,
/// and `LicenseNotAllowed` are non-fatal per §7 -- the reading is dropped and
/// a counter incremented, not a panic or a propagated failure.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("reading at ({lat}, {lng}) is outside the configured region")]
    RegionOutOfBounds { lat: f64, lng: f64 },

    #[error("reading metadata appears to contain personally identifiable information")]
    PiiDetected,

    #[error("license '{0}' is not on the open-data allow-list")]
    LicenseNotAllowed(String),

    #[error("source fetch failed: {0}")]
    FetchFailed(String),

    #[error("failed to persist telemetry reading: {0}")]
    StorageFailed(String),
}

/// Errors from the read-only HTTP API.
#[derive(Error, Debug)]
pub enum PresentationError {
    #[error("server startup failed: {0}")]
    StartupFailed(String),

    #[error("server shutdown failed: {0}")]
    ShutdownFailed(String),

    #[error("request handling error: {0}")]
    RequestHandling(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
pub type GraphResult<T> = Result<T, GraphError>;
pub type LlmResult<T> = Result<T, LlmError>;
pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;
pub type CoordinationResult<T> = Result<T, CoordinationError>;
