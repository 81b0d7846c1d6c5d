//! # pipeline-core
//!
//! Core types, trait seams, and error taxonomy shared by every adapter,
//! connector, and service crate in the document-to-knowledge-graph pipeline.

pub mod errors;
pub mod traits;
pub mod types;

pub use errors::{CoordinationError, CoreError, GraphError, LlmError, ObjectStoreError};
pub use traits::{CoordinationStore, GraphStore, JobQueue, LlmConnector, ObjectStore, VectorIndex};
pub use types::{EdgeType, GraphEdge, GraphNode, NodeType};

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
