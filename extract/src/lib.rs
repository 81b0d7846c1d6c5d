//! Text extraction, chunking, LLM-driven structured extraction, and merge
//! (§4.3, §4.5).

pub mod chunking;
pub mod classifier;
pub mod embedder;
pub mod extractor;
pub mod merge;
pub mod templates;
pub mod validate;
pub mod vector_index;

pub use chunking::{chunk_document, ChunkConfig};
pub use classifier::classify;
pub use embedder::{Embedder, HttpEmbedder};
pub use extractor::{ExtractedFields, Extractor};
pub use merge::smart_union;
pub use templates::TemplateStore;
pub use vector_index::HttpVectorIndex;
