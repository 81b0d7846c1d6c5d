//! Graph Writer Service, locality/region detection, edge canonicalisation,
//! spatial nearest-edges, and housekeeping (§4.6, §4.7, §4.9).

pub mod edge_mapping;
pub mod housekeeping;
pub mod locality;
pub mod spatial;
pub mod writer;

pub use edge_mapping::EdgeMapper;
pub use housekeeping::Housekeeper;
pub use spatial::add_nearest_edges;
pub use writer::{GraphWriter, GRAPH_UPDATE_STREAM_KEY};
