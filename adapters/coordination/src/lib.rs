//! Coordination Adapter (§2, §4.2): a typed wrapper over a remote key/value
//! store's list/hash/set/stream primitives, plus the job queue, worker
//! registry, and storage-node registry built on top of it.

pub mod job_queue;
pub mod memory;
pub mod redis_store;
pub mod storage_registry;
pub mod worker_registry;

pub use job_queue::CoordinatedJobQueue;
pub use memory::InMemoryCoordinationStore;
pub use redis_store::RedisCoordinationStore;
pub use storage_registry::CoordinatedStorageNodeRegistry;
pub use worker_registry::CoordinatedWorkerRegistry;
