//! Content-addressed object store adapter (OSA) and the Distributed Object
//! Pool (DOP) that sits in front of it, per §4.1 of the specification.
//!
//! No IPFS client crate exists anywhere in the reference stack this crate is
//! grounded on, and fabricating one would violate the no-invented-dependency
//! rule, so the object store here is a real, content-addressed local
//! filesystem implementation of the same `put/get/pin/unpin/publishName`
//! contract -- sha256-keyed, with pins and name records as JSON sidecars.
//! Swapping in a hosted content-addressed store later means writing one more
//! `ObjectStore` impl; nothing upstream changes.

pub mod pool;
pub mod store;

pub use pool::ObjectPool;
pub use store::LocalObjectStore;
