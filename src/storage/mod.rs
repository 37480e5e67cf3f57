//! # Storage Module
//!
//! The persistence collaborator interface: a key-value contract for
//! device rows and a small metadata map. The core is backend-agnostic;
//! deployments plug in an embedded or remote implementation, and tests
//! use the in-memory store.

pub mod error;
pub mod store;

// Re-export common types at the storage module level
pub use error::StorageError;
pub use store::{
    DeviceStore, MemoryStore, StoredDevice, META_G_HEX, META_LAMBDA_HEX, META_N_HEX,
    META_ROOT_HEX, META_VERSION,
};
