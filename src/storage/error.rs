//! # Storage Error Types
//!
//! Errors surfaced by the persistence collaborator. The core only sees
//! committed state through this interface; a failure *during* commit
//! means the in-memory state and the anchor have advanced past the store
//! and is treated as fatal by the gateway.

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by a [`DeviceStore`](crate::storage::DeviceStore)
/// implementation or while decoding stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend rejected or failed an operation
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A stored value could not be decoded
    #[error("stored value for {key} is malformed: {reason}")]
    Corrupt {
        /// Row or metadata key concerned
        key: String,
        /// What failed to decode
        reason: String,
    },
}

impl StorageError {
    /// Create a Backend error from a string message
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a Corrupt error for a key
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
