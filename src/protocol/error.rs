//! # Protocol Error Types
//!
//! The closed set of error kinds the identity core raises toward its
//! callers. Every variant maps to exactly one stable kind string plus a
//! human-readable message; stack traces and internal identifiers never
//! cross this boundary.
//!
//! ## Error Categories
//!
//! - `InvalidInput` - malformed PEM, non-hex string, size mismatch,
//!   unknown key type
//! - `AlreadyEnrolled` / `NotFound` / `NotActive` - device-table
//!   preconditions
//! - `ParentHashMismatch` / `AnchorTimeout` / `AnchorRejected` -
//!   anchor-side failures; local state is unchanged
//! - `AuthFailed` - challenge-response denial with no refresh available
//! - `Crypto` / `Storage` - propagated collaborator failures
//!
//! A stale witness is *not* an error: it is an
//! [`AuthOutcome`](crate::protocol::challenge::AuthOutcome) variant
//! carrying the refreshed witness.

use thiserror::Error;

use crate::crypto::error::CryptoError;
use crate::storage::error::StorageError;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised by the identity state machine, the anchor coordinator,
/// and the challenge-response verifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A caller-supplied value failed validation
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What failed to parse or validate
        reason: String,
    },

    /// Enrollment collides with an existing device row
    ///
    /// Raised for any existing status, including REVOKED: a revoked
    /// key's prime is burned and the key cannot re-enroll.
    #[error("device {device_id} is already enrolled")]
    AlreadyEnrolled {
        /// Device id hex
        device_id: String,
    },

    /// No device row exists for the identifier
    #[error("device {device_id} not found")]
    NotFound {
        /// Device id hex
        device_id: String,
    },

    /// The operation requires ACTIVE status
    #[error("device {device_id} is {status}, not ACTIVE")]
    NotActive {
        /// Device id hex
        device_id: String,
        /// Actual status
        status: String,
    },

    /// The anchor rejected the submission because its stored hash does
    /// not match the submitted parent hash
    ///
    /// Local state is unchanged; the caller should re-read the current
    /// root and retry.
    #[error("anchor rejected submission: parent hash mismatch")]
    ParentHashMismatch,

    /// The anchor did not resolve a pending submission in time
    #[error("anchor submission timed out after {waited_secs}s")]
    AnchorTimeout {
        /// Seconds waited before giving up
        waited_secs: u64,
    },

    /// The anchor refused the submission
    #[error("anchor rejected submission: {reason}")]
    AnchorRejected {
        /// Reason reported by the anchor
        reason: String,
    },

    /// Authentication denied with no refresh available
    #[error("authentication failed: {reason}")]
    AuthFailed {
        /// Which check failed
        reason: String,
    },

    /// Propagated cryptographic failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Propagated persistence failure
    ///
    /// During commit this is fatal: the in-memory state and the anchor
    /// have advanced past the store and reconciliation is human-driven.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProtocolError {
    /// Create an InvalidInput error from a string message
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind string for this error
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::InvalidInput { .. } => "INVALID_INPUT",
            ProtocolError::AlreadyEnrolled { .. } => "ALREADY_ENROLLED",
            ProtocolError::NotFound { .. } => "NOT_FOUND",
            ProtocolError::NotActive { .. } => "NOT_ACTIVE",
            ProtocolError::ParentHashMismatch => "PARENT_HASH_MISMATCH",
            ProtocolError::AnchorTimeout { .. } => "ANCHOR_TIMEOUT",
            ProtocolError::AnchorRejected { .. } => "ANCHOR_REJECTED",
            ProtocolError::AuthFailed { .. } => "AUTH_FAILED",
            ProtocolError::Crypto(inner) => inner.kind(),
            ProtocolError::Storage(_) => "STORAGE_FAILURE",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
