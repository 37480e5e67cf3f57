//! # Accumulator State and Transitions
//!
//! The versioned accumulator state owned by the identity state machine,
//! and the transition record handed to the anchor coordinator for each
//! admin operation.
//!
//! ## Versioning
//!
//! `version` counts committed transitions since initialization and labels
//! the observable history: a verifier that read state at version V keeps
//! a consistent view until a later commit produces V + 1. `parent_hash`
//! is always `keccak256(be_bytes(root, 256))` of the committed root and
//! is what the anchor compares for replay protection.

use num_bigint::BigUint;

use crate::crypto::error::Result;
use crate::crypto::hash::{keccak256, parent_hash, DIGEST_BYTES, ROOT_BYTES};
use crate::models::device::DeviceId;

// ============================================================================
// Accumulator State
// ============================================================================

/// Process-wide accumulator state: the committed root, the transition
/// counter, and the parent hash for the next anchor submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorState {
    /// Current accumulator value, canonical in [1, N)
    pub root: BigUint,

    /// Number of committed transitions since initialization
    pub version: u64,

    /// `keccak256(be_bytes(root, 256))`, recomputed on every commit
    pub parent_hash: [u8; DIGEST_BYTES],
}

impl AccumulatorState {
    /// Initial state: root = g, version 0.
    pub fn genesis(g: &BigUint) -> Result<Self> {
        Ok(Self {
            root: g.clone(),
            version: 0,
            parent_hash: parent_hash(g)?,
        })
    }

    /// Advance to a committed root: bump the version and recompute the
    /// parent hash.
    pub fn advance(&mut self, next_root: BigUint) -> Result<()> {
        self.parent_hash = parent_hash(&next_root)?;
        self.root = next_root;
        self.version += 1;
        Ok(())
    }

    /// Canonical 512-char lowercase hex of the root
    pub fn root_hex(&self) -> Result<String> {
        Ok(hex::encode(crate::crypto::hash::root_to_bytes(&self.root)?))
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Kind of admin operation behind a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Enrollment of a new device
    Enroll,
    /// Revocation of an active device
    Revoke,
}

impl OpType {
    /// External string form
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Enroll => "enroll",
            OpType::Revoke => "revoke",
        }
    }
}

/// One proposed state transition, produced by the state machine and
/// submitted to the anchor by the coordinator.
///
/// The record is complete at creation: `operation_id` is derived from the
/// submission timestamp, the candidate root, and the parent hash, and is
/// never re-derived for a retry (a retried operation is a new operation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Operation kind
    pub op_type: OpType,

    /// The device the operation concerns
    pub device_id: DeviceId,

    /// Committed root the transition starts from
    pub prev_root: BigUint,

    /// Candidate root the transition produces
    pub next_root: BigUint,

    /// `keccak256(be_bytes(prev_root, 256))` - replay protection
    pub parent_hash: [u8; DIGEST_BYTES],

    /// 32-byte tag identifying this submission
    pub operation_id: [u8; DIGEST_BYTES],
}

/// Derive an operation id:
/// `keccak256(now_unix_seconds_be8 || next_root_bytes || parent_hash)`.
pub fn derive_operation_id(
    now_unix_seconds: u64,
    next_root_bytes: &[u8; ROOT_BYTES],
    parent: &[u8; DIGEST_BYTES],
) -> [u8; DIGEST_BYTES] {
    let mut preimage = Vec::with_capacity(8 + ROOT_BYTES + DIGEST_BYTES);
    preimage.extend_from_slice(&now_unix_seconds.to_be_bytes());
    preimage.extend_from_slice(next_root_bytes);
    preimage.extend_from_slice(parent);
    keccak256(&preimage)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::root_to_bytes;

    #[test]
    fn test_genesis_state() {
        let g = BigUint::from(4u32);
        let state = AccumulatorState::genesis(&g).unwrap();
        assert_eq!(state.root, g);
        assert_eq!(state.version, 0);
        assert_eq!(state.parent_hash, parent_hash(&g).unwrap());
    }

    #[test]
    fn test_advance_tracks_parent_hash() {
        let mut state = AccumulatorState::genesis(&BigUint::from(4u32)).unwrap();
        let next = BigUint::from(196u32);
        state.advance(next.clone()).unwrap();

        assert_eq!(state.root, next);
        assert_eq!(state.version, 1);
        assert_eq!(state.parent_hash, parent_hash(&next).unwrap());
    }

    #[test]
    fn test_root_hex_is_padded() {
        let state = AccumulatorState::genesis(&BigUint::from(4u32)).unwrap();
        let rendered = state.root_hex().unwrap();
        assert_eq!(rendered.len(), 512);
        assert!(rendered.ends_with("04"));
    }

    #[test]
    fn test_operation_id_binds_all_inputs() {
        let root_a = root_to_bytes(&BigUint::from(9u32)).unwrap();
        let root_b = root_to_bytes(&BigUint::from(169u32)).unwrap();
        let parent = parent_hash(&BigUint::from(4u32)).unwrap();

        let base = derive_operation_id(1_700_000_000, &root_a, &parent);
        assert_ne!(base, derive_operation_id(1_700_000_001, &root_a, &parent));
        assert_ne!(base, derive_operation_id(1_700_000_000, &root_b, &parent));

        let other_parent = parent_hash(&BigUint::from(9u32)).unwrap();
        assert_ne!(base, derive_operation_id(1_700_000_000, &root_a, &other_parent));

        // deterministic for fixed inputs
        assert_eq!(base, derive_operation_id(1_700_000_000, &root_a, &parent));
    }
}
