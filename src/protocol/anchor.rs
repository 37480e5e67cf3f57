//! # Anchor Coordination
//!
//! Translates one staged state-machine transition into one submission
//! against the external anchor (a replicated log with a multi-party
//! approval workflow) and blocks until the outcome is known.
//!
//! ## Replay protection
//!
//! Every submission carries `parent_hash = keccak256(be_bytes(prev_root,
//! 256))`. The anchor rejects any submission whose parent hash does not
//! match its own stored hash of the current root, so a submission built
//! against stale state can never execute. An `operation_id` is derived
//! once per submission and never reused with a different payload.
//!
//! ## Modes
//!
//! The anchor may execute immediately or return a pending handle that
//! resolves after multi-party approval. The coordinator polls pending
//! handles with a configurable timeout (default 30 s; `None` waits
//! indefinitely for multi-party mode). [`LocalAnchor`] confirms
//! synchronously for tests and local-only deployments - same coordinator
//! code path, not a second mode.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::crypto::hash::{keccak256, root_to_bytes, DIGEST_BYTES, ROOT_BYTES};
use crate::models::device::DeviceId;
use crate::models::transition::{OpType, TransitionRecord};

use super::error::{ProtocolError, Result};

// ============================================================================
// Wire Types
// ============================================================================

/// One anchor submission, fully serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorSubmission {
    /// Operation kind (selects the anchor entry point)
    pub op_type: OpType,
    /// Subject device
    pub device_id: DeviceId,
    /// Candidate root, canonical 256-byte big-endian
    pub next_root_bytes: [u8; ROOT_BYTES],
    /// Hash of the current root for replay protection
    pub parent_hash: [u8; DIGEST_BYTES],
    /// Unique tag for this submission
    pub operation_id: [u8; DIGEST_BYTES],
}

impl AnchorSubmission {
    /// Serialize a transition record for submission.
    pub fn from_transition(record: &TransitionRecord) -> Result<Self> {
        Ok(Self {
            op_type: record.op_type,
            device_id: record.device_id,
            next_root_bytes: root_to_bytes(&record.next_root)?,
            parent_hash: record.parent_hash,
            operation_id: record.operation_id,
        })
    }
}

/// Anchor-side view of the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorStateView {
    /// Current root, canonical 256-byte big-endian
    pub root_bytes: [u8; ROOT_BYTES],
    /// Anchor's stored hash of the current root
    pub root_hash: [u8; DIGEST_BYTES],
    /// Anchor-side version counter
    pub version: u64,
}

/// Why the anchor refused a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectKind {
    /// The submitted parent hash does not match the anchor's stored hash
    ParentHashMismatch,
    /// Any other refusal (authorization, veto, malformed payload)
    Refused,
}

/// Immediate result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Executed on the spot
    Executed {
        /// Anchor-side transaction handle
        tx: String,
    },
    /// Queued for multi-party approval
    Pending {
        /// Handle for polling
        handle: String,
    },
    /// Refused
    Rejected {
        /// Refusal category
        kind: RejectKind,
        /// Anchor-supplied reason
        reason: String,
    },
}

/// Result of polling a pending handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Still awaiting approval
    Pending,
    /// Approved and executed
    Executed {
        /// Anchor-side transaction handle
        tx: String,
    },
    /// Refused
    Rejected {
        /// Refusal category
        kind: RejectKind,
        /// Anchor-supplied reason
        reason: String,
    },
}

// ============================================================================
// Anchor Client Trait
// ============================================================================

/// The external anchor capability the coordinator consumes.
///
/// Authorization lives on the anchor side; the core only submits and
/// observes outcomes.
pub trait AnchorClient: Send + Sync {
    /// Enrollment anchor entry point.
    fn register(&self, submission: &AnchorSubmission) -> Result<SubmissionOutcome>;

    /// Revocation anchor entry point.
    fn revoke(&self, submission: &AnchorSubmission) -> Result<SubmissionOutcome>;

    /// Bare root update (operations with no subject device).
    fn update(&self, submission: &AnchorSubmission) -> Result<SubmissionOutcome>;

    /// Anchor-side state, for bootstrap checks and diagnostics.
    fn get_current_state(&self) -> Result<AnchorStateView>;

    /// Poll a pending submission handle.
    fn poll(&self, handle: &str) -> Result<SubmissionStatus>;
}

// ============================================================================
// Coordinator
// ============================================================================

/// Timing knobs for pending submissions.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Give up on a pending submission after this long; `None` waits
    /// indefinitely (multi-party approval mode)
    pub submission_timeout: Option<Duration>,
    /// Interval between polls of a pending handle
    pub poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            submission_timeout: Some(Duration::from_secs(30)),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Drives one submission at a time against the anchor.
///
/// The gateway serializes admin operations, so the coordinator never has
/// two submissions in flight.
pub struct AnchorCoordinator {
    client: Box<dyn AnchorClient>,
    config: CoordinatorConfig,
}

impl AnchorCoordinator {
    /// Wrap an anchor client with the given timing configuration.
    pub fn new(client: Box<dyn AnchorClient>, config: CoordinatorConfig) -> Self {
        Self { client, config }
    }

    /// The wrapped client, for bootstrap state reads.
    pub fn client(&self) -> &dyn AnchorClient {
        self.client.as_ref()
    }

    /// Submit and block until executed or failed.
    ///
    /// Returns the anchor transaction handle on success. On
    /// `ParentHashMismatch`, timeout, or refusal the caller must abort
    /// the staged transition; local state is unchanged.
    pub fn submit(&self, submission: &AnchorSubmission) -> Result<String> {
        debug!(
            op = submission.op_type.as_str(),
            device_id = %submission.device_id,
            operation_id = %hex::encode(submission.operation_id),
            "submitting to anchor"
        );

        let outcome = match submission.op_type {
            OpType::Enroll => self.client.register(submission)?,
            OpType::Revoke => self.client.revoke(submission)?,
        };

        match outcome {
            SubmissionOutcome::Executed { tx } => {
                info!(tx = %tx, "anchor executed submission");
                Ok(tx)
            }
            SubmissionOutcome::Rejected { kind, reason } => Err(reject_error(kind, reason)),
            SubmissionOutcome::Pending { handle } => self.wait(&handle),
        }
    }

    /// Poll a pending handle until it resolves or the timeout elapses.
    fn wait(&self, handle: &str) -> Result<String> {
        let started = Instant::now();
        info!(handle = %handle, "submission pending multi-party approval");

        loop {
            if let Some(timeout) = self.config.submission_timeout {
                if started.elapsed() >= timeout {
                    warn!(handle = %handle, "anchor submission timed out");
                    return Err(ProtocolError::AnchorTimeout {
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            std::thread::sleep(self.config.poll_interval);

            match self.client.poll(handle)? {
                SubmissionStatus::Pending => continue,
                SubmissionStatus::Executed { tx } => {
                    info!(tx = %tx, "pending submission executed");
                    return Ok(tx);
                }
                SubmissionStatus::Rejected { kind, reason } => {
                    return Err(reject_error(kind, reason))
                }
            }
        }
    }
}

fn reject_error(kind: RejectKind, reason: String) -> ProtocolError {
    match kind {
        RejectKind::ParentHashMismatch => {
            warn!("anchor reported a parent hash conflict");
            ProtocolError::ParentHashMismatch
        }
        RejectKind::Refused => {
            warn!(reason = %reason, "anchor refused submission");
            ProtocolError::AnchorRejected { reason }
        }
    }
}

// ============================================================================
// Local Anchor
// ============================================================================

struct LocalAnchorState {
    root_bytes: [u8; ROOT_BYTES],
    root_hash: [u8; DIGEST_BYTES],
    version: u64,
}

/// In-process anchor that confirms synchronously.
///
/// Enforces the same parent-hash check a real anchor performs, so the
/// replay-protection path is exercised even in local-only mode.
pub struct LocalAnchor {
    state: Mutex<LocalAnchorState>,
}

impl LocalAnchor {
    /// Anchor initialized at the given genesis root encoding.
    pub fn new(genesis_root_bytes: [u8; ROOT_BYTES]) -> Self {
        Self {
            state: Mutex::new(LocalAnchorState {
                root_bytes: genesis_root_bytes,
                root_hash: keccak256(&genesis_root_bytes),
                version: 0,
            }),
        }
    }

    fn apply(&self, submission: &AnchorSubmission) -> Result<SubmissionOutcome> {
        let mut state = self.state.lock();
        if submission.parent_hash != state.root_hash {
            return Ok(SubmissionOutcome::Rejected {
                kind: RejectKind::ParentHashMismatch,
                reason: "stored hash does not match submitted parent hash".into(),
            });
        }
        state.root_bytes = submission.next_root_bytes;
        state.root_hash = keccak256(&submission.next_root_bytes);
        state.version += 1;
        Ok(SubmissionOutcome::Executed {
            tx: hex::encode(submission.operation_id),
        })
    }
}

impl AnchorClient for LocalAnchor {
    fn register(&self, submission: &AnchorSubmission) -> Result<SubmissionOutcome> {
        self.apply(submission)
    }

    fn revoke(&self, submission: &AnchorSubmission) -> Result<SubmissionOutcome> {
        self.apply(submission)
    }

    fn update(&self, submission: &AnchorSubmission) -> Result<SubmissionOutcome> {
        self.apply(submission)
    }

    fn get_current_state(&self) -> Result<AnchorStateView> {
        let state = self.state.lock();
        Ok(AnchorStateView {
            root_bytes: state.root_bytes,
            root_hash: state.root_hash,
            version: state.version,
        })
    }

    fn poll(&self, _handle: &str) -> Result<SubmissionStatus> {
        // the local anchor never returns a pending handle
        Err(crate::storage::error::StorageError::backend(
            "local anchor has no pending submissions",
        )
        .into())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn submission(
        prev: u32,
        next: u32,
        op: OpType,
        now: u64,
    ) -> AnchorSubmission {
        let prev_root = BigUint::from(prev);
        let next_root = BigUint::from(next);
        let parent = crate::crypto::hash::parent_hash(&prev_root).unwrap();
        let next_bytes = root_to_bytes(&next_root).unwrap();
        AnchorSubmission {
            op_type: op,
            device_id: DeviceId::from_spki_der(b"anchor-test"),
            next_root_bytes: next_bytes,
            parent_hash: parent,
            operation_id: crate::models::transition::derive_operation_id(
                now,
                &next_bytes,
                &parent,
            ),
        }
    }

    fn genesis_bytes(root: u32) -> [u8; ROOT_BYTES] {
        root_to_bytes(&BigUint::from(root)).unwrap()
    }

    #[test]
    fn test_local_anchor_executes_matching_parent() {
        let anchor = LocalAnchor::new(genesis_bytes(4));
        let sub = submission(4, 9, OpType::Enroll, 1);

        let outcome = anchor.register(&sub).unwrap();
        assert!(matches!(outcome, SubmissionOutcome::Executed { .. }));

        let state = anchor.get_current_state().unwrap();
        assert_eq!(state.version, 1);
        assert_eq!(state.root_bytes, genesis_bytes(9));
        assert_eq!(state.root_hash, keccak256(&genesis_bytes(9)));
    }

    #[test]
    fn test_local_anchor_rejects_stale_parent() {
        let anchor = LocalAnchor::new(genesis_bytes(4));
        anchor.register(&submission(4, 9, OpType::Enroll, 1)).unwrap();

        // built against the pre-first-commit root
        let stale = submission(4, 169, OpType::Enroll, 2);
        let outcome = anchor.register(&stale).unwrap();
        assert!(matches!(
            outcome,
            SubmissionOutcome::Rejected {
                kind: RejectKind::ParentHashMismatch,
                ..
            }
        ));

        // state unchanged by the rejection
        assert_eq!(anchor.get_current_state().unwrap().version, 1);
    }

    #[test]
    fn test_coordinator_maps_parent_mismatch() {
        let anchor = LocalAnchor::new(genesis_bytes(4));
        let coordinator = AnchorCoordinator::new(Box::new(anchor), CoordinatorConfig::default());

        coordinator
            .submit(&submission(4, 9, OpType::Enroll, 1))
            .unwrap();
        let err = coordinator.submit(&submission(4, 169, OpType::Enroll, 2));
        assert_eq!(err, Err(ProtocolError::ParentHashMismatch));
    }

    #[test]
    fn test_coordinator_times_out_pending() {
        struct ForeverPending;
        impl AnchorClient for ForeverPending {
            fn register(&self, _s: &AnchorSubmission) -> Result<SubmissionOutcome> {
                Ok(SubmissionOutcome::Pending {
                    handle: "h-1".into(),
                })
            }
            fn revoke(&self, s: &AnchorSubmission) -> Result<SubmissionOutcome> {
                self.register(s)
            }
            fn update(&self, s: &AnchorSubmission) -> Result<SubmissionOutcome> {
                self.register(s)
            }
            fn get_current_state(&self) -> Result<AnchorStateView> {
                unimplemented!("not used")
            }
            fn poll(&self, _handle: &str) -> Result<SubmissionStatus> {
                Ok(SubmissionStatus::Pending)
            }
        }

        let coordinator = AnchorCoordinator::new(
            Box::new(ForeverPending),
            CoordinatorConfig {
                submission_timeout: Some(Duration::from_millis(50)),
                poll_interval: Duration::from_millis(10),
            },
        );
        let err = coordinator.submit(&submission(4, 9, OpType::Enroll, 1));
        assert!(matches!(err, Err(ProtocolError::AnchorTimeout { .. })));
    }

    #[test]
    fn test_coordinator_resolves_pending_approval() {
        struct ApproveOnSecondPoll {
            polls: Mutex<u32>,
        }
        impl AnchorClient for ApproveOnSecondPoll {
            fn register(&self, _s: &AnchorSubmission) -> Result<SubmissionOutcome> {
                Ok(SubmissionOutcome::Pending {
                    handle: "h-2".into(),
                })
            }
            fn revoke(&self, s: &AnchorSubmission) -> Result<SubmissionOutcome> {
                self.register(s)
            }
            fn update(&self, s: &AnchorSubmission) -> Result<SubmissionOutcome> {
                self.register(s)
            }
            fn get_current_state(&self) -> Result<AnchorStateView> {
                unimplemented!("not used")
            }
            fn poll(&self, _handle: &str) -> Result<SubmissionStatus> {
                let mut polls = self.polls.lock();
                *polls += 1;
                if *polls >= 2 {
                    Ok(SubmissionStatus::Executed { tx: "tx-9".into() })
                } else {
                    Ok(SubmissionStatus::Pending)
                }
            }
        }

        let coordinator = AnchorCoordinator::new(
            Box::new(ApproveOnSecondPoll {
                polls: Mutex::new(0),
            }),
            CoordinatorConfig {
                submission_timeout: Some(Duration::from_secs(5)),
                poll_interval: Duration::from_millis(5),
            },
        );
        let tx = coordinator
            .submit(&submission(4, 9, OpType::Enroll, 1))
            .unwrap();
        assert_eq!(tx, "tx-9");
    }
}
