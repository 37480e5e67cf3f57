//! # Protocol Module
//!
//! The identity protocol: state machine, anchor coordination, witness
//! maintenance, and challenge-response authentication.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ IdentityGateway (exposed core API)                      │
//! ├──────────────┬──────────────────┬───────────────────────┤
//! │ Identity     │ Anchor           │ Challenge-Response    │
//! │ Registry     │ Coordinator      │ Verifier              │
//! │ (state       │ (two-phase       │ (nonces + signature + │
//! │  machine)    │  submission)     │  membership proof)    │
//! ├──────────────┴──────────────────┴───────────────────────┤
//! │ witness refresh · signature collaborator · prime mapper │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Admin transitions are two-phase: the registry stages everything, the
//! coordinator anchors it, and only a confirmed submission commits.

pub mod anchor;
pub mod challenge;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod signature;
pub mod witness;

// Re-export common types at the protocol module level
pub use anchor::{
    AnchorClient, AnchorCoordinator, AnchorStateView, AnchorSubmission, CoordinatorConfig,
    LocalAnchor, RejectKind, SubmissionOutcome, SubmissionStatus,
};
pub use challenge::{AuthFailure, AuthOutcome, ChallengeVerifier};
pub use error::{ProtocolError, Result};
pub use gateway::{
    AuthChallenge, AuthVerdict, DeviceSummary, EnrollReceipt, GatewayConfig, IdentityGateway,
    RevokeReceipt, RootView, WitnessView,
};
pub use registry::{CommitSummary, IdentityRegistry};
pub use signature::{device_id_from_pem, PemSignatureVerifier, SignatureVerifier};
