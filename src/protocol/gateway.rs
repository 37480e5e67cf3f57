//! # Identity Gateway
//!
//! The core API consumed by the HTTP layer: admin operations (enroll /
//! revoke), device authentication (auth_start / auth_verify), and read
//! queries. Wires the identity state machine, the anchor coordinator,
//! the challenge verifier, the prime mapper, and the persistence
//! collaborator together with the concurrency discipline the core
//! promises:
//!
//! - admin operations serialize behind one mutex held across
//!   precompute -> submit -> commit/abort
//! - read paths take a short read lock and observe a consistent snapshot
//!   of the root and the targeted device row
//! - the only blocking waits are the anchor confirmation and the
//!   persistence writes at commit
//!
//! ## Wire encodings
//!
//! Roots and witnesses cross this boundary as 512-char lowercase hex
//! (256 bytes big-endian). Primes are accepted as decimal or `0x`-hex
//! and emitted as decimal (the canonical output form). Signatures arrive
//! base64-encoded; nonces are opaque hex strings signed verbatim.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use num_bigint::BigUint;
use parking_lot::{Mutex, RwLock};
use tracing::{error, info};

use crate::crypto::hash::root_to_bytes;
use crate::crypto::params::AccumulatorParams;
use crate::crypto::prime_map::PrimeMapper;
use crate::models::device::{DeviceId, DeviceStatus, KeyType};
use crate::models::transition::AccumulatorState;
use crate::storage::store::{
    DeviceStore, StoredDevice, META_G_HEX, META_N_HEX, META_ROOT_HEX, META_VERSION,
};

use super::anchor::{AnchorClient, AnchorCoordinator, AnchorSubmission, CoordinatorConfig};
use super::challenge::{AuthOutcome, ChallengeVerifier, DEFAULT_NONCE_TTL};
use super::error::{ProtocolError, Result};
use super::registry::{CommitSummary, IdentityRegistry};
use super::signature::{canonical_spki_der, SignatureVerifier};

// ============================================================================
// Configuration & Views
// ============================================================================

/// Gateway timing knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Lifetime of an issued authentication nonce
    pub nonce_ttl: Duration,
    /// Anchor submission timing
    pub coordinator: CoordinatorConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            nonce_ttl: DEFAULT_NONCE_TTL,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

/// Result of a committed enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollReceipt {
    /// Assigned device identifier
    pub device_id: DeviceId,
    /// The device's prime, decimal
    pub id_prime: String,
    /// The device's witness, 512-char hex
    pub witness: String,
    /// Committed root after the enrollment, 512-char hex
    pub new_root: String,
}

/// Result of a committed revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeReceipt {
    /// Committed root after the revocation, 512-char hex
    pub new_root: String,
}

/// An issued authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Opaque nonce; the device signs exactly these bytes
    pub nonce: String,
    /// Expiry, Unix milliseconds
    pub expires_at: u64,
}

/// Outcome of an authentication attempt, as exposed to the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVerdict {
    /// Whether authentication was granted
    pub ok: bool,
    /// Refreshed witness (512-char hex) when the client's copy was stale
    pub new_witness: Option<String>,
    /// Denial reason when `ok` is false
    pub reason: Option<String>,
}

/// Committed root and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootView {
    /// Current root, 512-char hex
    pub root_hex: String,
    /// Committed version counter
    pub version: u64,
}

/// A device's stored witness and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessView {
    /// Stored witness, 512-char hex
    pub witness_hex: String,
    /// Lifecycle status
    pub status: DeviceStatus,
}

/// One row of the device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    /// Device id hex
    pub device_id: String,
    /// Key algorithm
    pub key_type: String,
    /// Lifecycle status
    pub status: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last-update timestamp (Unix milliseconds)
    pub updated_at: u64,
}

// ============================================================================
// Gateway
// ============================================================================

/// Everything the API layer talks to.
pub struct IdentityGateway {
    params: Arc<AccumulatorParams>,
    registry: RwLock<IdentityRegistry>,
    admin: Mutex<()>,
    coordinator: AnchorCoordinator,
    challenge: ChallengeVerifier,
    store: Box<dyn DeviceStore>,
    mapper: Box<dyn PrimeMapper>,
}

impl IdentityGateway {
    /// Bootstrap a fresh gateway at the genesis state.
    ///
    /// Writes the public parameters and the genesis root/version into the
    /// store's metadata map (the trapdoor is never written).
    pub fn new(
        params: Arc<AccumulatorParams>,
        anchor: Box<dyn AnchorClient>,
        signer: Box<dyn SignatureVerifier>,
        store: Box<dyn DeviceStore>,
        mapper: Box<dyn PrimeMapper>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let registry = IdentityRegistry::new(params.clone())?;
        let gateway = Self {
            params,
            registry: RwLock::new(registry),
            admin: Mutex::new(()),
            coordinator: AnchorCoordinator::new(anchor, config.coordinator),
            challenge: ChallengeVerifier::new(signer, config.nonce_ttl),
            store,
            mapper,
        };
        gateway.bootstrap_metadata()?;
        Ok(gateway)
    }

    /// Rebuild a gateway from persisted rows and metadata.
    ///
    /// The persisted root must match the recomputation from the active
    /// rows; a mismatch means the store diverged and is rejected.
    pub fn resume(
        params: Arc<AccumulatorParams>,
        anchor: Box<dyn AnchorClient>,
        signer: Box<dyn SignatureVerifier>,
        store: Box<dyn DeviceStore>,
        mapper: Box<dyn PrimeMapper>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let devices = store
            .list_devices()?
            .iter()
            .map(|row| row.to_record())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let root_hex = store
            .get_metadata(META_ROOT_HEX)?
            .ok_or_else(|| ProtocolError::invalid("store has no persisted root"))?;
        let version = store
            .get_metadata(META_VERSION)?
            .ok_or_else(|| ProtocolError::invalid("store has no persisted version"))?
            .parse::<u64>()
            .map_err(|_| ProtocolError::invalid("persisted version is not a number"))?;

        let root = parse_hex_value(&root_hex, "root_hex")?;
        let state = AccumulatorState {
            parent_hash: crate::crypto::hash::parent_hash(&root)?,
            root,
            version,
        };

        let registry = IdentityRegistry::from_parts(params.clone(), devices, state)?;
        info!(version, "gateway resumed from persisted state");

        Ok(Self {
            params,
            registry: RwLock::new(registry),
            admin: Mutex::new(()),
            coordinator: AnchorCoordinator::new(anchor, config.coordinator),
            challenge: ChallengeVerifier::new(signer, config.nonce_ttl),
            store,
            mapper,
        })
    }

    fn bootstrap_metadata(&self) -> Result<()> {
        if self.store.get_metadata(META_N_HEX)?.is_none() {
            self.store
                .put_metadata(META_N_HEX, &format!("{:x}", self.params.n()))?;
            self.store
                .put_metadata(META_G_HEX, &format!("{:x}", self.params.g()))?;
        }
        let registry = self.registry.read();
        self.store
            .put_metadata(META_ROOT_HEX, &registry.state().root_hex()?)?;
        self.store
            .put_metadata(META_VERSION, &registry.state().version.to_string())?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Admin operations
    // ------------------------------------------------------------------------

    /// Enroll a device public key.
    ///
    /// Derives the device id and prime, stages the transition, anchors
    /// it, and commits on confirmation. The returned witness is valid for
    /// the returned root.
    pub fn enroll(&self, public_key_pem: &str, key_type: &str) -> Result<EnrollReceipt> {
        let key_type = KeyType::parse(key_type)
            .ok_or_else(|| ProtocolError::invalid(format!("unknown key_type: {}", key_type)))?;
        let der = canonical_spki_der(public_key_pem, key_type)?;
        let device_id = DeviceId::from_spki_der(&der);

        let _admin = self.admin.lock();

        let prime = self.mapper.assign_prime(&der, &self.params)?;
        let record = self.registry.write().begin_enroll(
            device_id,
            public_key_pem.to_string(),
            key_type,
            prime.clone(),
            now_unix_seconds(),
        )?;
        let submission = AnchorSubmission::from_transition(&record)?;

        match self.coordinator.submit(&submission) {
            Ok(_tx) => {
                let summary = self.registry.write().commit(record.operation_id)?;
                self.persist_commit(&summary)?;
                Ok(EnrollReceipt {
                    device_id,
                    id_prime: prime.to_str_radix(10),
                    witness: encode_hex_value(&record.prev_root)?,
                    new_root: encode_hex_value(&record.next_root)?,
                })
            }
            Err(err) => {
                self.registry.write().abort(record.operation_id)?;
                self.persist_audit_row(&device_id);
                Err(err)
            }
        }
    }

    /// Revoke an active device.
    pub fn revoke(&self, device_id: &str) -> Result<RevokeReceipt> {
        let device_id = parse_device_id(device_id)?;

        let _admin = self.admin.lock();

        let record = self
            .registry
            .write()
            .begin_revoke(device_id, now_unix_seconds())?;
        let submission = AnchorSubmission::from_transition(&record)?;

        match self.coordinator.submit(&submission) {
            Ok(_tx) => {
                let summary = self.registry.write().commit(record.operation_id)?;
                self.persist_commit(&summary)?;
                Ok(RevokeReceipt {
                    new_root: encode_hex_value(&record.next_root)?,
                })
            }
            Err(err) => {
                self.registry.write().abort(record.operation_id)?;
                self.persist_audit_row(&device_id);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Device authentication
    // ------------------------------------------------------------------------

    /// Issue a single-use nonce for an active device.
    pub fn auth_start(&self, device_id: &str) -> Result<AuthChallenge> {
        let device_id = parse_device_id(device_id)?;
        let device = {
            let registry = self.registry.read();
            registry
                .device(&device_id)
                .cloned()
                .ok_or_else(|| ProtocolError::NotFound {
                    device_id: device_id.to_hex(),
                })?
        };
        let (nonce, expires_at) = self.challenge.start(&device)?;
        Ok(AuthChallenge { nonce, expires_at })
    }

    /// Verify an authentication attempt.
    ///
    /// Never errors for a failed attempt: denials and stale-witness
    /// refreshes are verdicts, not errors. Errors are reserved for
    /// malformed inputs and unknown devices.
    pub fn auth_verify(
        &self,
        device_id: &str,
        prime: &str,
        witness_hex: &str,
        signature_b64: &str,
        nonce: &str,
    ) -> Result<AuthVerdict> {
        let device_id = parse_device_id(device_id)?;
        let prime = parse_prime(prime)?;
        let witness = parse_hex_value(witness_hex, "witness")?;
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature_b64)
            .map_err(|_| ProtocolError::invalid("signature is not valid base64"))?;

        // one read lock: the root and the device row come from the same
        // committed snapshot
        let (device, root) = {
            let registry = self.registry.read();
            let device = registry
                .device(&device_id)
                .cloned()
                .ok_or_else(|| ProtocolError::NotFound {
                    device_id: device_id.to_hex(),
                })?;
            (device, registry.state().root.clone())
        };

        let outcome = self.challenge.verify(
            &device,
            &prime,
            &witness,
            &signature,
            nonce.as_bytes(),
            &root,
            &self.params,
        );

        Ok(match outcome {
            AuthOutcome::Granted => AuthVerdict {
                ok: true,
                new_witness: None,
                reason: None,
            },
            AuthOutcome::StaleWitness { witness } => AuthVerdict {
                ok: false,
                new_witness: Some(encode_hex_value(&witness)?),
                reason: Some("STALE_WITNESS".to_string()),
            },
            AuthOutcome::Denied { reason } => AuthVerdict {
                ok: false,
                new_witness: None,
                reason: Some(reason.as_str().to_string()),
            },
        })
    }

    // ------------------------------------------------------------------------
    // Read queries
    // ------------------------------------------------------------------------

    /// Current committed root and version.
    pub fn get_root(&self) -> Result<RootView> {
        let registry = self.registry.read();
        Ok(RootView {
            root_hex: registry.state().root_hex()?,
            version: registry.state().version,
        })
    }

    /// A device's stored witness and status.
    pub fn get_witness(&self, device_id: &str) -> Result<WitnessView> {
        let device_id = parse_device_id(device_id)?;
        let registry = self.registry.read();
        let device = registry
            .device(&device_id)
            .ok_or_else(|| ProtocolError::NotFound {
                device_id: device_id.to_hex(),
            })?;
        Ok(WitnessView {
            witness_hex: encode_hex_value(&device.witness)?,
            status: device.status,
        })
    }

    /// List devices, optionally filtered by status.
    pub fn get_devices(&self, filter: Option<DeviceStatus>) -> Vec<DeviceSummary> {
        let registry = self.registry.read();
        let mut rows: Vec<DeviceSummary> = registry
            .devices()
            .filter(|d| filter.map_or(true, |f| d.status == f))
            .map(|d| DeviceSummary {
                device_id: d.device_id.to_hex(),
                key_type: d.key_type.as_str().to_string(),
                status: d.status.as_str().to_string(),
                created_at: d.created_at,
                updated_at: d.updated_at,
            })
            .collect();
        rows.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        rows
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Write every row a commit touched, plus the root/version metadata.
    ///
    /// A failure here is fatal: the in-memory state and the anchor have
    /// already advanced, so the store now lags and reconciliation is
    /// human-driven.
    fn persist_commit(&self, summary: &CommitSummary) -> Result<()> {
        let registry = self.registry.read();
        for id in &summary.touched {
            if let Some(record) = registry.device(id) {
                let row = StoredDevice::from_record(record)?;
                if let Err(err) = self.store.put_device(&row) {
                    error!(device_id = %id, error = %err, "FATAL: store diverged from committed state");
                    return Err(err.into());
                }
            }
        }
        self.store
            .put_metadata(META_ROOT_HEX, &registry.state().root_hex()?)?;
        self.store
            .put_metadata(META_VERSION, &registry.state().version.to_string())?;
        Ok(())
    }

    /// Best-effort persistence of an aborted operation's audit row.
    fn persist_audit_row(&self, device_id: &DeviceId) {
        let registry = self.registry.read();
        if let Some(record) = registry.device(device_id) {
            if let Ok(row) = StoredDevice::from_record(record) {
                let _ = self.store.put_device(&row);
            }
        }
    }
}

// ============================================================================
// Parsing Helpers
// ============================================================================

fn now_unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn parse_device_id(value: &str) -> Result<DeviceId> {
    DeviceId::from_hex(value)
        .ok_or_else(|| ProtocolError::invalid("device_id must be 64 hex characters"))
}

/// Primes are accepted as decimal or `0x`-prefixed hex.
fn parse_prime(value: &str) -> Result<BigUint> {
    let trimmed = value.trim();
    let parsed = if let Some(hex_digits) = trimmed.strip_prefix("0x") {
        BigUint::parse_bytes(hex_digits.as_bytes(), 16)
    } else {
        BigUint::parse_bytes(trimmed.as_bytes(), 10)
    };
    parsed.ok_or_else(|| ProtocolError::invalid("prime must be decimal or 0x-hex"))
}

fn parse_hex_value(value: &str, what: &str) -> Result<BigUint> {
    let trimmed = value.trim().trim_start_matches("0x");
    BigUint::parse_bytes(trimmed.as_bytes(), 16)
        .ok_or_else(|| ProtocolError::invalid(format!("{} is not valid hex", what)))
}

fn encode_hex_value(value: &BigUint) -> Result<String> {
    Ok(hex::encode(root_to_bytes(value)?))
}

// ============================================================================
// Tests
// ============================================================================
