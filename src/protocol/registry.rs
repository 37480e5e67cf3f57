//! # Identity State Machine
//!
//! The authoritative in-memory model: the device table, the accumulator
//! state, and at most one staged transition awaiting anchor confirmation.
//!
//! ## Two-phase transitions
//!
//! `begin_enroll` / `begin_revoke` compute the candidate next root, the
//! device-row changes, and every affected witness — then stage all of it
//! without touching committed state. The anchor coordinator submits the
//! produced [`TransitionRecord`]; only `commit` applies the staged
//! changes, and `abort` discards them. A failure anywhere between begin
//! and commit therefore leaves the machine exactly as it was.
//!
//! ## Invariants after every commit
//!
//! - I1: `1 <= root < N` and `gcd(root, N) = 1`
//! - I2: every ACTIVE device satisfies `witness^id_prime ≡ root (mod N)`
//! - I3: ACTIVE primes are pairwise distinct and coprime to lambda(N)
//! - I4: `root = g^(prod of ACTIVE primes) mod N`
//! - I5: `version` counts committed transitions
//! - I6: `parent_hash = keccak256(be_bytes(root, 256))`
//!
//! [`IdentityRegistry::check_invariants`] verifies I1-I4 and I6 directly;
//! commits debug-assert it. A violation in committed state is a bug, not
//! a user error.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::One;
use tracing::{debug, info, warn};

use crate::crypto::accumulator::{add, recompute_from_set, remove_single, verify};
use crate::crypto::bigint::gcd;
use crate::crypto::hash::{parent_hash, root_to_bytes};
use crate::crypto::params::AccumulatorParams;
use crate::models::device::{DeviceId, DeviceRecord, DeviceStatus, KeyType};
use crate::models::transition::{
    derive_operation_id, AccumulatorState, OpType, TransitionRecord,
};

use super::error::{ProtocolError, Result};
use super::witness::{refresh_all_after_removal, refresh_on_add};

// ============================================================================
// Staged Transition
// ============================================================================

/// Everything a commit will apply, computed at begin time.
#[derive(Debug, Clone)]
struct StagedTransition {
    record: TransitionRecord,
    /// Status the subject device moves to on commit
    target_status: DeviceStatus,
    /// Refreshed witnesses for the *other* active devices
    witnesses: Vec<(DeviceId, BigUint)>,
}

/// Summary of a committed transition, for the caller's persistence pass.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    /// The transition that was applied
    pub record: TransitionRecord,
    /// Every device row touched by the commit (subject device included)
    pub touched: Vec<DeviceId>,
    /// Version after the commit
    pub version: u64,
}

// ============================================================================
// Identity Registry
// ============================================================================

/// Owner of the device table and the accumulator state.
///
/// All mutation goes through this type; the accumulator algebra and
/// witness modules stay pure. Callers serialize admin operations (the
/// gateway holds a mutex across begin -> submit -> commit/abort).
pub struct IdentityRegistry {
    params: Arc<AccumulatorParams>,
    devices: HashMap<DeviceId, DeviceRecord>,
    state: AccumulatorState,
    staged: Option<StagedTransition>,
}

impl IdentityRegistry {
    /// Fresh registry at the genesis state (root = g, version 0).
    pub fn new(params: Arc<AccumulatorParams>) -> Result<Self> {
        let state = AccumulatorState::genesis(params.g())?;
        Ok(Self {
            params,
            devices: HashMap::new(),
            state,
            staged: None,
        })
    }

    /// Rebuild a registry from persisted rows and state.
    ///
    /// Verifies I4 before accepting: the supplied root must equal the
    /// recomputation from the active rows.
    pub fn from_parts(
        params: Arc<AccumulatorParams>,
        devices: Vec<DeviceRecord>,
        state: AccumulatorState,
    ) -> Result<Self> {
        let registry = Self {
            params,
            devices: devices.into_iter().map(|d| (d.device_id, d)).collect(),
            state,
            staged: None,
        };
        registry
            .check_invariants()
            .map_err(ProtocolError::invalid)?;
        Ok(registry)
    }

    // ------------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------------

    /// Committed accumulator state.
    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Global parameters.
    pub fn params(&self) -> &AccumulatorParams {
        &self.params
    }

    /// Look up a device row.
    pub fn device(&self, device_id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(device_id)
    }

    /// All device rows, unordered.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// `(id, prime)` of every ACTIVE device.
    pub fn active_members(&self) -> Vec<(DeviceId, BigUint)> {
        self.devices
            .values()
            .filter(|d| d.status.is_active())
            .map(|d| (d.device_id, d.id_prime.clone()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Stage an enrollment.
    ///
    /// Inserts the device as PENDING, computes the candidate root
    /// `add(root, prime)`, assigns the pre-update root as the device's
    /// witness, and precomputes the witness update for every currently
    /// active device. Nothing is applied until [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// `AlreadyEnrolled` if a row with this id exists in any status.
    pub fn begin_enroll(
        &mut self,
        device_id: DeviceId,
        public_key_pem: String,
        key_type: KeyType,
        prime: BigUint,
        now_unix_seconds: u64,
    ) -> Result<TransitionRecord> {
        assert!(
            self.staged.is_none(),
            "transition staged while another is outstanding; admin operations must serialize"
        );
        if self.devices.contains_key(&device_id) {
            return Err(ProtocolError::AlreadyEnrolled {
                device_id: device_id.to_hex(),
            });
        }

        let prev_root = self.state.root.clone();
        let next_root = add(&self.params, &prev_root, &prime)?;

        // staged witness refresh for the existing members
        let mut witnesses = Vec::new();
        for member in self.devices.values().filter(|d| d.status.is_active()) {
            let refreshed = refresh_on_add(&self.params, &member.witness, &prime)?;
            witnesses.push((member.device_id, refreshed));
        }

        let record = TransitionRecord {
            op_type: OpType::Enroll,
            device_id,
            prev_root: prev_root.clone(),
            next_root: next_root.clone(),
            parent_hash: self.state.parent_hash,
            operation_id: derive_operation_id(
                now_unix_seconds,
                &root_to_bytes(&next_root)?,
                &self.state.parent_hash,
            ),
        };

        // the new member's witness is the pre-update root
        self.devices.insert(
            device_id,
            DeviceRecord::new(device_id, public_key_pem, key_type, prime, prev_root),
        );
        self.staged = Some(StagedTransition {
            record: record.clone(),
            target_status: DeviceStatus::Active,
            witnesses,
        });

        debug!(device_id = %device_id, version = self.state.version, "enrollment staged");
        Ok(record)
    }

    /// Stage a revocation.
    ///
    /// Computes the candidate root by trapdoor removal, marks the device
    /// PENDING_REVOKE, and precomputes trapdoor-refreshed witnesses for
    /// every other active device from the candidate root.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no row exists
    /// - `NotActive` if the row is not ACTIVE
    pub fn begin_revoke(
        &mut self,
        device_id: DeviceId,
        now_unix_seconds: u64,
    ) -> Result<TransitionRecord> {
        assert!(
            self.staged.is_none(),
            "transition staged while another is outstanding; admin operations must serialize"
        );
        let device = self
            .devices
            .get(&device_id)
            .ok_or_else(|| ProtocolError::NotFound {
                device_id: device_id.to_hex(),
            })?;
        if !device.status.is_active() {
            return Err(ProtocolError::NotActive {
                device_id: device_id.to_hex(),
                status: device.status.as_str().to_string(),
            });
        }

        let prev_root = self.state.root.clone();
        let next_root = remove_single(&self.params, &prev_root, &device.id_prime)?;

        let remaining: Vec<(DeviceId, BigUint)> = self
            .devices
            .values()
            .filter(|d| d.status.is_active() && d.device_id != device_id)
            .map(|d| (d.device_id, d.id_prime.clone()))
            .collect();
        let witnesses = refresh_all_after_removal(&self.params, &next_root, &remaining)?;

        let record = TransitionRecord {
            op_type: OpType::Revoke,
            device_id,
            prev_root,
            next_root: next_root.clone(),
            parent_hash: self.state.parent_hash,
            operation_id: derive_operation_id(
                now_unix_seconds,
                &root_to_bytes(&next_root)?,
                &self.state.parent_hash,
            ),
        };

        let device = self.devices.get_mut(&device_id).expect("checked above");
        device.status = DeviceStatus::PendingRevoke;
        device.touch();

        self.staged = Some(StagedTransition {
            record: record.clone(),
            target_status: DeviceStatus::Revoked,
            witnesses,
        });

        debug!(device_id = %device_id, version = self.state.version, "revocation staged");
        Ok(record)
    }

    /// Apply the staged transition: advance the root / version / parent
    /// hash, move the subject device to its target status, and write the
    /// precomputed witnesses.
    pub fn commit(&mut self, operation_id: [u8; 32]) -> Result<CommitSummary> {
        let staged = self
            .staged
            .take()
            .expect("commit without a staged transition");
        assert_eq!(
            staged.record.operation_id, operation_id,
            "commit for a different operation than the staged one"
        );

        self.state.advance(staged.record.next_root.clone())?;

        let mut touched = vec![staged.record.device_id];
        if let Some(device) = self.devices.get_mut(&staged.record.device_id) {
            device.status = staged.target_status;
            device.touch();
        }
        for (id, witness) in &staged.witnesses {
            if let Some(device) = self.devices.get_mut(id) {
                device.witness = witness.clone();
                device.touch();
                touched.push(*id);
            }
        }

        info!(
            op = staged.record.op_type.as_str(),
            device_id = %staged.record.device_id,
            version = self.state.version,
            operation_id = %hex::encode(operation_id),
            "transition committed"
        );

        debug_assert!(
            self.check_invariants().is_ok(),
            "invariant violation after commit: {:?}",
            self.check_invariants()
        );

        Ok(CommitSummary {
            record: staged.record,
            touched,
            version: self.state.version,
        })
    }

    /// Discard the staged transition.
    ///
    /// A pending enrollment becomes a REVOKED audit row (its prime is
    /// burned); a pending revocation returns the device to ACTIVE.
    /// Committed state is untouched.
    pub fn abort(&mut self, operation_id: [u8; 32]) -> Result<()> {
        let staged = self
            .staged
            .take()
            .expect("abort without a staged transition");
        assert_eq!(
            staged.record.operation_id, operation_id,
            "abort for a different operation than the staged one"
        );

        if let Some(device) = self.devices.get_mut(&staged.record.device_id) {
            device.status = match staged.record.op_type {
                OpType::Enroll => DeviceStatus::Revoked,
                OpType::Revoke => DeviceStatus::Active,
            };
            device.touch();
        }

        warn!(
            op = staged.record.op_type.as_str(),
            device_id = %staged.record.device_id,
            operation_id = %hex::encode(operation_id),
            "transition aborted"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------------

    /// Check I1-I4 and I6 against the committed state.
    ///
    /// Returns a description of the first violation found. Tests call
    /// this after every scenario step; commits debug-assert it.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let n = self.params.n();

        // I1: root canonical and a unit
        if self.state.root < BigUint::one() || &self.state.root >= n {
            return Err("I1: root outside [1, N)".into());
        }
        if !gcd(&self.state.root, n).is_one() {
            return Err("I1: root shares a factor with N".into());
        }

        let lambda = self.params.lambda();
        let mut primes = Vec::new();
        for device in self.devices.values().filter(|d| d.status.is_active()) {
            // I2: witness verifies against the committed root
            if !verify(
                &self.params,
                &device.witness,
                &device.id_prime,
                &self.state.root,
            ) {
                return Err(format!("I2: witness stale for {}", device.device_id));
            }
            // I3: coprime to lambda
            if !gcd(&device.id_prime, &lambda).is_one() {
                return Err(format!("I3: prime shares a factor with lambda for {}", device.device_id));
            }
            primes.push(device.id_prime.clone());
        }

        // I3: pairwise distinct
        let mut deduped = primes.clone();
        deduped.sort();
        deduped.dedup();
        if deduped.len() != primes.len() {
            return Err("I3: duplicate active primes".into());
        }

        // I4: root equals recomputation from the active set
        let recomputed = recompute_from_set(&self.params, primes.iter())
            .map_err(|e| format!("I4: recompute failed: {}", e))?;
        if recomputed != self.state.root {
            return Err("I4: root does not match the active set".into());
        }

        // I6: parent hash tracks the root encoding
        let expected = parent_hash(&self.state.root).map_err(|e| e.to_string())?;
        if expected != self.state.parent_hash {
            return Err("I6: parent hash does not match the root".into());
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn registry() -> IdentityRegistry {
        IdentityRegistry::new(Arc::new(AccumulatorParams::toy())).unwrap()
    }

    fn enroll(reg: &mut IdentityRegistry, tag: &[u8], prime: u32) -> DeviceId {
        let id = DeviceId::from_spki_der(tag);
        let record = reg
            .begin_enroll(
                id,
                String::from_utf8_lossy(tag).into_owned(),
                KeyType::Ed25519,
                BigUint::from(prime),
                NOW,
            )
            .unwrap();
        reg.commit(record.operation_id).unwrap();
        id
    }

    fn p(v: u32) -> BigUint {
        BigUint::from(v)
    }

    // ------------------------------------------------------------------------
    // Enrollment Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_enroll_first_device() {
        let mut reg = registry();
        let id = DeviceId::from_spki_der(b"first");
        let record = reg
            .begin_enroll(id, "pem".into(), KeyType::Ed25519, p(13), NOW)
            .unwrap();

        // staged, not committed
        assert_eq!(reg.state().version, 0);
        assert_eq!(reg.device(&id).unwrap().status, DeviceStatus::Pending);
        assert_eq!(record.prev_root, p(4));
        assert_eq!(record.next_root, p(9)); // 4^13 mod 209

        let summary = reg.commit(record.operation_id).unwrap();
        assert_eq!(summary.version, 1);
        assert_eq!(reg.state().version, 1);
        assert_eq!(reg.state().root, p(9));
        assert_eq!(reg.device(&id).unwrap().status, DeviceStatus::Active);
        // witness-at-enrollment is the pre-update root, here g
        assert_eq!(reg.device(&id).unwrap().witness, p(4));
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_enroll_refreshes_existing_witnesses() {
        let mut reg = registry();
        let a = enroll(&mut reg, b"device-a", 13);
        let b = enroll(&mut reg, b"device-b", 17);
        let c = enroll(&mut reg, b"device-c", 23);

        // roots 9 -> 169 -> 196; final witnesses 180 / 168 / 169
        assert_eq!(reg.state().root, p(196));
        assert_eq!(reg.state().version, 3);
        assert_eq!(reg.device(&a).unwrap().witness, p(180));
        assert_eq!(reg.device(&b).unwrap().witness, p(168));
        assert_eq!(reg.device(&c).unwrap().witness, p(169));
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_enroll_duplicate_rejected() {
        let mut reg = registry();
        enroll(&mut reg, b"dup", 13);

        let id = DeviceId::from_spki_der(b"dup");
        let err = reg.begin_enroll(id, "pem".into(), KeyType::Ed25519, p(17), NOW);
        assert!(matches!(err, Err(ProtocolError::AlreadyEnrolled { .. })));
    }

    #[test]
    fn test_reenroll_after_revoke_rejected() {
        // revoked rows keep their id; the prime is burned
        let mut reg = registry();
        let id = enroll(&mut reg, b"burned", 13);
        let record = reg.begin_revoke(id, NOW).unwrap();
        reg.commit(record.operation_id).unwrap();

        let err = reg.begin_enroll(id, "pem".into(), KeyType::Ed25519, p(17), NOW);
        assert!(matches!(err, Err(ProtocolError::AlreadyEnrolled { .. })));
    }

    #[test]
    fn test_enroll_abort_burns_row() {
        let mut reg = registry();
        let id = DeviceId::from_spki_der(b"aborted");
        let record = reg
            .begin_enroll(id, "pem".into(), KeyType::Ed25519, p(13), NOW)
            .unwrap();
        reg.abort(record.operation_id).unwrap();

        assert_eq!(reg.state().version, 0);
        assert_eq!(reg.state().root, p(4));
        assert_eq!(reg.device(&id).unwrap().status, DeviceStatus::Revoked);
        assert!(reg.check_invariants().is_ok());
    }

    // ------------------------------------------------------------------------
    // Revocation Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_revoke_refreshes_remaining() {
        let mut reg = registry();
        let a = enroll(&mut reg, b"device-a", 13);
        let b = enroll(&mut reg, b"device-b", 17);
        let c = enroll(&mut reg, b"device-c", 23);

        let record = reg.begin_revoke(b, NOW).unwrap();
        assert_eq!(record.next_root, p(168)); // 4^(13*23) mod 209
        assert_eq!(
            reg.device(&b).unwrap().status,
            DeviceStatus::PendingRevoke
        );

        reg.commit(record.operation_id).unwrap();
        assert_eq!(reg.state().root, p(168));
        assert_eq!(reg.device(&b).unwrap().status, DeviceStatus::Revoked);
        assert_eq!(reg.device(&a).unwrap().witness, p(207)); // 4^23
        assert_eq!(reg.device(&c).unwrap().witness, p(9)); // 4^13
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_revoke_only_member_restores_generator() {
        let mut reg = registry();
        let id = enroll(&mut reg, b"solo", 13);
        let record = reg.begin_revoke(id, NOW).unwrap();
        reg.commit(record.operation_id).unwrap();

        assert_eq!(reg.state().root, p(4));
        assert!(reg.active_members().is_empty());
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_revoke_requires_active() {
        let mut reg = registry();
        let unknown = DeviceId::from_spki_der(b"ghost");
        assert!(matches!(
            reg.begin_revoke(unknown, NOW),
            Err(ProtocolError::NotFound { .. })
        ));

        let id = enroll(&mut reg, b"twice", 13);
        let record = reg.begin_revoke(id, NOW).unwrap();
        reg.commit(record.operation_id).unwrap();
        assert!(matches!(
            reg.begin_revoke(id, NOW),
            Err(ProtocolError::NotActive { .. })
        ));
    }

    #[test]
    fn test_revoke_abort_restores_active() {
        let mut reg = registry();
        let a = enroll(&mut reg, b"keeper", 13);
        let b = enroll(&mut reg, b"survivor", 17);

        let before_root = reg.state().root.clone();
        let before_witness = reg.device(&b).unwrap().witness.clone();

        let record = reg.begin_revoke(a, NOW).unwrap();
        reg.abort(record.operation_id).unwrap();

        assert_eq!(reg.state().root, before_root);
        assert_eq!(reg.device(&a).unwrap().status, DeviceStatus::Active);
        assert_eq!(reg.device(&b).unwrap().witness, before_witness);
        assert!(reg.check_invariants().is_ok());
    }

    // ------------------------------------------------------------------------
    // Round-trip Law (L3)
    // ------------------------------------------------------------------------

    #[test]
    fn test_enroll_then_revoke_restores_prior_state() {
        let mut reg = registry();
        let a = enroll(&mut reg, b"stable", 13);
        let root_before = reg.state().root.clone();
        let witness_before = reg.device(&a).unwrap().witness.clone();

        let b = enroll(&mut reg, b"transient", 17);
        assert_ne!(reg.state().root, root_before);

        let record = reg.begin_revoke(b, NOW).unwrap();
        reg.commit(record.operation_id).unwrap();

        assert_eq!(reg.state().root, root_before);
        assert_eq!(reg.device(&a).unwrap().witness, witness_before);
        // version keeps counting: three commits happened
        assert_eq!(reg.state().version, 3);
        assert!(reg.check_invariants().is_ok());
    }

    // ------------------------------------------------------------------------
    // Restore Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_from_parts_checks_consistency() {
        let mut reg = registry();
        enroll(&mut reg, b"persisted", 13);

        let params = Arc::new(AccumulatorParams::toy());
        let devices: Vec<DeviceRecord> = reg.devices().cloned().collect();
        let restored =
            IdentityRegistry::from_parts(params.clone(), devices.clone(), reg.state().clone());
        assert!(restored.is_ok());

        // corrupt root is rejected
        let mut bad_state = reg.state().clone();
        bad_state.root = p(7);
        bad_state.parent_hash = parent_hash(&p(7)).unwrap();
        let err = IdentityRegistry::from_parts(params, devices, bad_state);
        assert!(matches!(err, Err(ProtocolError::InvalidInput { .. })));
    }

    #[test]
    fn test_parent_hash_tracks_commits() {
        let mut reg = registry();
        let h0 = reg.state().parent_hash;
        enroll(&mut reg, b"hash-probe", 13);
        let h1 = reg.state().parent_hash;
        assert_ne!(h0, h1);
        assert_eq!(h1, parent_hash(&reg.state().root).unwrap());
    }
}
