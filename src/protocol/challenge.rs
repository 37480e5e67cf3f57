//! # Challenge-Response Verifier
//!
//! Issues single-use nonces bound to a device and verifies the combined
//! authentication claim: a signature over the fresh nonce plus a
//! membership proof against the current accumulator root.
//!
//! ## Nonce discipline
//!
//! One outstanding nonce per device, 128 random bits, fixed TTL
//! (default 300 s), consumed on the first verification attempt even when
//! a later check fails. Expiry is checked lazily at verification time and
//! stale entries are pruned when new nonces are issued.
//!
//! ## Stale-witness recovery
//!
//! When the client's witness fails against the current root but the
//! server-side stored witness verifies, the stored witness is
//! authoritative: the outcome is [`AuthOutcome::StaleWitness`], carrying
//! the fresh witness, and authentication is *denied* for this attempt.
//! The client retries with the refreshed witness. The state machine's
//! witness store is only ever updated by the admin paths.

use std::collections::HashMap;
use std::time::Duration;

use num_bigint::BigUint;
use parking_lot::Mutex;
use tracing::debug;

use crate::crypto::accumulator;
use crate::crypto::params::AccumulatorParams;
use crate::models::device::{current_timestamp_ms, DeviceId, DeviceRecord};

use super::error::{ProtocolError, Result};
use super::signature::SignatureVerifier;

/// Nonce length: 128 random bits.
pub const NONCE_BYTES: usize = 16;

/// Default nonce lifetime.
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(300);

// ============================================================================
// Outcomes
// ============================================================================

/// Which authentication check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Device is not ACTIVE
    NotActive,
    /// No nonce outstanding, or the echo does not match the issued nonce
    UnknownNonce,
    /// The nonce's TTL elapsed
    NonceExpired,
    /// The nonce was already consumed
    NonceConsumed,
    /// Submitted prime differs from the enrolled prime
    PrimeMismatch,
    /// Signature over the nonce failed to verify
    BadSignature,
    /// Membership proof failed and no refresh is available
    BadProof,
}

impl AuthFailure {
    /// Human-readable reason (no internals)
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::NotActive => "device is not active",
            AuthFailure::UnknownNonce => "nonce is missing or not issued for this device",
            AuthFailure::NonceExpired => "nonce has expired",
            AuthFailure::NonceConsumed => "nonce was already used",
            AuthFailure::PrimeMismatch => "submitted prime does not match enrollment",
            AuthFailure::BadSignature => "signature verification failed",
            AuthFailure::BadProof => "membership proof failed",
        }
    }
}

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Signature and membership proof both valid
    Granted,
    /// Proof failed against the current root, but the stored witness
    /// verifies: authentication denied, refreshed witness attached
    StaleWitness {
        /// The authoritative server-side witness
        witness: BigUint,
    },
    /// Authentication denied with no refresh
    Denied {
        /// Which check failed
        reason: AuthFailure,
    },
}

// ============================================================================
// Verifier
// ============================================================================

struct NonceEntry {
    nonce_hex: String,
    expires_at: u64,
    consumed: bool,
}

/// Nonce table plus the verification sequence.
///
/// Process-wide state scoped to one instance; the gateway owns exactly
/// one.
pub struct ChallengeVerifier {
    verifier: Box<dyn SignatureVerifier>,
    ttl: Duration,
    nonces: Mutex<HashMap<DeviceId, NonceEntry>>,
}

impl ChallengeVerifier {
    /// Create a verifier with the given signature collaborator and TTL.
    pub fn new(verifier: Box<dyn SignatureVerifier>, ttl: Duration) -> Self {
        Self {
            verifier,
            ttl,
            nonces: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a nonce for an ACTIVE device.
    ///
    /// Returns the hex-encoded nonce (the exact bytes the device must
    /// sign) and its expiry as Unix milliseconds.
    ///
    /// # Errors
    ///
    /// `NotActive` when the device is not ACTIVE.
    pub fn start(&self, device: &DeviceRecord) -> Result<(String, u64)> {
        if !device.status.is_active() {
            return Err(ProtocolError::NotActive {
                device_id: device.device_id.to_hex(),
                status: device.status.as_str().to_string(),
            });
        }

        let mut raw = [0u8; NONCE_BYTES];
        getrandom::getrandom(&mut raw)
            .map_err(|e| ProtocolError::invalid(format!("nonce generation failed: {}", e)))?;
        let nonce_hex = hex::encode(raw);
        let expires_at = current_timestamp_ms() + self.ttl.as_millis() as u64;

        let mut nonces = self.nonces.lock();
        let now = current_timestamp_ms();
        nonces.retain(|_, entry| entry.expires_at > now && !entry.consumed);
        nonces.insert(
            device.device_id,
            NonceEntry {
                nonce_hex: nonce_hex.clone(),
                expires_at,
                consumed: false,
            },
        );

        debug!(device_id = %device.device_id, "auth nonce issued");
        Ok((nonce_hex, expires_at))
    }

    /// Run the verification sequence against a snapshot of the device
    /// record and the committed root.
    ///
    /// Checks in order, short-circuiting on the first failure: device
    /// status, nonce validity (consuming it), prime match, signature over
    /// the echoed nonce bytes, membership proof with stale-witness
    /// fallback.
    pub fn verify(
        &self,
        device: &DeviceRecord,
        prime: &BigUint,
        witness: &BigUint,
        signature: &[u8],
        nonce_echo: &[u8],
        current_root: &BigUint,
        params: &AccumulatorParams,
    ) -> AuthOutcome {
        // 1. status
        if !device.status.is_active() {
            return AuthOutcome::Denied {
                reason: AuthFailure::NotActive,
            };
        }

        // 2-3. nonce lookup; consumed on first use regardless of what
        // the remaining checks decide
        if let Some(reason) = self.take_nonce(&device.device_id, nonce_echo) {
            return AuthOutcome::Denied { reason };
        }

        // 4. prime binding
        if prime != &device.id_prime {
            return AuthOutcome::Denied {
                reason: AuthFailure::PrimeMismatch,
            };
        }

        // 5. signature over the exact bytes issued by start()
        if !self.verifier.verify_signature(
            nonce_echo,
            signature,
            &device.public_key_pem,
            device.key_type,
        ) {
            return AuthOutcome::Denied {
                reason: AuthFailure::BadSignature,
            };
        }

        // 6. membership proof with stale-witness fallback
        if accumulator::verify(params, witness, prime, current_root) {
            debug!(device_id = %device.device_id, "authentication granted");
            return AuthOutcome::Granted;
        }
        if accumulator::verify(params, &device.witness, prime, current_root) {
            debug!(device_id = %device.device_id, "stale witness; refresh returned");
            return AuthOutcome::StaleWitness {
                witness: device.witness.clone(),
            };
        }
        AuthOutcome::Denied {
            reason: AuthFailure::BadProof,
        }
    }

    /// Validate and consume the nonce entry. Returns the failure, if any.
    fn take_nonce(&self, device_id: &DeviceId, nonce_echo: &[u8]) -> Option<AuthFailure> {
        let mut nonces = self.nonces.lock();
        let entry = match nonces.get_mut(device_id) {
            Some(entry) => entry,
            None => return Some(AuthFailure::UnknownNonce),
        };

        if entry.expires_at <= current_timestamp_ms() {
            nonces.remove(device_id);
            return Some(AuthFailure::NonceExpired);
        }
        if entry.consumed {
            return Some(AuthFailure::NonceConsumed);
        }

        // single-use from this point on, even if a later check fails
        entry.consumed = true;

        if entry.nonce_hex.as_bytes() != nonce_echo {
            return Some(AuthFailure::UnknownNonce);
        }
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::accumulator::add;
    use crate::models::device::{DeviceStatus, KeyType};

    /// Signature collaborator stub with a fixed verdict.
    struct FixedVerdict(bool);
    impl SignatureVerifier for FixedVerdict {
        fn verify_signature(&self, _m: &[u8], _s: &[u8], _p: &str, _k: KeyType) -> bool {
            self.0
        }
    }

    fn active_device(params: &AccumulatorParams) -> (DeviceRecord, BigUint) {
        // sole member with prime 13: root = 9, witness = g = 4
        let root = add(params, params.g(), &BigUint::from(13u32)).unwrap();
        let mut record = DeviceRecord::new(
            DeviceId::from_spki_der(b"challenge-device"),
            "pem".into(),
            KeyType::Ed25519,
            BigUint::from(13u32),
            params.g().clone(),
        );
        record.status = DeviceStatus::Active;
        (record, root)
    }

    fn verifier(accept: bool) -> ChallengeVerifier {
        ChallengeVerifier::new(Box::new(FixedVerdict(accept)), DEFAULT_NONCE_TTL)
    }

    #[test]
    fn test_happy_path_then_nonce_consumed() {
        let params = AccumulatorParams::toy();
        let (device, root) = active_device(&params);
        let challenge = verifier(true);

        let (nonce, expires_at) = challenge.start(&device).unwrap();
        assert_eq!(nonce.len(), NONCE_BYTES * 2);
        assert!(expires_at > current_timestamp_ms());

        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            nonce.as_bytes(),
            &root,
            &params,
        );
        assert_eq!(outcome, AuthOutcome::Granted);

        // replay with the same nonce is denied
        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            nonce.as_bytes(),
            &root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::Denied {
                reason: AuthFailure::NonceConsumed
            }
        );
    }

    #[test]
    fn test_start_requires_active() {
        let params = AccumulatorParams::toy();
        let (mut device, _) = active_device(&params);
        device.status = DeviceStatus::PendingRevoke;

        let err = verifier(true).start(&device);
        assert!(matches!(err, Err(ProtocolError::NotActive { .. })));
    }

    #[test]
    fn test_missing_nonce_denied() {
        let params = AccumulatorParams::toy();
        let (device, root) = active_device(&params);
        let challenge = verifier(true);

        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            b"deadbeefdeadbeefdeadbeefdeadbeef",
            &root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::Denied {
                reason: AuthFailure::UnknownNonce
            }
        );
    }

    #[test]
    fn test_foreign_nonce_consumes_and_denies() {
        let params = AccumulatorParams::toy();
        let (device, root) = active_device(&params);
        let challenge = verifier(true);

        let (_nonce, _) = challenge.start(&device).unwrap();
        // echo differs from the issued nonce
        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            b"00000000000000000000000000000000",
            &root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::Denied {
                reason: AuthFailure::UnknownNonce
            }
        );

        // the mismatch consumed the nonce; a fresh one works
        let (nonce, _) = challenge.start(&device).unwrap();
        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            nonce.as_bytes(),
            &root,
            &params,
        );
        assert_eq!(outcome, AuthOutcome::Granted);
    }

    #[test]
    fn test_expired_nonce_denied() {
        let params = AccumulatorParams::toy();
        let (device, root) = active_device(&params);
        let challenge = ChallengeVerifier::new(Box::new(FixedVerdict(true)), Duration::ZERO);

        let (nonce, _) = challenge.start(&device).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            nonce.as_bytes(),
            &root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::Denied {
                reason: AuthFailure::NonceExpired
            }
        );
    }

    #[test]
    fn test_prime_mismatch_denied() {
        let params = AccumulatorParams::toy();
        let (device, root) = active_device(&params);
        let challenge = verifier(true);

        let (nonce, _) = challenge.start(&device).unwrap();
        let outcome = challenge.verify(
            &device,
            &BigUint::from(17u32),
            &device.witness,
            b"sig",
            nonce.as_bytes(),
            &root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::Denied {
                reason: AuthFailure::PrimeMismatch
            }
        );
    }

    #[test]
    fn test_bad_signature_denied() {
        let params = AccumulatorParams::toy();
        let (device, root) = active_device(&params);
        let challenge = verifier(false);

        let (nonce, _) = challenge.start(&device).unwrap();
        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            nonce.as_bytes(),
            &root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::Denied {
                reason: AuthFailure::BadSignature
            }
        );
    }

    #[test]
    fn test_stale_witness_recovery() {
        let params = AccumulatorParams::toy();
        let (mut device, root) = active_device(&params);

        // a second member with prime 17 joined: root moves, the stored
        // witness is refreshed server-side, the client's copy is stale
        let new_root = add(&params, &root, &BigUint::from(17u32)).unwrap();
        let client_witness = device.witness.clone();
        device.witness = add(&params, &device.witness, &BigUint::from(17u32)).unwrap();

        let challenge = verifier(true);
        let (nonce, _) = challenge.start(&device).unwrap();
        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &client_witness,
            b"sig",
            nonce.as_bytes(),
            &new_root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::StaleWitness {
                witness: device.witness.clone()
            }
        );

        // retry with the refreshed witness succeeds
        let (nonce, _) = challenge.start(&device).unwrap();
        let outcome = challenge.verify(
            &device,
            &device.id_prime,
            &device.witness,
            b"sig",
            nonce.as_bytes(),
            &new_root,
            &params,
        );
        assert_eq!(outcome, AuthOutcome::Granted);
    }

    #[test]
    fn test_bad_proof_denied() {
        let params = AccumulatorParams::toy();
        let (device, root) = active_device(&params);
        let challenge = verifier(true);

        let (nonce, _) = challenge.start(&device).unwrap();
        // garbage witness, and the stored witness is also made stale
        let mut stale = device.clone();
        stale.witness = BigUint::from(55u32);
        let outcome = challenge.verify(
            &stale,
            &stale.id_prime,
            &BigUint::from(77u32),
            b"sig",
            nonce.as_bytes(),
            &root,
            &params,
        );
        assert_eq!(
            outcome,
            AuthOutcome::Denied {
                reason: AuthFailure::BadProof
            }
        );
    }
}
