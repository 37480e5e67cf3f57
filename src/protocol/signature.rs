//! # Device Signature Verification
//!
//! The signature collaborator boundary: the core consumes signature
//! verification as a black-box capability behind [`SignatureVerifier`]
//! and derives device identifiers from the canonical key encoding.
//!
//! ## Canonical encoding
//!
//! Keys arrive as PEM. Both supported algorithms re-encode the parsed key
//! to SubjectPublicKeyInfo DER before hashing, so a re-wrapped or
//! re-armored PEM of the same key yields the same device id.
//!
//! ## Timing
//!
//! Verification returns a bare `bool`; rejection reasons are never
//! distinguished to the caller, and the underlying dalek/RSA verifiers
//! are constant-time in the signature bytes.

use crate::models::device::{DeviceId, KeyType};

use super::error::{ProtocolError, Result};

/// Black-box signature verification capability.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `message` with the PEM-encoded key.
    ///
    /// Returns `false` for any failure: bad PEM, wrong key type, wrong
    /// signature length, or an invalid signature. Callers cannot
    /// distinguish the reasons.
    fn verify_signature(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key_pem: &str,
        key_type: KeyType,
    ) -> bool;
}

/// PEM-based verifier for Ed25519 and RSA (PKCS#1 v1.5 over SHA-256)
/// device keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct PemSignatureVerifier;

impl SignatureVerifier for PemSignatureVerifier {
    fn verify_signature(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key_pem: &str,
        key_type: KeyType,
    ) -> bool {
        match key_type {
            KeyType::Ed25519 => verify_ed25519(message, signature, public_key_pem),
            KeyType::Rsa => verify_rsa(message, signature, public_key_pem),
        }
    }
}

fn verify_ed25519(message: &[u8], signature: &[u8], pem: &str) -> bool {
    use ed25519_dalek::pkcs8::DecodePublicKey;
    use ed25519_dalek::{Signature, VerifyingKey};

    let Ok(key) = VerifyingKey::from_public_key_pem(pem) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify_strict(message, &signature).is_ok()
}

fn verify_rsa(message: &[u8], signature: &[u8], pem: &str) -> bool {
    use rsa::pkcs8::DecodePublicKey;
    use rsa::{Pkcs1v15Sign, RsaPublicKey};
    use sha2::{Digest, Sha256};

    let Ok(key) = RsaPublicKey::from_public_key_pem(pem) else {
        return false;
    };
    let digest = Sha256::digest(message);
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .is_ok()
}

/// Parse a PEM public key and return its canonical SubjectPublicKeyInfo
/// DER bytes.
///
/// # Errors
///
/// `InvalidInput` when the PEM does not parse as the declared key type.
pub fn canonical_spki_der(public_key_pem: &str, key_type: KeyType) -> Result<Vec<u8>> {
    match key_type {
        KeyType::Ed25519 => {
            use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
            use ed25519_dalek::VerifyingKey;

            let key = VerifyingKey::from_public_key_pem(public_key_pem)
                .map_err(|_| ProtocolError::invalid("malformed ed25519 public key PEM"))?;
            let der = key
                .to_public_key_der()
                .map_err(|_| ProtocolError::invalid("ed25519 key cannot be DER-encoded"))?;
            Ok(der.as_bytes().to_vec())
        }
        KeyType::Rsa => {
            use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
            use rsa::RsaPublicKey;

            let key = RsaPublicKey::from_public_key_pem(public_key_pem)
                .map_err(|_| ProtocolError::invalid("malformed RSA public key PEM"))?;
            let der = key
                .to_public_key_der()
                .map_err(|_| ProtocolError::invalid("RSA key cannot be DER-encoded"))?;
            Ok(der.as_bytes().to_vec())
        }
    }
}

/// Derive the device identifier for a PEM public key: keccak-256 of the
/// canonical SPKI DER.
pub fn device_id_from_pem(public_key_pem: &str, key_type: KeyType) -> Result<DeviceId> {
    let der = canonical_spki_der(public_key_pem, key_type)?;
    Ok(DeviceId::from_spki_der(&der))
}

// ============================================================================
// Tests
// ============================================================================
