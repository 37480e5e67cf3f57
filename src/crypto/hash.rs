//! # Hashing and Canonical Encodings
//!
//! Keccak-256 and SHA-256 one-shot helpers, plus the canonical 256-byte
//! big-endian encoding of accumulator values used everywhere a root
//! crosses a trust boundary (the anchor, the persistence layer, the wire).
//!
//! ## Roles
//!
//! - **Keccak-256**: device identifiers, parent hashes, operation ids
//! - **SHA-256**: prime derivation and Miller-Rabin witness derivation
//!
//! The parent hash of a root is `keccak256(be_bytes(root, 256))`; the
//! anchor compares it against its own stored hash to reject replays and
//! concurrent updates.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use super::error::{CryptoError, Result};

/// Canonical byte length of an encoded accumulator value (2048 bits).
pub const ROOT_BYTES: usize = 256;

/// Byte length of a Keccak-256 digest.
pub const DIGEST_BYTES: usize = 32;

/// Compute the Keccak-256 digest of `data` in one shot.
pub fn keccak256(data: &[u8]) -> [u8; DIGEST_BYTES] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of `data` in one shot.
pub fn sha256(data: &[u8]) -> [u8; DIGEST_BYTES] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode an accumulator value as exactly [`ROOT_BYTES`] big-endian
/// bytes, zero-padded on the left.
///
/// # Errors
///
/// Returns `InvalidOperand` if the value does not fit in 2048 bits.
///
/// # Example
///
/// ```
/// use accredit_core::crypto::hash::{root_to_bytes, ROOT_BYTES};
/// use num_bigint::BigUint;
///
/// let bytes = root_to_bytes(&BigUint::from(4u32)).unwrap();
/// assert_eq!(bytes.len(), ROOT_BYTES);
/// assert_eq!(bytes[ROOT_BYTES - 1], 4);
/// ```
pub fn root_to_bytes(value: &BigUint) -> Result<[u8; ROOT_BYTES]> {
    let raw = value.to_bytes_be();
    if raw.len() > ROOT_BYTES {
        return Err(CryptoError::operand(format!(
            "value of {} bytes exceeds the {}-byte encoding",
            raw.len(),
            ROOT_BYTES
        )));
    }
    let mut out = [0u8; ROOT_BYTES];
    out[ROOT_BYTES - raw.len()..].copy_from_slice(&raw);
    Ok(out)
}

/// Decode a canonical 256-byte big-endian accumulator value.
pub fn root_from_bytes(bytes: &[u8; ROOT_BYTES]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Parent hash of a root: `keccak256(be_bytes(root, 256))`.
///
/// Recomputed on every committed transition and submitted with the next
/// anchor update for replay protection.
pub fn parent_hash(root: &BigUint) -> Result<[u8; DIGEST_BYTES]> {
    Ok(keccak256(&root_to_bytes(root)?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_known_vector() {
        // keccak256 of the empty string
        let digest = keccak256(b"");
        assert_eq!(
            hex::encode(digest),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_root_encoding_roundtrip() {
        let value = BigUint::from(0xdead_beefu32);
        let bytes = root_to_bytes(&value).unwrap();
        assert_eq!(bytes.len(), ROOT_BYTES);
        assert_eq!(root_from_bytes(&bytes), value);
    }

    #[test]
    fn test_root_encoding_zero_pads() {
        let bytes = root_to_bytes(&BigUint::from(1u32)).unwrap();
        assert!(bytes[..ROOT_BYTES - 1].iter().all(|&b| b == 0));
        assert_eq!(bytes[ROOT_BYTES - 1], 1);
    }

    #[test]
    fn test_root_encoding_overflow() {
        let too_big = BigUint::from(1u32) << (8 * ROOT_BYTES as u32);
        assert!(root_to_bytes(&too_big).is_err());
    }

    #[test]
    fn test_parent_hash_tracks_encoding() {
        let root = BigUint::from(196u32);
        let expected = keccak256(&root_to_bytes(&root).unwrap());
        assert_eq!(parent_hash(&root).unwrap(), expected);

        // a different root produces a different parent hash
        let other = parent_hash(&BigUint::from(168u32)).unwrap();
        assert_ne!(other, expected);
    }
}
