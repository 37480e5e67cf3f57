//! # Device Identity and Records
//!
//! This module defines device identifiers, key types, lifecycle status,
//! and the in-memory device record the identity state machine owns.
//!
//! ## Components
//!
//! - `DeviceId`: 32-byte identifier, keccak-256 of the key's SPKI DER
//! - `KeyType`: signature algorithm of the device key (Ed25519 / RSA)
//! - `DeviceStatus`: lifecycle state (see below)
//! - `DeviceRecord`: one row per enrollment attempt
//!
//! ## Lifecycle
//!
//! ```text
//!  (birth) → PENDING ──commit→ ACTIVE ──revoke→ PENDING_REVOKE ──commit→ REVOKED
//!               │                                    │
//!               └──abort→ REVOKED                    └──abort→ ACTIVE
//! ```
//!
//! REVOKED is terminal and its prime is never reused; aborted enrollments
//! are kept as REVOKED rows for audit.

use std::fmt;

use num_bigint::BigUint;

use crate::crypto::hash::{keccak256, DIGEST_BYTES};

// ============================================================================
// Device Identifier
// ============================================================================

/// Device unique identifier (32 bytes).
///
/// Derived as keccak-256 of the DER-encoded SubjectPublicKeyInfo of the
/// device's public key, so the identifier is stable across re-encodings
/// of the same key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub [u8; DIGEST_BYTES]);

impl DeviceId {
    /// Create a DeviceId from a 32-byte array
    pub fn from_bytes(bytes: [u8; DIGEST_BYTES]) -> Self {
        Self(bytes)
    }

    /// Derive the identifier from a DER-encoded SubjectPublicKeyInfo
    ///
    /// # Example
    ///
    /// ```
    /// use accredit_core::models::DeviceId;
    ///
    /// let id = DeviceId::from_spki_der(b"example-spki-der");
    /// assert_eq!(id.as_bytes().len(), 32);
    /// ```
    pub fn from_spki_der(der: &[u8]) -> Self {
        Self(keccak256(der))
    }

    /// Parse an identifier from 64 hex characters
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let raw = hex::decode(hex_str.trim().trim_start_matches("0x")).ok()?;
        let bytes: [u8; DIGEST_BYTES] = raw.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Get the identifier as a byte array
    pub fn as_bytes(&self) -> &[u8; DIGEST_BYTES] {
        &self.0
    }

    /// Lowercase hex rendering (the canonical external form)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.to_hex())
    }
}

// ============================================================================
// Key Type
// ============================================================================

/// Signature algorithm of a device key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Ed25519 device key
    Ed25519,
    /// RSA device key (PKCS#1 v1.5 signatures over SHA-256)
    Rsa,
}

impl KeyType {
    /// Parse the external string form (`"ed25519"` / `"rsa"`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ed25519" => Some(KeyType::Ed25519),
            "rsa" => Some(KeyType::Rsa),
            _ => None,
        }
    }

    /// External string form
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ed25519",
            KeyType::Rsa => "rsa",
        }
    }

    /// Small-integer form used by the persistence collaborator
    pub fn as_u8(&self) -> u8 {
        match self {
            KeyType::Ed25519 => 0,
            KeyType::Rsa => 1,
        }
    }

    /// Inverse of [`KeyType::as_u8`]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(KeyType::Ed25519),
            1 => Some(KeyType::Rsa),
            _ => None,
        }
    }
}

// ============================================================================
// Device Status
// ============================================================================

/// Device lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Enrollment submitted, awaiting anchor confirmation
    Pending,

    /// Member of the accumulator; may authenticate
    Active,

    /// Revocation submitted, awaiting anchor confirmation
    ///
    /// The device still counts as a member until the revocation commits;
    /// authentication continues to succeed against the current root.
    PendingRevoke,

    /// Removed from the accumulator (terminal)
    ///
    /// Revoked rows are retained for audit and their prime is never
    /// reused.
    Revoked,
}

impl DeviceStatus {
    /// External string form
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Pending => "PENDING",
            DeviceStatus::Active => "ACTIVE",
            DeviceStatus::PendingRevoke => "PENDING_REVOKE",
            DeviceStatus::Revoked => "REVOKED",
        }
    }

    /// Small-integer form used by the persistence collaborator
    pub fn as_u8(&self) -> u8 {
        match self {
            DeviceStatus::Pending => 0,
            DeviceStatus::Active => 1,
            DeviceStatus::PendingRevoke => 2,
            DeviceStatus::Revoked => 3,
        }
    }

    /// Inverse of [`DeviceStatus::as_u8`]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DeviceStatus::Pending),
            1 => Some(DeviceStatus::Active),
            2 => Some(DeviceStatus::PendingRevoke),
            3 => Some(DeviceStatus::Revoked),
            _ => None,
        }
    }

    /// Whether this status counts toward the accumulated member set
    pub fn is_active(&self) -> bool {
        matches!(self, DeviceStatus::Active)
    }

    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviceStatus::Revoked)
    }
}

// ============================================================================
// Device Record
// ============================================================================

/// One device row, created per enrollment attempt.
///
/// Invariant for ACTIVE rows: `witness^id_prime ≡ root (mod N)` against
/// the current committed root. The state machine is the only writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Stable identifier (keccak-256 of the SPKI DER)
    pub device_id: DeviceId,

    /// Full public key in PEM, retained for signature verification
    pub public_key_pem: String,

    /// Signature algorithm of the key
    pub key_type: KeyType,

    /// The unique prime assigned at enrollment; immutable afterwards
    pub id_prime: BigUint,

    /// Current membership witness
    pub witness: BigUint,

    /// Lifecycle status
    pub status: DeviceStatus,

    /// Creation timestamp (Unix milliseconds, audit only)
    pub created_at: u64,

    /// Last-update timestamp (Unix milliseconds, audit only)
    pub updated_at: u64,
}

impl DeviceRecord {
    /// Create a new PENDING record for an enrollment attempt
    pub fn new(
        device_id: DeviceId,
        public_key_pem: String,
        key_type: KeyType,
        id_prime: BigUint,
        witness: BigUint,
    ) -> Self {
        let now = current_timestamp_ms();
        Self {
            device_id,
            public_key_pem,
            key_type,
            id_prime,
            witness,
            status: DeviceStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the audit timestamp after a mutation
    pub fn touch(&mut self) {
        self.updated_at = current_timestamp_ms();
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Get current Unix timestamp in milliseconds
pub(crate) fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
