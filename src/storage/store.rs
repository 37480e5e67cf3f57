//! # Persistence Collaborator Interface
//!
//! Key-value contract between the core and its storage backend. The core
//! writes committed state only; staged-but-uncommitted changes never
//! reach this interface.
//!
//! ## Schema
//!
//! Device rows are keyed by the 32-byte device id and carry string-typed
//! fields chosen for backend portability: PEM for the public key, a
//! decimal string for the prime, 512-char hex for the witness, small
//! integers for key type and status.
//!
//! The metadata map reserves the keys [`META_ROOT_HEX`], [`META_VERSION`],
//! [`META_N_HEX`], [`META_G_HEX`], and [`META_LAMBDA_HEX`]. The core
//! writes the first four; the trapdoor key is defined for deployments
//! whose metadata map is itself a protected secret store, but this crate
//! never writes it.

use std::collections::HashMap;

use num_bigint::BigUint;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::crypto::hash::{root_from_bytes, root_to_bytes, ROOT_BYTES};
use crate::models::device::{DeviceId, DeviceRecord, DeviceStatus, KeyType};

use super::error::{Result, StorageError};

/// Metadata key: current committed root, 512 hex chars.
pub const META_ROOT_HEX: &str = "root_hex";

/// Metadata key: committed version counter, decimal string.
pub const META_VERSION: &str = "version";

/// Metadata key: the modulus N, hex. Written once at bootstrap.
pub const META_N_HEX: &str = "n_hex";

/// Metadata key: the generator g, hex. Written once at bootstrap.
pub const META_G_HEX: &str = "g_hex";

/// Metadata key reserved for the trapdoor in deployments with a
/// protected metadata map. Never written by this crate.
pub const META_LAMBDA_HEX: &str = "lambda_n_hex";

// ============================================================================
// Stored Row
// ============================================================================

/// Serialized form of a device row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDevice {
    /// Device id, 64 hex chars
    pub device_id: String,
    /// Public key PEM
    pub public_key_pem: String,
    /// Prime as a decimal string (the canonical emitted form)
    pub id_prime: String,
    /// Witness as 512 hex chars (256 bytes, big-endian)
    pub witness: String,
    /// Key type small integer
    pub key_type: u8,
    /// Status small integer
    pub status: u8,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last-update timestamp (Unix milliseconds)
    pub updated_at: u64,
}

impl StoredDevice {
    /// Serialize an in-memory record into the stored form.
    pub fn from_record(record: &DeviceRecord) -> Result<Self> {
        let witness_bytes = root_to_bytes(&record.witness)
            .map_err(|e| StorageError::corrupt(record.device_id.to_hex(), e.to_string()))?;
        Ok(Self {
            device_id: record.device_id.to_hex(),
            public_key_pem: record.public_key_pem.clone(),
            id_prime: record.id_prime.to_str_radix(10),
            witness: hex::encode(witness_bytes),
            key_type: record.key_type.as_u8(),
            status: record.status.as_u8(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Decode the stored form back into an in-memory record.
    pub fn to_record(&self) -> Result<DeviceRecord> {
        let device_id = DeviceId::from_hex(&self.device_id)
            .ok_or_else(|| StorageError::corrupt(&self.device_id, "bad device id hex"))?;
        let id_prime = BigUint::parse_bytes(self.id_prime.as_bytes(), 10)
            .ok_or_else(|| StorageError::corrupt(&self.device_id, "bad prime decimal"))?;

        let witness_raw = hex::decode(&self.witness)
            .map_err(|_| StorageError::corrupt(&self.device_id, "bad witness hex"))?;
        let witness_bytes: [u8; ROOT_BYTES] = witness_raw
            .try_into()
            .map_err(|_| StorageError::corrupt(&self.device_id, "witness is not 256 bytes"))?;
        let witness = root_from_bytes(&witness_bytes);

        let key_type = KeyType::from_u8(self.key_type)
            .ok_or_else(|| StorageError::corrupt(&self.device_id, "unknown key type"))?;
        let status = DeviceStatus::from_u8(self.status)
            .ok_or_else(|| StorageError::corrupt(&self.device_id, "unknown status"))?;

        Ok(DeviceRecord {
            device_id,
            public_key_pem: self.public_key_pem.clone(),
            key_type,
            id_prime,
            witness,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Key-value persistence contract consumed by the gateway.
///
/// Implementations must be safe to call from concurrent readers; the
/// gateway serializes writers itself.
pub trait DeviceStore: Send + Sync {
    /// Insert or overwrite a device row.
    fn put_device(&self, row: &StoredDevice) -> Result<()>;

    /// Fetch a device row by id.
    fn get_device(&self, device_id: &DeviceId) -> Result<Option<StoredDevice>>;

    /// All device rows, unordered.
    fn list_devices(&self) -> Result<Vec<StoredDevice>>;

    /// Write a metadata entry.
    fn put_metadata(&self, key: &str, value: &str) -> Result<()>;

    /// Read a metadata entry.
    fn get_metadata(&self, key: &str) -> Result<Option<String>>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-process [`DeviceStore`] used by tests and local-only deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<String, StoredDevice>>,
    metadata: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryStore {
    fn put_device(&self, row: &StoredDevice) -> Result<()> {
        self.devices
            .write()
            .insert(row.device_id.clone(), row.clone());
        Ok(())
    }

    fn get_device(&self, device_id: &DeviceId) -> Result<Option<StoredDevice>> {
        Ok(self.devices.read().get(&device_id.to_hex()).cloned())
    }

    fn list_devices(&self) -> Result<Vec<StoredDevice>> {
        Ok(self.devices.read().values().cloned().collect())
    }

    fn put_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.metadata
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self.metadata.read().get(key).cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================
