//! # Accredit Cryptographic Core
//!
//! This library is the cryptographic core of a revocable membership
//! system for IoT device identities, backed by an RSA accumulator whose
//! root is anchored on a blockchain.
//!
//! ## Security Architecture
//!
//! The core is the **root of trust** for the enrollment system:
//! - Device keys map deterministically to primes coprime to the trapdoor
//! - The accumulator root summarizes the active member set; each device
//!   holds a compact witness proving its membership
//! - Revocation publishes a new root through the anchor, invalidating
//!   every outstanding proof system-wide
//! - The trapdoor lambda(N) is secret-wrapped, zeroized on drop, and
//!   never serialized
//!
//! ## Module Organization
//!
//! - `crypto` - big-integer arithmetic, primality, prime mapping,
//!   accumulator algebra, global parameters
//! - `models` - device records and the versioned accumulator state
//! - `protocol` - identity state machine, anchor coordination,
//!   challenge-response authentication, the gateway API
//! - `storage` - the persistence collaborator interface
//!
//! ## Two-Phase Updates
//!
//! Every admin operation stages its full effect (candidate root, device
//! status change, refreshed witnesses), submits it to the anchor with
//! replay protection, and commits only on confirmation. A rejection,
//! timeout, or parent-hash conflict aborts and leaves the state machine
//! exactly as it was.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

/// Cryptographic primitives and accumulator algebra
pub mod crypto;

/// Device and accumulator-state data models
pub mod models;

/// Identity protocol: state machine, anchor, authentication
pub mod protocol;

/// Persistence collaborator interface
pub mod storage;

// Re-export common types at the crate root
pub use crypto::{AccumulatorParams, CryptoError, HashToPrime, PrimeMapper};
pub use models::{DeviceId, DeviceRecord, DeviceStatus, KeyType};
pub use protocol::{
    GatewayConfig, IdentityGateway, IdentityRegistry, LocalAnchor, PemSignatureVerifier,
    ProtocolError,
};
pub use storage::{DeviceStore, MemoryStore, StorageError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_organization() {
        // Basic sanity check that modules are accessible
        let _ = CryptoError::NotCoprime;
        let _ = AccumulatorParams::toy();
    }
}
