//! # Cryptographic Core Module
//!
//! Number theory and accumulator algebra for the Accredit identity core.
//!
//! ## Design Principles
//!
//! 1. **Purity**: Every function reads its inputs and returns new values;
//!    the identity state machine owns all mutation
//! 2. **Explicit Parameters**: `(N, g, lambda(N))` travel as an explicit
//!    [`params::AccumulatorParams`] record, never as module-level state
//! 3. **Trapdoor Hygiene**: lambda(N) is secret-wrapped, redacted from
//!    `Debug`, and consumed only through the fixed-shape exponentiation
//!    ladder
//! 4. **Reproducibility**: Primality testing and prime mapping are
//!    deterministic, so two nodes agree on every derived prime
//!
//! ## Module Structure
//!
//! - `error` - unified error types for all crypto operations
//! - `bigint` - modular arithmetic and deterministic Miller-Rabin
//! - `hash` - Keccak-256 / SHA-256 and the canonical root encoding
//! - `params` - global parameter record and its loading paths
//! - `prime_map` - hash-to-prime coprime to lambda(N)
//! - `accumulator` - add / verify / recompute / trapdoor removal

// Error handling
pub mod error;

// Arithmetic and algebra
pub mod accumulator;
pub mod bigint;
pub mod hash;
pub mod params;
pub mod prime_map;

// Re-export common types at the crypto module level
pub use error::{CryptoError, Result};
pub use params::{AccumulatorParams, ParamsError};
pub use prime_map::{HashToPrime, PrimeMapper};
