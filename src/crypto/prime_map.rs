//! # Prime Mapping
//!
//! Deterministic function from device key bytes to a prime suitable for
//! the accumulator: odd, at least 256 bits, and coprime to lambda(N).
//!
//! ## Why coprimality
//!
//! Revocation inverts the device's prime modulo lambda(N). If the prime
//! shared a factor with lambda(N) the inverse would not exist and the
//! device could never be removed efficiently. Enforcing coprimality at
//! enrollment removes that failure mode entirely.
//!
//! ## Determinism
//!
//! The candidate stream is fixed by the key bytes: `h = SHA-256(key)`
//! with the top and bottom bits forced, then `h, h+2, h+4, ...`. The
//! first candidate passing Miller-Rabin and the coprimality check wins.
//! The same key always maps to the same prime.

use num_bigint::BigUint;
use num_traits::One;

use super::bigint::{gcd, miller_rabin};
use super::error::{CryptoError, Result};
use super::hash::sha256;
use super::params::AccumulatorParams;

/// Default bit-length floor for device primes.
pub const DEFAULT_MIN_BITS: u64 = 256;

/// Default Miller-Rabin round count.
pub const DEFAULT_ROUNDS: u32 = 64;

/// Default candidate budget before the search is declared misconfigured.
pub const DEFAULT_MAX_ATTEMPTS: usize = 200_000;

/// Maps device key bytes to accumulator primes.
///
/// The production implementation is [`HashToPrime`]; the trait seam
/// exists so tests can pin exact primes.
pub trait PrimeMapper: Send + Sync {
    /// Produce the prime for `key_bytes` under the given parameters.
    fn assign_prime(&self, key_bytes: &[u8], params: &AccumulatorParams) -> Result<BigUint>;
}

/// SHA-256-based hash-to-prime search.
///
/// # Example
///
/// ```
/// use accredit_core::crypto::params::AccumulatorParams;
/// use accredit_core::crypto::prime_map::{HashToPrime, PrimeMapper};
///
/// let params = AccumulatorParams::toy();
/// let mapper = HashToPrime::default();
/// let p1 = mapper.assign_prime(b"device-key", &params).unwrap();
/// let p2 = mapper.assign_prime(b"device-key", &params).unwrap();
/// assert_eq!(p1, p2);
/// assert!(p1.bits() >= 256);
/// ```
#[derive(Debug, Clone)]
pub struct HashToPrime {
    min_bits: u64,
    rounds: u32,
    max_attempts: usize,
}

impl HashToPrime {
    /// Construct a search with explicit limits.
    pub fn new(min_bits: u64, rounds: u32, max_attempts: usize) -> Self {
        Self {
            min_bits,
            rounds,
            max_attempts,
        }
    }
}

impl Default for HashToPrime {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BITS, DEFAULT_ROUNDS, DEFAULT_MAX_ATTEMPTS)
    }
}

impl PrimeMapper for HashToPrime {
    fn assign_prime(&self, key_bytes: &[u8], params: &AccumulatorParams) -> Result<BigUint> {
        if key_bytes.is_empty() {
            return Err(CryptoError::operand("key bytes must not be empty"));
        }

        let lambda = params.lambda();

        let mut candidate = BigUint::from_bytes_be(&sha256(key_bytes));
        if self.min_bits > 0 {
            candidate.set_bit(self.min_bits - 1, true);
        }
        candidate.set_bit(0, true); // odd

        for _ in 0..self.max_attempts {
            if miller_rabin(&candidate, self.rounds) && gcd(&candidate, &lambda).is_one() {
                return Ok(candidate);
            }
            candidate += 2u32;
        }

        Err(CryptoError::NoSuitablePrime {
            attempts: self.max_attempts,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
