//! # Cryptographic Error Types
//!
//! Unified error handling for the arithmetic, prime-mapping, and
//! accumulator operations in the Accredit core.
//!
//! ## Design Principles
//!
//! - **No Information Leakage**: Error messages never contain the trapdoor
//!   or other sensitive values
//! - **Closed Set**: Callers can match exhaustively and map each variant
//!   to a stable kind string
//! - **Type Safety**: Contract violations surface as errors, not panics

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Unified error type for all cryptographic operations
///
/// All errors in the crypto module are represented by this enum,
/// ensuring consistent error handling across the arithmetic and
/// accumulator layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// An operand violated an operation's contract
    ///
    /// This may occur due to:
    /// - A zero or out-of-range modulus
    /// - An accumulator value outside [1, N)
    /// - An empty input where bytes are required
    #[error("Invalid operand: {0}")]
    InvalidOperand(String),

    /// Modular inverse does not exist
    ///
    /// Raised by `modinv(a, m)` when gcd(a, m) != 1, including a = 0.
    #[error("No modular inverse: gcd(a, m) != 1")]
    NoInverse,

    /// A prime is not coprime to the trapdoor modulus
    ///
    /// Trapdoor removal inverts the prime modulo lambda(N); the inverse
    /// only exists for primes coprime to lambda(N). Enrollment enforces
    /// coprimality, so seeing this after a proper enrollment is a bug.
    #[error("Prime is not coprime to lambda(N); trapdoor inversion impossible")]
    NotCoprime,

    /// Hash-to-prime exhausted its candidate budget
    ///
    /// The scan over candidates found no value that is both prime and
    /// coprime to lambda(N) within `max_attempts`. This indicates
    /// parameter misconfiguration and is treated as fatal.
    #[error("No suitable prime found within {attempts} candidates")]
    NoSuitablePrime {
        /// Number of candidates examined before giving up
        attempts: usize,
    },
}

impl CryptoError {
    /// Create an InvalidOperand error from a string message
    pub fn operand(msg: impl Into<String>) -> Self {
        Self::InvalidOperand(msg.into())
    }

    /// Stable machine-readable kind string for this error
    pub fn kind(&self) -> &'static str {
        match self {
            CryptoError::InvalidOperand(_) => "INVALID_INPUT",
            CryptoError::NoInverse => "NO_INVERSE",
            CryptoError::NotCoprime => "NOT_COPRIME",
            CryptoError::NoSuitablePrime { .. } => "NO_SUITABLE_PRIME",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CryptoError::NoSuitablePrime { attempts: 200_000 };
        assert_eq!(
            err.to_string(),
            "No suitable prime found within 200000 candidates"
        );
    }

    #[test]
    fn test_operand_helper() {
        let err = CryptoError::operand("modulus must be positive");
        assert!(matches!(err, CryptoError::InvalidOperand(_)));
        assert_eq!(err.kind(), "INVALID_INPUT");
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(CryptoError::NoInverse.kind(), "NO_INVERSE");
        assert_eq!(CryptoError::NotCoprime.kind(), "NOT_COPRIME");
        assert_eq!(
            CryptoError::NoSuitablePrime { attempts: 1 }.kind(),
            "NO_SUITABLE_PRIME"
        );
    }
}
