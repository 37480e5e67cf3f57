//! # Big-Integer Arithmetic and Primality
//!
//! Modular arithmetic over arbitrary-precision integers, sized for the
//! 2048-bit accumulator modulus, plus a deterministic Miller-Rabin
//! primality test.
//!
//! ## Operations
//!
//! - [`modpow`] - variable-time modular exponentiation (fast path)
//! - [`modpow_ct`] - fixed-shape ladder for trapdoor-derived exponents
//! - [`gcd`], [`ext_gcd`], [`modinv`] - Euclidean algorithms
//! - [`miller_rabin`] - reproducible primality testing
//!
//! ## Determinism
//!
//! `miller_rabin` derives its witnesses from SHA-256 of the candidate and
//! a round counter, so the same input always produces the same verdict.
//! Two runs on two machines agree bit for bit.

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use sha2::{Digest, Sha256};

use super::error::{CryptoError, Result};

/// Compute `base^exp mod modulus`.
///
/// Variable-time fast path; do not use with exponents derived from the
/// trapdoor (see [`modpow_ct`]).
///
/// # Errors
///
/// Returns `InvalidOperand` when `modulus` is zero.
///
/// # Example
///
/// ```
/// use accredit_core::crypto::bigint::modpow;
/// use num_bigint::BigUint;
///
/// let r = modpow(&BigUint::from(4u32), &BigUint::from(13u32), &BigUint::from(209u32)).unwrap();
/// assert_eq!(r, BigUint::from(9u32));
/// ```
pub fn modpow(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> Result<BigUint> {
    if modulus.is_zero() {
        return Err(CryptoError::operand("modulus must be positive"));
    }
    if modulus.is_one() {
        return Ok(BigUint::zero());
    }
    Ok(base.modpow(exp, modulus))
}

/// Compute `base^exp mod modulus` with a fixed-shape ladder.
///
/// Square-and-multiply-always: every iteration performs both the squaring
/// and the multiplication regardless of the exponent bit, so the sequence
/// of big-integer operations does not depend on the exponent's bit
/// pattern. Used by the trapdoor operations, whose exponents are inverses
/// modulo lambda(N).
///
/// # Errors
///
/// Returns `InvalidOperand` when `modulus` is zero.
pub fn modpow_ct(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> Result<BigUint> {
    if modulus.is_zero() {
        return Err(CryptoError::operand("modulus must be positive"));
    }
    if modulus.is_one() {
        return Ok(BigUint::zero());
    }

    let base = base % modulus;
    let mut acc = BigUint::one();
    let width = exp.bits().max(1);

    // Most-significant bit first; both products computed every round.
    for i in (0..width).rev() {
        let squared = (&acc * &acc) % modulus;
        let multiplied = (&squared * &base) % modulus;
        acc = if exp.bit(i) { multiplied } else { squared };
    }

    Ok(acc)
}

/// Greatest common divisor of `a` and `b`.
///
/// `gcd(a, 0) == a` and `gcd(0, 0) == 0`.
pub fn gcd(a: &BigUint, b: &BigUint) -> BigUint {
    a.gcd(b)
}

/// Extended Euclidean algorithm.
///
/// Returns `(g, x, y)` with `a*x + b*y == g == gcd(a, b)`. The Bezout
/// coefficients may be negative and are therefore returned as `BigInt`.
///
/// Edge case: `ext_gcd(a, 0) == (a, 1, 0)`.
///
/// # Example
///
/// ```
/// use accredit_core::crypto::bigint::ext_gcd;
/// use num_bigint::{BigInt, BigUint};
///
/// let (g, x, y) = ext_gcd(&BigUint::from(35u32), &BigUint::from(15u32));
/// assert_eq!(g, BigUint::from(5u32));
/// assert_eq!(BigInt::from(35) * x + BigInt::from(15) * y, BigInt::from(5));
/// ```
pub fn ext_gcd(a: &BigUint, b: &BigUint) -> (BigUint, BigInt, BigInt) {
    let mut r0 = BigInt::from_biguint(Sign::Plus, a.clone());
    let mut r1 = BigInt::from_biguint(Sign::Plus, b.clone());
    let (mut x0, mut x1) = (BigInt::one(), BigInt::zero());
    let (mut y0, mut y1) = (BigInt::zero(), BigInt::one());

    while !r1.is_zero() {
        let q = &r0 / &r1;
        let r2 = &r0 - &q * &r1;
        r0 = std::mem::replace(&mut r1, r2);
        let x2 = &x0 - &q * &x1;
        x0 = std::mem::replace(&mut x1, x2);
        let y2 = &y0 - &q * &y1;
        y0 = std::mem::replace(&mut y1, y2);
    }

    let g = r0
        .to_biguint()
        .unwrap_or_else(BigUint::zero);
    (g, x0, y0)
}

/// Modular inverse of `a` modulo `m`.
///
/// Finds `x` in `[0, m)` with `a*x ≡ 1 (mod m)`.
///
/// # Errors
///
/// - `InvalidOperand` when `m` is zero
/// - `NoInverse` when `gcd(a, m) != 1`, including `a == 0`
pub fn modinv(a: &BigUint, m: &BigUint) -> Result<BigUint> {
    if m.is_zero() {
        return Err(CryptoError::operand("modulus must be positive"));
    }

    let a = a % m;
    if a.is_zero() {
        return Err(CryptoError::NoInverse);
    }

    let (g, x, _) = ext_gcd(&a, m);
    if !g.is_one() {
        return Err(CryptoError::NoInverse);
    }

    let m_int = BigInt::from_biguint(Sign::Plus, m.clone());
    let x = ((x % &m_int) + &m_int) % &m_int;
    // x is in [0, m) after normalization
    Ok(x.to_biguint().expect("normalized inverse is non-negative"))
}

/// Deterministic Miller-Rabin primality test.
///
/// Witnesses for round `i` are derived from
/// `SHA-256(be_bytes(n) || i_be32)` reduced into `[2, n-2]`, so the
/// verdict for a given `n` is reproducible across runs and machines.
/// With 64 rounds the composite-acceptance probability is at most
/// `4^-64`, sufficient for the 256-bit-and-up primes this system maps
/// device keys to.
///
/// # Example
///
/// ```
/// use accredit_core::crypto::bigint::miller_rabin;
/// use num_bigint::BigUint;
///
/// assert!(miller_rabin(&BigUint::from(13u32), 64));
/// assert!(!miller_rabin(&BigUint::from(15u32), 64));
/// ```
pub fn miller_rabin(n: &BigUint, rounds: u32) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if n < &two {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // n - 1 = d * 2^r with d odd
    let n_minus_1 = n - 1u32;
    let r = n_minus_1.trailing_zeros().unwrap_or(0);
    let d = &n_minus_1 >> r;

    let n_bytes = n.to_bytes_be();
    let span = n - &three; // witnesses drawn from [2, n-2]

    'rounds: for i in 0..rounds {
        let mut hasher = Sha256::new();
        hasher.update(&n_bytes);
        hasher.update(i.to_be_bytes());
        let digest = hasher.finalize();

        let a = BigUint::from_bytes_be(&digest) % &span + &two;
        let mut x = a.modpow(&d, n);

        if x.is_one() || x == n_minus_1 {
            continue;
        }

        for _ in 0..r.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_1 {
                continue 'rounds;
            }
        }

        return false; // definitely composite
    }

    true
}

// ============================================================================
// Tests
// ============================================================================
