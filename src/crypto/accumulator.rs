//! # Accumulator Algebra
//!
//! Pure functions over the global parameters. No state, no I/O: the
//! identity state machine owns the authoritative root and calls into this
//! module to compute candidate successors.
//!
//! ## Operations
//!
//! - [`add`] / [`batch_add`] - membership addition, `A^p mod N`
//! - [`verify`] - membership proof check, `w^p ≡ A (mod N)`
//! - [`recompute_from_set`] - root from scratch, order-independent
//! - [`remove_single`] / [`remove_batch`] - trapdoor removal via the
//!   inverse exponent modulo lambda(N)
//! - [`verify_removal`] - postcondition check after a removal
//!
//! ## Numeric semantics
//!
//! Only the trapdoor operations reduce exponents modulo lambda(N);
//! `add` uses the literal prime as the exponent. Trapdoor exponentiation
//! goes through the fixed-shape ladder ([`modpow_ct`]) because its
//! exponent is derived from the trapdoor.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use super::bigint::{gcd, modinv, modpow, modpow_ct};
use super::error::{CryptoError, Result};
use super::params::AccumulatorParams;

/// Check that an accumulator value is a canonical element of [1, N).
fn check_element(params: &AccumulatorParams, value: &BigUint, what: &str) -> Result<()> {
    if value.is_zero() || value >= params.n() {
        return Err(CryptoError::operand(format!(
            "{} must lie in [1, N)",
            what
        )));
    }
    Ok(())
}

/// Add a member: `A' = A^p mod N`.
///
/// Requires `A` in [1, N) and `p > 0`.
///
/// # Example
///
/// ```
/// use accredit_core::crypto::accumulator::add;
/// use accredit_core::crypto::params::AccumulatorParams;
/// use num_bigint::BigUint;
///
/// let params = AccumulatorParams::toy();
/// let a = add(&params, params.g(), &BigUint::from(13u32)).unwrap();
/// assert_eq!(a, BigUint::from(9u32));
/// ```
pub fn add(params: &AccumulatorParams, a: &BigUint, p: &BigUint) -> Result<BigUint> {
    check_element(params, a, "accumulator value")?;
    if p.is_zero() {
        return Err(CryptoError::operand("prime exponent must be positive"));
    }
    modpow(a, p, params.n())
}

/// Add several members by folding [`add`].
pub fn batch_add<'a, I>(params: &AccumulatorParams, a: &BigUint, primes: I) -> Result<BigUint>
where
    I: IntoIterator<Item = &'a BigUint>,
{
    let mut acc = a.clone();
    for p in primes {
        acc = add(params, &acc, p)?;
    }
    Ok(acc)
}

/// Verify a membership proof: `w^p ≡ A (mod N)` with both `w` and `A`
/// canonical elements of [1, N).
///
/// Malformed inputs verify as `false`, never as errors: a proof either
/// holds or it does not.
pub fn verify(params: &AccumulatorParams, w: &BigUint, p: &BigUint, a: &BigUint) -> bool {
    if w.is_zero() || w >= params.n() || a.is_zero() || a >= params.n() || p.is_zero() {
        return false;
    }
    match modpow(w, p, params.n()) {
        Ok(lhs) => lhs == *a,
        Err(_) => false,
    }
}

/// Recompute the root from a set of primes, folding from `g`.
///
/// The empty set yields `g`. The result is independent of iteration
/// order: the exponents multiply in Z.
pub fn recompute_from_set<'a, I>(params: &AccumulatorParams, primes: I) -> Result<BigUint>
where
    I: IntoIterator<Item = &'a BigUint>,
{
    batch_add(params, params.g(), primes)
}

/// Trapdoor removal of a single member: `A' = A^(p^-1 mod lambda) mod N`.
///
/// Post-condition: `add(A', p) == A`.
///
/// # Errors
///
/// - `NotCoprime` when `gcd(p, lambda) != 1` (cannot occur for primes
///   produced by the enrollment mapping)
/// - `InvalidOperand` when `A` is outside [1, N)
pub fn remove_single(params: &AccumulatorParams, a: &BigUint, p: &BigUint) -> Result<BigUint> {
    check_element(params, a, "accumulator value")?;
    let lambda = params.lambda();
    let reduced = p % &lambda;
    if !gcd(&reduced, &lambda).is_one() {
        return Err(CryptoError::NotCoprime);
    }
    let d = modinv(&reduced, &lambda).map_err(|_| CryptoError::NotCoprime)?;
    modpow_ct(a, &d, params.n())
}

/// Trapdoor removal of several members in one exponentiation.
///
/// Computes `P = (prod primes) mod lambda` and raises `A` to
/// `P^-1 mod lambda`.
///
/// # Errors
///
/// `NotCoprime` if any prime shares a factor with lambda(N).
pub fn remove_batch<'a, I>(params: &AccumulatorParams, a: &BigUint, primes: I) -> Result<BigUint>
where
    I: IntoIterator<Item = &'a BigUint>,
{
    check_element(params, a, "accumulator value")?;
    let lambda = params.lambda();

    let mut product = BigUint::one();
    let mut any = false;
    for p in primes {
        if !gcd(p, &lambda).is_one() {
            return Err(CryptoError::NotCoprime);
        }
        product = (product * p) % &lambda;
        any = true;
    }
    if !any {
        return Ok(a.clone());
    }

    let d = modinv(&product, &lambda).map_err(|_| CryptoError::NotCoprime)?;
    modpow_ct(a, &d, params.n())
}

/// Check the removal postcondition: `new^removed ≡ old (mod N)`.
pub fn verify_removal(
    params: &AccumulatorParams,
    old_root: &BigUint,
    new_root: &BigUint,
    removed: &BigUint,
) -> bool {
    verify(params, new_root, removed, old_root)
}

// ============================================================================
// Tests
// ============================================================================
