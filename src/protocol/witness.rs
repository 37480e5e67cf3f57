//! # Witness Refresh
//!
//! Algorithms for keeping per-device membership witnesses consistent
//! with the accumulator root as members come and go.
//!
//! ## Cost profile
//!
//! - **Addition** is cheap: every existing witness is raised to the new
//!   prime, no trapdoor required.
//! - **Removal** costs one trapdoor exponentiation per remaining active
//!   device: each refreshed witness is the new root with that device's
//!   own prime removed.
//!
//! The enrolling device itself needs no computation at all: the
//! pre-update root *is* its witness, since `root_old^p = root_new`.
//!
//! All functions are pure; the identity state machine stages their
//! results and applies them only when the anchor confirms.

use num_bigint::BigUint;

use crate::crypto::accumulator::{recompute_from_set, remove_single};
use crate::crypto::bigint::modpow;
use crate::crypto::error::Result;
use crate::crypto::params::AccumulatorParams;
use crate::models::device::DeviceId;

/// Update one witness after a member with `added_prime` joined:
/// `w' = w^added_prime mod N`.
pub fn refresh_on_add(
    params: &AccumulatorParams,
    witness: &BigUint,
    added_prime: &BigUint,
) -> Result<BigUint> {
    modpow(witness, added_prime, params.n())
}

/// Recompute one witness from the post-removal root: the witness for
/// prime `p` is the root with `p` trapdoor-removed.
pub fn refresh_after_removal(
    params: &AccumulatorParams,
    new_root: &BigUint,
    prime: &BigUint,
) -> Result<BigUint> {
    remove_single(params, new_root, prime)
}

/// Refresh every remaining member after a removal, one trapdoor
/// exponentiation each. Returns `(device, witness)` pairs in input order.
pub fn refresh_all_after_removal(
    params: &AccumulatorParams,
    new_root: &BigUint,
    remaining: &[(DeviceId, BigUint)],
) -> Result<Vec<(DeviceId, BigUint)>> {
    remaining
        .iter()
        .map(|(id, prime)| Ok((*id, refresh_after_removal(params, new_root, prime)?)))
        .collect()
}

/// Compute a witness from scratch as the accumulation of the *other*
/// active primes (the target's prime excluded by the caller).
pub fn witness_from_primes<'a, I>(params: &AccumulatorParams, other_primes: I) -> Result<BigUint>
where
    I: IntoIterator<Item = &'a BigUint>,
{
    recompute_from_set(params, other_primes)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::accumulator::{add, verify};

    fn toy() -> AccumulatorParams {
        AccumulatorParams::toy()
    }

    fn p(v: u32) -> BigUint {
        BigUint::from(v)
    }

    #[test]
    fn test_refresh_on_add_tracks_root() {
        // set {13}: root = 9, witness for 13 = g = 4
        let params = toy();
        let root = add(&params, params.g(), &p(13)).unwrap();
        let w13 = params.g().clone();
        assert!(verify(&params, &w13, &p(13), &root));

        // 17 joins: root' = 169, w13' = 4^17
        let root = add(&params, &root, &p(17)).unwrap();
        let w13 = refresh_on_add(&params, &w13, &p(17)).unwrap();
        assert!(verify(&params, &w13, &p(13), &root));
    }

    #[test]
    fn test_refresh_on_add_matches_recompute() {
        let params = toy();
        // witness for 13 in {13, 17, 23} is the accumulation of {17, 23}
        let incremental = {
            let w = refresh_on_add(&params, params.g(), &p(17)).unwrap();
            refresh_on_add(&params, &w, &p(23)).unwrap()
        };
        let recomputed = witness_from_primes(&params, [p(17), p(23)].iter()).unwrap();
        assert_eq!(incremental, recomputed);
        assert_eq!(incremental, p(180));
    }

    #[test]
    fn test_refresh_after_removal_toy() {
        // set {13, 17, 23} with root 196; revoke 17 -> root 168
        let params = toy();
        let new_root = p(168);

        let w13 = refresh_after_removal(&params, &new_root, &p(13)).unwrap();
        let w23 = refresh_after_removal(&params, &new_root, &p(23)).unwrap();

        // 4^23 and 4^13 respectively
        assert_eq!(w13, p(207));
        assert_eq!(w23, p(9));
        assert!(verify(&params, &w13, &p(13), &new_root));
        assert!(verify(&params, &w23, &p(23), &new_root));

        // the revoked member's old witness no longer verifies
        assert!(!verify(&params, &p(168), &p(17), &new_root));
    }

    #[test]
    fn test_refresh_all_after_removal() {
        let params = toy();
        let id_a = DeviceId::from_spki_der(b"a");
        let id_b = DeviceId::from_spki_der(b"b");
        let remaining = vec![(id_a, p(13)), (id_b, p(23))];

        let refreshed = refresh_all_after_removal(&params, &p(168), &remaining).unwrap();
        assert_eq!(refreshed.len(), 2);
        for (id, w) in &refreshed {
            let prime = if *id == id_a { p(13) } else { p(23) };
            assert!(verify(&params, w, &prime, &p(168)));
        }
    }

    #[test]
    fn test_witness_from_no_others_is_generator() {
        // sole member: witness is g
        let params = toy();
        let w = witness_from_primes(&params, std::iter::empty()).unwrap();
        assert_eq!(&w, params.g());
    }
}
