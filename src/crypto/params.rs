//! # Global Accumulator Parameters
//!
//! The configuration record `(N, g, lambda(N))` that every accumulator
//! operation consumes. Immutable for the life of the process.
//!
//! ## Sensitivity
//!
//! `lambda(N) = lcm(p-1, q-1)` is the trapdoor: whoever holds it can
//! remove members and forge witnesses. It is stored as big-endian bytes
//! inside [`secrecy::Secret`], zeroized on drop, excluded from `Debug`
//! output, and never serialized by this module. Production deployments
//! load it from a separately-protected document ([`AccumulatorParams::load_split`]).
//!
//! ## Parameter documents
//!
//! ```json
//! { "n": "0xc09f...", "g": "0x04", "lambda_n": "0x..." }
//! ```
//!
//! Values are hex strings, `0x` prefix optional. The combined form is for
//! tests and local-only mode; split documents keep the trapdoor apart.

use std::fmt;
use std::path::Path;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

use super::bigint::gcd;

/// Minimum modulus width accepted by the loading paths (2048-bit with a
/// small tolerance, matching the deployed parameter sets).
pub const MIN_MODULUS_BITS: u64 = 2040;

/// Errors raised while loading or validating parameter documents.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// The document could not be read
    #[error("cannot read parameter document: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid JSON or misses required fields
    #[error("malformed parameter document: {0}")]
    Format(#[from] serde_json::Error),

    /// A field failed validation
    #[error("invalid parameters: {0}")]
    Invalid(String),
}

#[derive(Deserialize)]
struct ParamsDocument {
    n: String,
    g: String,
    #[serde(default)]
    lambda_n: Option<String>,
}

#[derive(Deserialize)]
struct TrapdoorDocument {
    lambda_n: String,
}

/// Global parameters for the RSA accumulator.
///
/// Holds the public modulus `N`, the generator `g` (a quadratic residue,
/// `g = h^2 mod N`), and the secret trapdoor `lambda(N)`.
///
/// # Example
///
/// ```
/// use accredit_core::crypto::params::AccumulatorParams;
///
/// let params = AccumulatorParams::toy();
/// assert_eq!(params.n(), &209u32.into());
/// assert_eq!(params.g(), &4u32.into());
/// ```
pub struct AccumulatorParams {
    n: BigUint,
    g: BigUint,
    lambda: Secret<Vec<u8>>,
}

impl AccumulatorParams {
    /// Assemble parameters from explicit values.
    ///
    /// Validates the structural relations only (the loading paths add the
    /// modulus-width requirement): `N > 1`, `1 < g < N`, `gcd(g, N) = 1`,
    /// `lambda > 0`.
    pub fn new(n: BigUint, g: BigUint, lambda: BigUint) -> Result<Self, ParamsError> {
        if n <= BigUint::one() {
            return Err(ParamsError::Invalid("modulus N must exceed 1".into()));
        }
        if g <= BigUint::one() || g >= n {
            return Err(ParamsError::Invalid(
                "generator g must satisfy 1 < g < N".into(),
            ));
        }
        if !gcd(&g, &n).is_one() {
            return Err(ParamsError::Invalid(
                "generator g must be coprime to N".into(),
            ));
        }
        if lambda.is_zero() {
            return Err(ParamsError::Invalid("lambda(N) must be positive".into()));
        }
        Ok(Self {
            n,
            g,
            lambda: Secret::new(lambda.to_bytes_be()),
        })
    }

    /// Derive parameters from the modulus factors.
    ///
    /// Computes `N = p*q`, `g = h^2 mod N` (with `h = 2`, placing `g` in
    /// the quadratic-residue subgroup) and
    /// `lambda(N) = lcm(p - 1, q - 1)`.
    pub fn from_factors(p: &BigUint, q: &BigUint) -> Result<Self, ParamsError> {
        if p <= &BigUint::one() || q <= &BigUint::one() {
            return Err(ParamsError::Invalid(
                "factors must both exceed 1".into(),
            ));
        }
        if p == q {
            return Err(ParamsError::Invalid("factors must be distinct".into()));
        }
        let n = p * q;
        let g = BigUint::from(4u32) % &n;
        let lambda = (p - 1u32).lcm(&(q - 1u32));
        Self::new(n, g, lambda)
    }

    /// Hand-checkable toy parameters: `N = 209 (= 11 * 19)`, `g = 4`,
    /// `lambda = lcm(10, 18) = 90`. Test-sized only.
    pub fn toy() -> Self {
        Self::from_factors(&BigUint::from(11u32), &BigUint::from(19u32))
            .expect("toy factors are valid")
    }

    /// Load a combined parameter document (N, g, and the trapdoor in one
    /// file). Intended for tests and local-only deployments.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        // the combined document contains the trapdoor; scrub the raw text
        let raw = Zeroizing::new(std::fs::read_to_string(path)?);
        let doc: ParamsDocument = serde_json::from_str(&raw)?;
        let lambda_hex = Zeroizing::new(doc.lambda_n.ok_or_else(|| {
            ParamsError::Invalid("parameter document is missing lambda_n".into())
        })?);
        Self::from_document(&doc.n, &doc.g, &lambda_hex)
    }

    /// Load split documents: the public parameters from `params_path` and
    /// the trapdoor from a separately-protected `trapdoor_path`.
    pub fn load_split(
        params_path: impl AsRef<Path>,
        trapdoor_path: impl AsRef<Path>,
    ) -> Result<Self, ParamsError> {
        let raw = std::fs::read_to_string(params_path)?;
        let doc: ParamsDocument = serde_json::from_str(&raw)?;
        let raw = Zeroizing::new(std::fs::read_to_string(trapdoor_path)?);
        let trapdoor: TrapdoorDocument = serde_json::from_str(&raw)?;
        Self::from_document(&doc.n, &doc.g, &trapdoor.lambda_n)
    }

    fn from_document(n_hex: &str, g_hex: &str, lambda_hex: &str) -> Result<Self, ParamsError> {
        let n = parse_hex(n_hex, "n")?;
        let g = parse_hex(g_hex, "g")?;
        let lambda = parse_hex(lambda_hex, "lambda_n")?;
        if n.bits() < MIN_MODULUS_BITS {
            return Err(ParamsError::Invalid(format!(
                "modulus N is {} bits; at least {} required",
                n.bits(),
                MIN_MODULUS_BITS
            )));
        }
        Self::new(n, g, lambda)
    }

    /// The public modulus `N`.
    pub fn n(&self) -> &BigUint {
        &self.n
    }

    /// The generator `g`.
    pub fn g(&self) -> &BigUint {
        &self.g
    }

    /// Bit width of the modulus.
    pub fn modulus_bits(&self) -> u64 {
        self.n.bits()
    }

    /// Materialize the trapdoor for an arithmetic operation.
    ///
    /// The returned value is sensitive: callers use it for a single
    /// computation and drop it. It must never reach logs, serialized
    /// state, or the anchor.
    pub(crate) fn lambda(&self) -> BigUint {
        BigUint::from_bytes_be(self.lambda.expose_secret())
    }
}

impl fmt::Debug for AccumulatorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorParams")
            .field("n_bits", &self.n.bits())
            .field("g", &self.g)
            .field("lambda", &"<redacted>")
            .finish()
    }
}

fn parse_hex(value: &str, field: &str) -> Result<BigUint, ParamsError> {
    let trimmed = value.trim().trim_start_matches("0x");
    BigUint::parse_bytes(trimmed.as_bytes(), 16)
        .ok_or_else(|| ParamsError::Invalid(format!("field {} is not valid hex", field)))
}

// ============================================================================
// Tests
// ============================================================================
