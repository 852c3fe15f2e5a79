// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Elliptic curve abstraction.
//!
//! The protocol is written once against [`CurveTrait`] and [`ScalarTrait`];
//! [`Secp256k1`] and [`P256`] plug the `k256` and `p256` crates in.

use crate::errors::Result;
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

pub use crate::secp256k1::Secp256k1;
pub use crate::secp256r1::P256;

/// Byte length of a serialized scalar for the supported curves.
pub(crate) const SCALAR_BYTES: usize = 32;

/// Scalar field element of a curve (integers mod the group order `q`).
pub trait ScalarTrait:
    'static + Copy + Clone + Debug + PartialEq + Eq + Send + Sync + Zeroize
{
    /// Return the zero scalar.
    fn zero() -> Self;

    /// Return the one scalar.
    fn one() -> Self;

    /// Convert a small integer (e.g. a party index) into a scalar.
    fn from_u64(x: u64) -> Self;

    /// Sample a uniformly random scalar.
    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self;

    /// Add two scalars.
    fn add(&self, other: &Self) -> Self;

    /// Subtract two scalars.
    fn sub(&self, other: &Self) -> Self;

    /// Multiply two scalars.
    fn mul(&self, other: &Self) -> Self;

    /// Negate.
    fn negate(&self) -> Self;

    /// Multiplicative inverse, or `None` for zero.
    fn invert(&self) -> Option<Self>;

    /// True if and only if the scalar is zero.
    fn is_zero(&self) -> bool;

    /// True if and only if self is larger than q/2.
    fn is_high(&self) -> bool;

    /// Big-endian encoding, always [`SCALAR_BYTES`] long.
    fn to_bytes(&self) -> Vec<u8>;

    /// Parse a canonical big-endian encoding. Returns `None` if the slice has
    /// the wrong length or encodes a value `>= q`.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;
}

/// A point on a supported curve, together with the curve's ECDSA plumbing.
pub trait CurveTrait: 'static + Copy + Clone + Debug + PartialEq + Eq + Send + Sync {
    /// Canonical curve name, as written into configs and key shares.
    const NAME: &'static str;

    /// Other names under which the curve is accepted.
    const ALIASES: &'static [&'static str];

    /// The type of scalars.
    type Scalar: ScalarTrait;

    /// The base point.
    fn generator() -> Self;

    /// The point at infinity.
    fn identity() -> Self;

    /// Add two points.
    fn add(&self, other: &Self) -> Self;

    /// Subtract two points.
    fn sub(&self, other: &Self) -> Self;

    /// Multiply `self` by a [`Self::Scalar`].
    fn mul(&self, scalar: &Self::Scalar) -> Self;

    /// True if and only if this is the point at infinity.
    fn is_identity(&self) -> bool;

    /// The order of the curve.
    fn order() -> BigNumber;

    /// Affine x-coordinate of the point, reduced mod `q`.
    fn x_projection(&self) -> Result<Self::Scalar>;

    /// SEC1 compressed encoding.
    fn to_bytes(&self) -> Vec<u8>;

    /// Parse a SEC1 (compressed or uncompressed) encoding.
    fn try_from_bytes(bytes: &[u8]) -> Result<Self>;

    /// DER-encode the ECDSA signature `(r, s)`.
    fn encode_signature(r: &Self::Scalar, s: &Self::Scalar) -> Result<Vec<u8>>;

    /// Verify a DER-encoded signature over a message digest, using `self` as
    /// the public key.
    fn verify_prehash(&self, digest: &[u8], der_signature: &[u8]) -> Result<()>;

    /// Returns `true` if `name` designates this curve.
    fn matches_name(name: &str) -> bool {
        name.eq_ignore_ascii_case(Self::NAME)
            || Self::ALIASES.iter().any(|a| name.eq_ignore_ascii_case(a))
    }

    /// Multiply the generator by a scalar.
    fn scale_generator(scalar: &Self::Scalar) -> Self {
        Self::generator().mul(scalar)
    }
}

/// Returns `x mod q` as a curve scalar. Negative inputs are handled.
pub(crate) fn bn_to_scalar<C: CurveTrait>(x: &BigNumber) -> Result<C::Scalar> {
    let order = C::order();
    let x_modded = x.nmod(&order);

    let bytes = Zeroizing::new(x_modded.to_bytes());
    if bytes.len() > SCALAR_BYTES {
        error!("Reduced BigNumber does not fit into a scalar");
        return crypto_err!("value does not fit into a {} scalar", C::NAME);
    }
    let mut padded = Zeroizing::new(vec![0u8; SCALAR_BYTES - bytes.len()]);
    padded.extend_from_slice(&bytes);

    match C::Scalar::from_bytes(&padded) {
        Some(s) => Ok(s),
        None => {
            error!("Failed to convert BigNumber into a scalar");
            crypto_err!("value is not a canonical {} scalar", C::NAME)
        }
    }
}

/// Convert a scalar into a non-negative [`BigNumber`].
pub(crate) fn scalar_to_bn<S: ScalarTrait>(x: &S) -> BigNumber {
    let bytes = Zeroizing::new(x.to_bytes());
    BigNumber::from_slice(&*bytes)
}

/// Interpret a message digest as a scalar, the way ECDSA does: keep the
/// leftmost [`SCALAR_BYTES`] bytes and reduce mod `q`.
pub(crate) fn scalar_from_digest<C: CurveTrait>(digest: &[u8]) -> Result<C::Scalar> {
    if digest.is_empty() {
        return config_err!("message digest must not be empty");
    }
    let len = digest.len().min(SCALAR_BYTES);
    bn_to_scalar::<C>(&BigNumber::from_slice(&digest[..len]))
}

/// Parse a scalar from hex, for persisted key shares.
pub(crate) fn scalar_from_hex<S: ScalarTrait>(hex_str: &str) -> Result<S> {
    let bytes = Zeroizing::new(
        hex::decode(hex_str).or_else(|e| crypto_err!("scalar is not valid hex: {}", e))?,
    );
    match S::from_bytes(&bytes) {
        Some(s) => Ok(s),
        None => crypto_err!("scalar encoding is not canonical"),
    }
}

/// Parse a point from hex.
pub(crate) fn point_from_hex<C: CurveTrait>(hex_str: &str) -> Result<C> {
    let bytes = hex::decode(hex_str).or_else(|e| crypto_err!("point is not valid hex: {}", e))?;
    C::try_from_bytes(&bytes)
}

/// Hex encoding of the compressed point.
pub(crate) fn point_to_hex<C: CurveTrait>(point: &C) -> String {
    hex::encode(point.to_bytes())
}
