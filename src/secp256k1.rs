// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! secp256k1 backend, on top of the `k256` crate.

use crate::{
    curve::{CurveTrait, ScalarTrait, SCALAR_BYTES},
    errors::Result,
};
use ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use generic_array::GenericArray;
use k256::{
    elliptic_curve::{
        bigint::Encoding,
        ops::Reduce,
        point::AffineCoordinates,
        scalar::IsHigh,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Curve, Field, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar, U256,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use tracing::error;

/// A point on secp256k1.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Secp256k1(pub(crate) ProjectivePoint);

impl From<ProjectivePoint> for Secp256k1 {
    fn from(p: ProjectivePoint) -> Self {
        Self(p)
    }
}

impl ScalarTrait for Scalar {
    fn zero() -> Self {
        Scalar::ZERO
    }

    fn one() -> Self {
        Scalar::ONE
    }

    fn from_u64(x: u64) -> Self {
        Scalar::from(x)
    }

    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        <Scalar as Field>::random(rng)
    }

    fn add(&self, other: &Self) -> Self {
        *self + *other
    }

    fn sub(&self, other: &Self) -> Self {
        *self - *other
    }

    fn mul(&self, other: &Self) -> Self {
        *self * *other
    }

    fn negate(&self) -> Self {
        -*self
    }

    fn invert(&self) -> Option<Self> {
        Option::from(<Scalar as Field>::invert(self))
    }

    fn is_zero(&self) -> bool {
        bool::from(<Scalar as Field>::is_zero(self))
    }

    fn is_high(&self) -> bool {
        bool::from(<Scalar as IsHigh>::is_high(self))
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.to_repr().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SCALAR_BYTES {
            return None;
        }
        Option::from(<Scalar as PrimeField>::from_repr(
            GenericArray::clone_from_slice(bytes),
        ))
    }
}

impl CurveTrait for Secp256k1 {
    const NAME: &'static str = "secp256k1";
    const ALIASES: &'static [&'static str] = &[];

    type Scalar = Scalar;

    fn generator() -> Self {
        Self(ProjectivePoint::GENERATOR)
    }

    fn identity() -> Self {
        Self(ProjectivePoint::IDENTITY)
    }

    fn add(&self, other: &Self) -> Self {
        Self(self.0 + other.0)
    }

    fn sub(&self, other: &Self) -> Self {
        Self(self.0 - other.0)
    }

    fn mul(&self, scalar: &Self::Scalar) -> Self {
        Self(self.0 * scalar)
    }

    fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }

    fn order() -> BigNumber {
        let order_bytes: [u8; 32] = k256::Secp256k1::ORDER.to_be_bytes();
        BigNumber::from_slice(order_bytes)
    }

    fn x_projection(&self) -> Result<Self::Scalar> {
        if self.is_identity() {
            error!("Cannot take the x-projection of the point at infinity");
            return crypto_err!("x-projection of the point at infinity");
        }
        let x = self.0.to_affine().x();
        Ok(<Scalar as Reduce<U256>>::reduce_bytes(&x))
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let encoded = EncodedPoint::from_bytes(bytes).or_else(|_| {
            error!("Failed to parse a SEC1 encoded secp256k1 point");
            crypto_err!("invalid SEC1 encoding for secp256k1")
        })?;
        let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
        match point {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("Encoded bytes are not a point on secp256k1");
                crypto_err!("not a point on secp256k1")
            }
        }
    }

    fn encode_signature(r: &Self::Scalar, s: &Self::Scalar) -> Result<Vec<u8>> {
        let signature = Signature::<k256::Secp256k1>::from_scalars(r.to_repr(), s.to_repr())
            .or_else(|e| crypto_err!("failed to build a secp256k1 signature: {}", e))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify_prehash(&self, digest: &[u8], der_signature: &[u8]) -> Result<()> {
        let key = VerifyingKey::<k256::Secp256k1>::from_affine(self.0.to_affine())
            .or_else(|e| crypto_err!("invalid secp256k1 verifying key: {}", e))?;
        let signature = Signature::<k256::Secp256k1>::from_der(der_signature)
            .or_else(|e| crypto_err!("invalid DER signature: {}", e))?;
        key.verify_prehash(digest, &signature)
            .or_else(|_| integrity_err!("signature does not verify under the public key"))
    }
}
