// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{scalar_from_digest, CurveTrait, ScalarTrait},
    errors::Result,
    presign::round_three::{Private as RoundThreePrivate, Public as RoundThreePublic},
};
use std::fmt::Debug;
use tracing::error;
use zeroize::Zeroize;

/// The precomputation used to create a partial signature.
///
/// # 🔒 Lifetime requirements
/// This type must only be used _once_. [`PresignRecord::sign`] consumes it.
pub(crate) struct PresignRecord<C: CurveTrait> {
    r: C::Scalar,
    k: C::Scalar,
    kw: C::Scalar,
}

impl<C: CurveTrait> Drop for PresignRecord<C> {
    fn drop(&mut self) {
        self.k.zeroize();
        self.kw.zeroize();
    }
}

impl<C: CurveTrait> Debug for PresignRecord<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresignRecord")
            .field("r", &self.r)
            .field("k", &"[redacted]")
            .field("kw", &"[redacted]")
            .finish()
    }
}

impl<C: CurveTrait> PresignRecord<C> {
    /// Combine this signer's round three output with every other signer's
    /// `kg_j`: `R = (g·G)·(k·g)⁻¹ = k⁻¹·G`, `r = x(R) mod q`.
    pub(crate) fn new(
        k: C::Scalar,
        private: &RoundThreePrivate<C>,
        publics: &[RoundThreePublic<C::Scalar>],
    ) -> Result<Self> {
        let kg = publics
            .iter()
            .fold(private.kg, |acc, public| acc.add(&public.kg));
        let kg_inv = match kg.invert() {
            Some(inv) => inv,
            None => {
                error!("Could not invert kg as it is 0");
                return crypto_err!("aggregated k·g is zero");
            }
        };
        let big_r = private.g_point.mul(&kg_inv);
        if big_r.is_identity() {
            error!("Presignature point R is the point at infinity");
            return crypto_err!("R is the point at infinity");
        }
        let r = big_r.x_projection()?;
        if r.is_zero() {
            error!("x-coordinate of R is 0 mod q");
            return crypto_err!("r is zero");
        }
        Ok(Self {
            r,
            k,
            kw: private.kw,
        })
    }

    pub(crate) fn r(&self) -> &C::Scalar {
        &self.r
    }

    /// `s_i = r·kw_i + m·k_i`, where `m` is the digest reduced mod `q`.
    pub(crate) fn sign(self, digest: &[u8]) -> Result<(C::Scalar, C::Scalar)> {
        let m = scalar_from_digest::<C>(digest)?;
        let s = self.r.mul(&self.kw).add(&m.mul(&self.k));
        Ok((self.r, s))
    }
}
