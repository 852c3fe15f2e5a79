// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The sender's half of the multiplicative-to-additive (MtA) exchange.
//!
//! For a peer `j` with ciphertext `enc_j(k_j)`, signer `i` returns
//! `enc_j(k_j·g_i + β)` and `enc_j(k_j·w_i + β')` and keeps `-β`, `-β'`. The
//! masks are drawn from `[0, N - q²)` so that the plaintexts never wrap
//! around `N`, and the peer's decryption reduced mod `q` plus the kept
//! `-β mod q` is an additive sharing of `k_j·g_i`.

use crate::{
    curve::{bn_to_scalar, scalar_to_bn, CurveTrait},
    errors::Result,
    messages::{Message, MessageType, PartyIndex},
    paillier::PaillierCiphertext,
    presign::round_one::PublicBroadcast as RoundOnePublic,
    utils::random_bn,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use zeroize::Zeroize;

/// Private data kept after round two.
pub(crate) struct Private<C: CurveTrait> {
    /// Additive correction for this signer's share of `k·g`: the negated
    /// masks plus the local cross term `k_i·g_i`.
    pub sum_k: C::Scalar,
    /// Additive correction for this signer's share of `k·w`.
    pub sum_w: C::Scalar,
    /// `g·G`, summed over the signer set.
    pub g_point: C,
}

impl<C: CurveTrait> Drop for Private<C> {
    fn drop(&mut self) {
        self.sum_k.zeroize();
        self.sum_w.zeroize();
    }
}

impl<C: CurveTrait> Debug for Private<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("presign::round_two::Private")
            .field("sum_k", &"[redacted]")
            .field("sum_w", &"[redacted]")
            .field("g_point", &self.g_point)
            .finish()
    }
}

/// The two masked ciphertexts sent to one peer.
#[derive(Clone, Debug)]
pub(crate) struct Public {
    pub enc_kg: PaillierCiphertext,
    pub enc_kw: PaillierCiphertext,
}

impl Public {
    pub(crate) fn to_messages(&self, from: PartyIndex, to: PartyIndex) -> Result<Vec<Message>> {
        Ok(vec![
            Message::new(MessageType::EncryptedKG, from, to, self.enc_kg.to_bytes())?,
            Message::new(MessageType::EncryptedKW, from, to, self.enc_kw.to_bytes())?,
        ])
    }
}

/// `enc(k_j·x + β)` under the peer's key, returning the ciphertext and
/// `-β mod q`.
fn masked_product<C: CurveTrait, R: RngCore + CryptoRng>(
    rng: &mut R,
    peer: &RoundOnePublic<C>,
    x: &C::Scalar,
) -> Result<(PaillierCiphertext, C::Scalar)> {
    let pk = &peer.paillier_pk;
    let order = C::order();
    let mask_bound = pk.n() - &(&order * &order);
    let mut beta = random_bn(rng, &mask_bound);

    let product = pk.scalar_mul(&scalar_to_bn(x), &peer.enc_k)?;
    let enc_beta = pk.encrypt(rng, &beta)?;
    let masked = pk.add(&product, &enc_beta)?;

    let correction = bn_to_scalar::<C>(&(BigNumber::zero() - &beta))?;
    beta.zeroize();
    Ok((masked, correction))
}

/// Run both MtA exchanges of signer `i` (holding `g_i`, `w_i`) with one peer.
/// Returns the peer's ciphertexts and this signer's corrections for `k·g`
/// and `k·w`.
pub(crate) fn mta_for_peer<C: CurveTrait, R: RngCore + CryptoRng>(
    rng: &mut R,
    peer: &RoundOnePublic<C>,
    g_i: &C::Scalar,
    w_i: &C::Scalar,
) -> Result<(Public, C::Scalar, C::Scalar)> {
    let (enc_kg, beta_k) = masked_product(rng, peer, g_i)?;
    let (enc_kw, beta_w) = masked_product(rng, peer, w_i)?;
    Ok((Public { enc_kg, enc_kw }, beta_k, beta_w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::{ScalarTrait, P256},
        presign::round_one,
        utils::testing::*,
    };

    #[test]
    fn decryption_plus_correction_is_the_product() -> Result<()> {
        let mut rng = init_testing();
        let sk_j = get_test_paillier_key(&mut rng);
        let (private_j, public_j) = round_one::run::<P256, _>(&mut rng, &sk_j)?;

        let g_i = <P256 as CurveTrait>::Scalar::random(&mut rng);
        let w_i = <P256 as CurveTrait>::Scalar::random(&mut rng);
        let (public, beta_k, beta_w) = mta_for_peer(&mut rng, &public_j, &g_i, &w_i)?;

        let alpha_k = bn_to_scalar::<P256>(&sk_j.decrypt(&public.enc_kg)?)?;
        let alpha_w = bn_to_scalar::<P256>(&sk_j.decrypt(&public.enc_kw)?)?;
        assert_eq!(alpha_k.add(&beta_k), private_j.k.mul(&g_i));
        assert_eq!(alpha_w.add(&beta_w), private_j.k.mul(&w_i));
        Ok(())
    }
}
