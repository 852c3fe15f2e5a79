// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{scalar_to_bn, CurveTrait, ScalarTrait},
    errors::Result,
    message_store::MessageStore,
    messages::{Message, MessageType, PartyIndex},
    paillier::{PaillierCiphertext, PaillierDecryptionKey, PaillierEncryptionKey},
};
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use tracing::error;

/// Private data used in round one of the signing protocol: the signer's
/// ephemeral shares `k_i` and `g_i`.
pub(crate) struct Private<S: ScalarTrait> {
    pub k: S,
    pub g: S,
}

impl<S: ScalarTrait> Drop for Private<S> {
    fn drop(&mut self) {
        self.k.zeroize();
        self.g.zeroize();
    }
}

impl<S: ScalarTrait> Debug for Private<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("presign::round_one::Private")
            .field("k", &"[redacted]")
            .field("g", &"[redacted]")
            .finish()
    }
}

/// What a signer broadcasts in round one.
#[derive(Clone, Debug)]
pub(crate) struct PublicBroadcast<C: CurveTrait> {
    /// `enc(k_i)` under the signer's own Paillier key.
    pub enc_k: PaillierCiphertext,
    /// `g_i·G`
    pub g_point: C,
    pub paillier_pk: PaillierEncryptionKey,
}

impl<C: CurveTrait> PublicBroadcast<C> {
    pub(crate) fn to_messages(&self, from: PartyIndex) -> Result<Vec<Message>> {
        Ok(vec![
            Message::new(
                MessageType::EncryptedK,
                from,
                PartyIndex::BROADCAST,
                self.enc_k.to_bytes(),
            )?,
            Message::new(
                MessageType::GammaPoint,
                from,
                PartyIndex::BROADCAST,
                self.g_point.to_bytes(),
            )?,
            Message::new(
                MessageType::PaillierPublicKey,
                from,
                PartyIndex::BROADCAST,
                self.paillier_pk.to_bytes()?,
            )?,
        ])
    }

    /// Read and validate the round one broadcast of party `from`.
    ///
    /// The sender's Paillier modulus must be large enough to carry an MtA
    /// product without wrapping around.
    pub(crate) fn from_store(store: &impl MessageStore, from: PartyIndex) -> Result<Self> {
        let enc_k = store.read_required(from, PartyIndex::BROADCAST, MessageType::EncryptedK)?;
        let g_point = store.read_required(from, PartyIndex::BROADCAST, MessageType::GammaPoint)?;
        let paillier_pk =
            store.read_required(from, PartyIndex::BROADCAST, MessageType::PaillierPublicKey)?;

        let paillier_pk = PaillierEncryptionKey::from_bytes(paillier_pk.data())?;
        paillier_pk.check_modulus_for(&C::order())?;
        let enc_k = PaillierCiphertext::from_bytes(enc_k.data())?;
        paillier_pk.check_ciphertext(&enc_k)?;
        let g_point = C::try_from_bytes(g_point.data())?;
        if g_point.is_identity() {
            error!("Party {} committed to g_i = 0", from);
            return crypto_err!("party {} sent the point at infinity as g_i·G", from);
        }
        Ok(Self {
            enc_k,
            g_point,
            paillier_pk,
        })
    }
}

/// Sample fresh `k_i`, `g_i` and build the round one broadcast.
pub(crate) fn run<C: CurveTrait, R: RngCore + CryptoRng>(
    rng: &mut R,
    paillier: &PaillierDecryptionKey,
) -> Result<(Private<C::Scalar>, PublicBroadcast<C>)> {
    let private = Private {
        k: C::Scalar::random(rng),
        g: C::Scalar::random(rng),
    };
    let paillier_pk = paillier.encryption_key().clone();
    let enc_k = paillier_pk.encrypt(rng, &scalar_to_bn(&private.k))?;
    let public = PublicBroadcast {
        enc_k,
        g_point: C::scale_generator(&private.g),
        paillier_pk,
    };
    Ok((private, public))
}
