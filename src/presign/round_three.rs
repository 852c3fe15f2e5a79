// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{bn_to_scalar, CurveTrait, ScalarTrait},
    errors::Result,
    message_store::MessageStore,
    messages::{Message, MessageType, PartyIndex},
    paillier::{PaillierCiphertext, PaillierDecryptionKey},
    presign::round_two::Private as RoundTwoPrivate,
};
use std::fmt::Debug;
use tracing::error;
use zeroize::Zeroize;

/// Private data kept after round three.
pub(crate) struct Private<C: CurveTrait> {
    /// Additive share of `k·g`.
    pub kg: C::Scalar,
    /// Additive share of `k·w`, where `w` is the signing key.
    pub kw: C::Scalar,
    pub g_point: C,
}

impl<C: CurveTrait> Drop for Private<C> {
    fn drop(&mut self) {
        self.kg.zeroize();
        self.kw.zeroize();
    }
}

impl<C: CurveTrait> Debug for Private<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("presign::round_three::Private")
            .field("kg", &"[redacted]")
            .field("kw", &"[redacted]")
            .field("g_point", &self.g_point)
            .finish()
    }
}

/// The broadcast share `kg_i`. Revealing it is fine: `k·g` is uniformly
/// random and only its sum is ever used.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Public<S: ScalarTrait> {
    pub kg: S,
}

impl<S: ScalarTrait> Public<S> {
    pub(crate) fn to_message(&self, from: PartyIndex) -> Result<Message> {
        Message::new(
            MessageType::KGShare,
            from,
            PartyIndex::BROADCAST,
            self.kg.to_bytes(),
        )
    }

    pub(crate) fn from_store(store: &impl MessageStore, from: PartyIndex) -> Result<Self> {
        let message = store.read_required(from, PartyIndex::BROADCAST, MessageType::KGShare)?;
        match S::from_bytes(message.data()) {
            Some(kg) => Ok(Self { kg }),
            None => {
                error!("Party {} broadcast a malformed kg share", from);
                crypto_err!("malformed kg share from party {}", from)
            }
        }
    }
}

fn decrypt_from<C: CurveTrait>(
    store: &impl MessageStore,
    paillier: &PaillierDecryptionKey,
    from: PartyIndex,
    to: PartyIndex,
    message_type: MessageType,
) -> Result<C::Scalar> {
    let message = store.read_required(from, to, message_type)?;
    let ciphertext = PaillierCiphertext::from_bytes(message.data())?;
    let plaintext = paillier.decrypt(&ciphertext)?;
    bn_to_scalar::<C>(&plaintext)
}

/// Decrypt the MtA ciphertexts sent to `me` by each of `peers` and combine
/// them with the corrections kept in round two.
pub(crate) fn run<C: CurveTrait>(
    store: &impl MessageStore,
    paillier: &PaillierDecryptionKey,
    me: PartyIndex,
    peers: &[PartyIndex],
    round_two: &RoundTwoPrivate<C>,
) -> Result<(Private<C>, Public<C::Scalar>)> {
    let mut kg = round_two.sum_k;
    let mut kw = round_two.sum_w;
    for j in peers {
        let mut alpha_k = decrypt_from::<C>(store, paillier, *j, me, MessageType::EncryptedKG)?;
        let mut alpha_w = decrypt_from::<C>(store, paillier, *j, me, MessageType::EncryptedKW)?;
        kg = kg.add(&alpha_k);
        kw = kw.add(&alpha_w);
        alpha_k.zeroize();
        alpha_w.zeroize();
    }
    let public = Public { kg };
    Ok((
        Private {
            kg,
            kw,
            g_point: round_two.g_point,
        },
        public,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{curve::P256, message_store::InMemoryMessageStore, utils::testing::init_testing};

    #[test]
    fn kg_share_goes_through_the_store() -> Result<()> {
        let mut rng = init_testing();
        let kg = <P256 as CurveTrait>::Scalar::random(&mut rng);
        let from = PartyIndex::new(3)?;
        let mut store = InMemoryMessageStore::new();
        store.save(Public { kg }.to_message(from)?)?;
        assert_eq!(Public::<<P256 as CurveTrait>::Scalar>::from_store(&store, from)?.kg, kg);

        let other = PartyIndex::new(2)?;
        store.save(Message::new(
            MessageType::KGShare,
            other,
            PartyIndex::BROADCAST,
            vec![0xff; 32],
        )?)?;
        assert!(Public::<<P256 as CurveTrait>::Scalar>::from_store(&store, other).is_err());
        Ok(())
    }
}
