// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    config::KeyShareConfig,
    curve::{CurveTrait, ScalarTrait},
    errors::Result,
    keygen::keyshare::PlayerKeyShare,
    message_store::MessageStore,
    messages::{Message, MessageType, PartyIndex},
    polynomial::Polynomial,
    utils::all_distinct,
};
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use tracing::{error, info, instrument};
use zeroize::Zeroize;

/// Progress of a [`KeySharingPlayer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeygenStatus {
    /// Created from a configuration, no index yet.
    Uninitialized,
    /// Knows its own index and the indexes of every other party.
    IndexAssigned,
    /// Has produced its private shares for the other parties.
    SharesPublished,
    /// Holds a usable key share.
    Finalized,
}

/// One party of the key generation and key refresh protocols.
///
/// Key generation: [`set_index`](Self::set_index),
/// [`generate_key`](Self::generate_key), [`finalize`](Self::finalize).
/// Key refresh starts from a finalized share:
/// [`from_key_share`](Self::from_key_share),
/// [`update_key`](Self::update_key), [`finalize`](Self::finalize).
pub struct KeySharingPlayer<C: CurveTrait> {
    key_id: String,
    t: usize,
    status: KeygenStatus,
    my_index: Option<PartyIndex>,
    others: Vec<PartyIndex>,
    /// The accumulated share; zero until the first finalization.
    xi: C::Scalar,
    /// This party's own evaluation `f_i(i)` of the current polynomial.
    own_share: C::Scalar,
    ui_g: Option<C>,
}

impl<C: CurveTrait> Drop for KeySharingPlayer<C> {
    fn drop(&mut self) {
        self.xi.zeroize();
        self.own_share.zeroize();
    }
}

impl<C: CurveTrait> Debug for KeySharingPlayer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySharingPlayer")
            .field("key_id", &self.key_id)
            .field("t", &self.t)
            .field("status", &self.status)
            .field("my_index", &self.my_index)
            .field("others", &self.others)
            .field("xi", &"[redacted]")
            .field("own_share", &"[redacted]")
            .field("ui_g", &self.ui_g)
            .finish()
    }
}

impl<C: CurveTrait> KeySharingPlayer<C> {
    /// A fresh party for the key described by `config`.
    pub fn new(config: &KeyShareConfig) -> Result<Self> {
        config.check_curve::<C>()?;
        Ok(Self {
            key_id: config.key_id().to_string(),
            t: config.t(),
            status: KeygenStatus::Uninitialized,
            my_index: None,
            others: vec![],
            xi: C::Scalar::zero(),
            own_share: C::Scalar::zero(),
            ui_g: None,
        })
    }

    /// A party holding an existing share, ready for a refresh round.
    pub fn from_key_share(share: &PlayerKeyShare<C>) -> Self {
        Self {
            key_id: share.key_id().to_string(),
            t: share.threshold(),
            status: KeygenStatus::Finalized,
            my_index: Some(share.index()),
            others: share.others().to_vec(),
            xi: *share.xi(),
            own_share: C::Scalar::zero(),
            ui_g: Some(*share.public_share()),
        }
    }

    /// Identifier of the key being shared.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Where this player is in the key generation.
    pub fn status(&self) -> KeygenStatus {
        self.status
    }

    /// This party's index, once assigned.
    pub fn index(&self) -> Option<PartyIndex> {
        self.my_index
    }

    fn expect_status(&self, expected: KeygenStatus, operation: &str) -> Result<()> {
        if self.status != expected {
            error!(
                "Cannot {} in state {:?} (expected {:?})",
                operation, self.status, expected
            );
            return state_err!(
                "cannot {} while {:?}, expected {:?}",
                operation,
                self.status,
                expected
            );
        }
        Ok(())
    }

    fn my_index(&self) -> Result<PartyIndex> {
        match self.my_index {
            Some(index) => Ok(index),
            None => state_err!("party index has not been assigned"),
        }
    }

    /// Assign this party's index among `all_indexes`, which lists every party
    /// (this one included).
    pub fn set_index(&mut self, my_index: PartyIndex, all_indexes: &[PartyIndex]) -> Result<()> {
        self.expect_status(KeygenStatus::Uninitialized, "assign an index")?;
        if my_index.is_broadcast() || all_indexes.iter().any(PartyIndex::is_broadcast) {
            return config_err!("party indexes start at 1");
        }
        if !all_indexes.contains(&my_index) || !all_distinct(all_indexes) {
            return config_err!(
                "index {} must appear exactly once among {:?}",
                my_index,
                all_indexes
            );
        }
        if all_indexes.len() <= self.t {
            return config_err!(
                "{} parties cannot share a key with threshold {}",
                all_indexes.len(),
                self.t
            );
        }
        self.my_index = Some(my_index);
        self.others = all_indexes
            .iter()
            .copied()
            .filter(|i| *i != my_index)
            .collect();
        self.status = KeygenStatus::IndexAssigned;
        Ok(())
    }

    /// Initial key generation: sample a random polynomial of degree `t`,
    /// publish `uiG = c_0·G` and send `u_ij = f_i(j)` to every other party.
    #[instrument(skip_all, err(Debug))]
    pub fn generate_key<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        self.expect_status(KeygenStatus::IndexAssigned, "generate a key")?;
        let polynomial = Polynomial::<C::Scalar>::random(rng, self.t);
        self.ui_g = Some(C::scale_generator(&polynomial.constant()));
        self.xi = C::Scalar::zero();
        self.publish_shares(&polynomial)
    }

    /// Proactive refresh: like [`generate_key`](Self::generate_key), but the
    /// polynomial has a zero constant term, so the shares change while the
    /// shared secret (and `uiG`) stay the same.
    #[instrument(skip_all, err(Debug))]
    pub fn update_key<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        self.expect_status(KeygenStatus::Finalized, "refresh a key")?;
        let polynomial = Polynomial::<C::Scalar>::random_zero_constant(rng, self.t);
        self.publish_shares(&polynomial)
    }

    fn publish_shares(&mut self, polynomial: &Polynomial<C::Scalar>) -> Result<Vec<Message>> {
        let my_index = self.my_index()?;
        let messages = self
            .others
            .iter()
            .map(|j| {
                let uij = polynomial.evaluate_at(*j);
                Message::new(MessageType::KeygenShare, my_index, *j, uij.to_bytes())
            })
            .collect::<Result<Vec<_>>>()?;
        self.own_share = polynomial.evaluate_at(my_index);
        self.status = KeygenStatus::SharesPublished;
        info!("Party {} published {} key shares", my_index, messages.len());
        Ok(messages)
    }

    /// Add up the shares received from every other party (and this party's
    /// own) into `xi`. Returns `uiG` for aggregation of the public key.
    #[instrument(skip_all, err(Debug))]
    pub fn finalize(&mut self, store: &impl MessageStore) -> Result<C> {
        self.expect_status(KeygenStatus::SharesPublished, "finalize")?;
        let my_index = self.my_index()?;

        let mut sum = self.own_share;
        for j in &self.others {
            let message = store.read_required(*j, my_index, MessageType::KeygenShare)?;
            let uij = match C::Scalar::from_bytes(message.data()) {
                Some(uij) => uij,
                None => {
                    error!("Party {} sent a malformed share", j);
                    return crypto_err!("malformed key share from party {}", j);
                }
            };
            sum = sum.add(&uij);
        }
        self.xi = self.xi.add(&sum);
        sum.zeroize();
        self.own_share.zeroize();
        self.status = KeygenStatus::Finalized;

        match self.ui_g {
            Some(ui_g) => Ok(ui_g),
            None => state_err!("public share is missing"),
        }
    }

    /// The finalized share.
    pub fn key_share(&self) -> Result<PlayerKeyShare<C>> {
        self.expect_status(KeygenStatus::Finalized, "export the key share")?;
        let ui_g = match self.ui_g {
            Some(ui_g) => ui_g,
            None => return state_err!("public share is missing"),
        };
        PlayerKeyShare::new(
            self.key_id.clone(),
            self.my_index()?,
            self.others.clone(),
            self.t,
            self.xi,
            ui_g,
        )
    }

    pub(crate) fn xi(&self) -> Result<&C::Scalar> {
        self.expect_status(KeygenStatus::Finalized, "read the key share")?;
        Ok(&self.xi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::{Secp256k1, P256},
        errors::Error,
        message_store::InMemoryMessageStore,
        polynomial::interpolate_at_zero,
        utils::testing::init_testing,
    };
    use rand::{CryptoRng, RngCore};

    fn indexes(n: u32) -> Vec<PartyIndex> {
        (1..=n).map(|i| PartyIndex::new(i).unwrap()).collect()
    }

    fn run_keygen<C: CurveTrait, R: RngCore + CryptoRng>(
        rng: &mut R,
        n: usize,
        t: usize,
    ) -> Result<(Vec<KeySharingPlayer<C>>, C)> {
        let config = KeyShareConfig::new("keygen-test", C::NAME, n, t)?;
        let all = indexes(n as u32);
        let mut players = all
            .iter()
            .map(|_| KeySharingPlayer::<C>::new(&config))
            .collect::<Result<Vec<_>>>()?;
        let mut store = InMemoryMessageStore::new();
        for (player, index) in players.iter_mut().zip(&all) {
            player.set_index(*index, &all)?;
            store.save_all(player.generate_key(rng)?)?;
        }
        let mut pk = C::identity();
        for player in players.iter_mut() {
            pk = pk.add(&player.finalize(&store)?);
        }
        Ok((players, pk))
    }

    #[test]
    fn shares_interpolate_to_the_public_key() -> Result<()> {
        let mut rng = init_testing();
        let (players, pk) = run_keygen::<P256, _>(&mut rng, 4, 2)?;
        let all = indexes(4);
        let xis = players
            .iter()
            .map(|p| p.xi().copied())
            .collect::<Result<Vec<_>>>()?;

        // Every t + 1 subset reconstructs the same secret.
        for subset in [[0usize, 1, 2], [1, 2, 3], [0, 2, 3]] {
            let ids: Vec<_> = subset.iter().map(|k| all[*k]).collect();
            let vals: Vec<_> = subset.iter().map(|k| xis[*k]).collect();
            assert_eq!(P256::scale_generator(&interpolate_at_zero(&ids, &vals)?), pk);
        }
        Ok(())
    }

    #[test]
    fn refresh_changes_shares_but_not_the_key() -> Result<()> {
        let mut rng = init_testing();
        let (players, pk) = run_keygen::<Secp256k1, _>(&mut rng, 3, 1)?;
        let all = indexes(3);
        let shares = players
            .iter()
            .map(|p| p.key_share())
            .collect::<Result<Vec<_>>>()?;

        let mut refreshed: Vec<_> = shares.iter().map(KeySharingPlayer::from_key_share).collect();
        let mut store = InMemoryMessageStore::new();
        for player in refreshed.iter_mut() {
            store.save_all(player.update_key(&mut rng)?)?;
        }
        let mut refreshed_pk = Secp256k1::identity();
        for player in refreshed.iter_mut() {
            refreshed_pk = refreshed_pk.add(&player.finalize(&store)?);
        }
        assert_eq!(refreshed_pk, pk);

        let before: Vec<_> = shares.iter().map(|s| *s.xi()).collect();
        let after = refreshed
            .iter()
            .map(|p| p.xi().copied())
            .collect::<Result<Vec<_>>>()?;
        assert!(before.iter().zip(&after).all(|(b, a)| b != a));
        let secret_before = interpolate_at_zero(&all, &before)?;
        let secret_after = interpolate_at_zero(&all[1..], &after[1..])?;
        assert_eq!(Secp256k1::scale_generator(&secret_before), pk);
        assert_eq!(Secp256k1::scale_generator(&secret_after), pk);
        Ok(())
    }

    #[test]
    fn calls_out_of_order_are_state_errors() -> Result<()> {
        let mut rng = init_testing();
        let config = KeyShareConfig::new("k", "secp256k1", 3, 1)?;
        let mut player = KeySharingPlayer::<Secp256k1>::new(&config)?;
        let store = InMemoryMessageStore::new();

        assert!(matches!(player.generate_key(&mut rng), Err(Error::ProtocolState(_))));
        assert!(matches!(player.finalize(&store), Err(Error::ProtocolState(_))));
        assert!(matches!(player.update_key(&mut rng), Err(Error::ProtocolState(_))));
        assert!(player.key_share().is_err());

        let all = indexes(3);
        player.set_index(all[0], &all)?;
        assert!(matches!(player.set_index(all[0], &all), Err(Error::ProtocolState(_))));
        let _ = player.generate_key(&mut rng)?;
        assert_eq!(player.status(), KeygenStatus::SharesPublished);

        // Nobody else delivered their shares.
        assert!(matches!(player.finalize(&store), Err(Error::ProtocolState(_))));
        Ok(())
    }

    #[test]
    fn bad_index_assignments() -> Result<()> {
        let config = KeyShareConfig::new("k", "P-256", 3, 2)?;
        let mut player = KeySharingPlayer::<P256>::new(&config)?;
        let all = indexes(3);
        assert!(player.set_index(PartyIndex::new(4)?, &all).is_err());
        assert!(player.set_index(all[0], &all[..2]).is_err());
        assert!(player.set_index(all[0], &[all[0], all[1], all[1]]).is_err());
        assert!(KeySharingPlayer::<Secp256k1>::new(&config).is_err());
        Ok(())
    }
}
