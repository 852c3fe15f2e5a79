// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::Result,
    keygen::PlayerKeyShare,
    message_store::MessageStore,
    messages::{Message, PartyIndex},
    paillier::PaillierDecryptionKey,
    presign::{
        record::PresignRecord,
        round_one::{self, Private as RoundOnePrivate, PublicBroadcast as RoundOnePublic},
        round_three::{self, Private as RoundThreePrivate, Public as RoundThreePublic},
        round_two::{self, Private as RoundTwoPrivate},
    },
    protocol::SignatureShare,
    utils::all_distinct,
};
use rand::{CryptoRng, RngCore};
use std::{fmt::Debug, mem};
use tracing::{error, info, instrument};
use zeroize::Zeroizing;

/// Where a [`SigningPlayer`] is in the signing protocol. Each variant owns
/// the ephemeral values needed by the next round.
enum SigningState<C: CurveTrait> {
    Fresh,
    RoundOne(RoundOnePrivate<C::Scalar>),
    RoundTwo(RoundOnePrivate<C::Scalar>, RoundTwoPrivate<C>),
    RoundThree(RoundOnePrivate<C::Scalar>, RoundThreePrivate<C>),
    Ready(PresignRecord<C>),
    Consumed,
}

impl<C: CurveTrait> SigningState<C> {
    fn name(&self) -> &'static str {
        match self {
            SigningState::Fresh => "Fresh",
            SigningState::RoundOne(..) => "RoundOne",
            SigningState::RoundTwo(..) => "RoundTwo",
            SigningState::RoundThree(..) => "RoundThree",
            SigningState::Ready(..) => "Ready",
            SigningState::Consumed => "Consumed",
        }
    }
}

/// One signer of the four-round threshold signing protocol.
///
/// A player signs exactly one message. Its ephemeral values are dropped (and
/// zeroized) after [`sign`](Self::sign) or after the first error, at which
/// point the player is consumed and every further call fails.
///
/// The Paillier key is taken by value so that it cannot outlive the signing
/// session it was generated for.
pub struct SigningPlayer<C: CurveTrait> {
    key_share: PlayerKeyShare<C>,
    paillier: PaillierDecryptionKey,
    signers: Option<Vec<PartyIndex>>,
    state: SigningState<C>,
}

impl<C: CurveTrait> Debug for SigningPlayer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningPlayer")
            .field("key_share", &self.key_share)
            .field("paillier", &self.paillier)
            .field("signers", &self.signers)
            .field("state", &self.state.name())
            .finish()
    }
}

impl<C: CurveTrait> SigningPlayer<C> {
    /// A signer holding `key_share`, with a Paillier key for this session.
    pub fn new(key_share: PlayerKeyShare<C>, paillier: PaillierDecryptionKey) -> Result<Self> {
        paillier.encryption_key().check_modulus_for(&C::order())?;
        Ok(Self {
            key_share,
            paillier,
            signers: None,
            state: SigningState::Fresh,
        })
    }

    /// Identifier of the key this player signs with.
    pub fn key_id(&self) -> &str {
        self.key_share.key_id()
    }

    /// This signer's party index.
    pub fn index(&self) -> PartyIndex {
        self.key_share.index()
    }

    /// The key share this player signs with.
    pub fn key_share(&self) -> &PlayerKeyShare<C> {
        &self.key_share
    }

    /// Returns `true` once the player has signed or failed.
    pub fn is_consumed(&self) -> bool {
        matches!(self.state, SigningState::Consumed)
    }

    fn take_state(&mut self) -> SigningState<C> {
        mem::replace(&mut self.state, SigningState::Consumed)
    }

    fn out_of_order<T>(&self, state: &SigningState<C>, operation: &str) -> Result<T> {
        error!(
            "Signer {} cannot {} in state {}",
            self.index(),
            operation,
            state.name()
        );
        state_err!(
            "signer {} cannot {} in state {}",
            self.index(),
            operation,
            state.name()
        )
    }

    fn validate_signers(&self, signers: &[PartyIndex]) -> Result<Vec<PartyIndex>> {
        let me = self.index();
        if !signers.contains(&me) {
            return config_err!("signer set {:?} does not contain party {}", signers, me);
        }
        if !all_distinct(signers) {
            return config_err!("signer set {:?} has duplicates", signers);
        }
        if signers.len() <= self.key_share.threshold() {
            error!(
                "Only {} signers, but threshold is {}",
                signers.len(),
                self.key_share.threshold()
            );
            return config_err!(
                "{} signers cannot sign with threshold {}",
                signers.len(),
                self.key_share.threshold()
            );
        }
        let all = self.key_share.all_indexes();
        if let Some(stranger) = signers.iter().find(|s| !all.contains(s)) {
            return config_err!("party {} does not hold a share of this key", stranger);
        }
        let mut sorted = signers.to_vec();
        sorted.sort();
        Ok(sorted)
    }

    /// The other signers, once the signer set is fixed. A different set
    /// than the one given in round two is a state error.
    fn peers(&self, signers: &[PartyIndex]) -> Result<Vec<PartyIndex>> {
        let mut sorted = signers.to_vec();
        sorted.sort();
        match &self.signers {
            Some(expected) if *expected == sorted => Ok(sorted
                .into_iter()
                .filter(|i| *i != self.index())
                .collect()),
            Some(expected) => {
                error!("Signer set changed from {:?} to {:?}", expected, sorted);
                state_err!("signer set changed mid-session")
            }
            None => state_err!("signer set has not been fixed"),
        }
    }

    /// Round one: sample `k_i`, `g_i` and broadcast `enc(k_i)`, `g_i·G` and
    /// the Paillier public key.
    #[instrument(skip_all, err(Debug))]
    pub fn pre_signing_step1<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<Message>> {
        let state = self.take_state();
        if !matches!(state, SigningState::Fresh) {
            return self.out_of_order(&state, "start round one");
        }
        let (private, public) = round_one::run::<C, R>(rng, &self.paillier)?;
        let messages = public.to_messages(self.index())?;
        self.state = SigningState::RoundOne(private);
        info!("Signer {} finished round one", self.index());
        Ok(messages)
    }

    /// Round two: run the MtA exchanges with every other signer. Returns
    /// the private messages to send.
    #[instrument(skip_all, err(Debug))]
    pub fn pre_signing_step2<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        signers: &[PartyIndex],
        store: &impl MessageStore,
    ) -> Result<Vec<Message>> {
        let round_one = match self.take_state() {
            SigningState::RoundOne(private) => private,
            state => return self.out_of_order(&state, "start round two"),
        };
        let signers = self.validate_signers(signers)?;
        self.signers = Some(signers.clone());
        let me = self.index();
        let w = Zeroizing::new(self.key_share.additive_share(&signers)?);

        let mut sum_k = round_one.k.mul(&round_one.g);
        let mut sum_w = round_one.k.mul(&*w);
        let mut g_point = C::scale_generator(&round_one.g);
        let mut messages = vec![];
        for j in signers.iter().filter(|j| **j != me) {
            let peer = RoundOnePublic::<C>::from_store(store, *j)?;
            let (public, beta_k, beta_w) =
                round_two::mta_for_peer(rng, &peer, &round_one.g, &*w)?;
            sum_k = sum_k.add(&beta_k);
            sum_w = sum_w.add(&beta_w);
            g_point = g_point.add(&peer.g_point);
            messages.extend(public.to_messages(me, *j)?);
        }
        let private = RoundTwoPrivate {
            sum_k,
            sum_w,
            g_point,
        };
        self.state = SigningState::RoundTwo(round_one, private);
        info!("Signer {} finished round two", me);
        Ok(messages)
    }

    /// Round three: decrypt the MtA ciphertexts and broadcast `kg_i`.
    #[instrument(skip_all, err(Debug))]
    pub fn pre_signing_step3(
        &mut self,
        signers: &[PartyIndex],
        store: &impl MessageStore,
    ) -> Result<Message> {
        let (round_one, round_two) = match self.take_state() {
            SigningState::RoundTwo(one, two) => (one, two),
            state => return self.out_of_order(&state, "start round three"),
        };
        let peers = self.peers(signers)?;
        let (private, public) =
            round_three::run(store, &self.paillier, self.index(), &peers, &round_two)?;
        let message = public.to_message(self.index())?;
        self.state = SigningState::RoundThree(round_one, private);
        info!("Signer {} finished round three", self.index());
        Ok(message)
    }

    /// Round four: add up every `kg_j` and derive `r`. Every honest signer
    /// arrives at the same value.
    #[instrument(skip_all, err(Debug))]
    pub fn pre_signing_final(
        &mut self,
        signers: &[PartyIndex],
        store: &impl MessageStore,
    ) -> Result<C::Scalar> {
        let (round_one, round_three) = match self.take_state() {
            SigningState::RoundThree(one, three) => (one, three),
            state => return self.out_of_order(&state, "finish presigning"),
        };
        let peers = self.peers(signers)?;
        let publics = peers
            .iter()
            .map(|j| RoundThreePublic::<C::Scalar>::from_store(store, *j))
            .collect::<Result<Vec<_>>>()?;
        let record = PresignRecord::new(round_one.k, &round_three, &publics)?;
        let r = *record.r();
        self.state = SigningState::Ready(record);
        info!("Signer {} is ready to sign", self.index());
        Ok(r)
    }

    /// Produce this signer's share of the signature over `digest`. Consumes
    /// the presignature.
    #[instrument(skip_all, err(Debug))]
    pub fn sign(&mut self, digest: &[u8]) -> Result<SignatureShare<C>> {
        let record = match self.take_state() {
            SigningState::Ready(record) => record,
            state => return self.out_of_order(&state, "sign"),
        };
        let (r, s) = record.sign(digest)?;
        Ok(SignatureShare::new(r, s))
    }
}
