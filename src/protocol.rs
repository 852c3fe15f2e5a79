// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Drives the players of one protocol execution through their rounds.
//!
//! A [`Session`] runs exactly one key sharing, key update or signing
//! execution, shuttling every round's output through its [`MessageStore`].
//! Any error aborts the session and drops the players along with their
//! ephemeral state.

use crate::{
    config::KeyShareConfig,
    curve::{point_to_hex, CurveTrait, ScalarTrait},
    errors::{Error, Result},
    keygen::{KeySharingPlayer, PlayerKeyShare},
    message_store::MessageStore,
    messages::PartyIndex,
    paillier::PaillierDecryptionKey,
    presign::SigningPlayer,
    utils::all_distinct,
};
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use tracing::{error, info, instrument, warn};
use zeroize::Zeroize;

/// One signer's contribution `(r, s_i)` to a signature.
///
/// Shares are combined with [`chain`](Self::chain) and turned into a DER
/// signature with [`finish`](Self::finish).
#[derive(Clone)]
pub struct SignatureShare<C: CurveTrait> {
    r: C::Scalar,
    s: C::Scalar,
}

impl<C: CurveTrait> Drop for SignatureShare<C> {
    fn drop(&mut self) {
        self.s.zeroize();
    }
}

impl<C: CurveTrait> Debug for SignatureShare<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureShare")
            .field("r", &self.r)
            .field("s", &"[redacted]")
            .finish()
    }
}

impl<C: CurveTrait> SignatureShare<C> {
    pub(crate) fn new(r: C::Scalar, s: C::Scalar) -> Self {
        Self { r, s }
    }

    /// The x-coordinate of `R`, reduced mod q.
    pub fn r(&self) -> &C::Scalar {
        &self.r
    }

    /// Add another signer's share. Both shares must carry the same `r`.
    pub fn chain(&self, share: &Self) -> Result<Self> {
        if self.r != share.r {
            error!("Signature shares disagree on r");
            return integrity_err!("signature shares were computed for different values of r");
        }
        Ok(Self {
            r: self.r,
            s: self.s.add(&share.s),
        })
    }

    /// DER-encode `(r, s)`, with `s` normalized to the lower half of the
    /// scalar field.
    pub fn finish(&self) -> Result<Vec<u8>> {
        let mut s = if self.s.is_high() {
            self.s.negate()
        } else {
            self.s
        };
        let der = C::encode_signature(&self.r, &s);
        s.zeroize();
        der
    }
}

/// Which protocol a [`Session`] executes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Distributed generation of a fresh key.
    KeySharing,
    /// Proactive refresh of the shares of an existing key.
    KeyUpdate,
    /// Threshold signing of one message digest.
    Signing,
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Players may be added and the protocol may be run.
    Ready,
    /// The protocol ran to completion.
    Completed,
    /// The protocol failed; the session must be discarded.
    Aborted,
}

/// A single execution of one of the protocols, for one key.
pub struct Session<C: CurveTrait, S: MessageStore> {
    config: KeyShareConfig,
    mode: Mode,
    status: SessionStatus,
    store: S,
    key_players: Vec<KeySharingPlayer<C>>,
    signing_players: Vec<SigningPlayer<C>>,
}

impl<C: CurveTrait, S: MessageStore + Debug> Debug for Session<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("status", &self.status)
            .field("store", &self.store)
            .field("key_players", &self.key_players)
            .field("signing_players", &self.signing_players)
            .finish()
    }
}

impl<C: CurveTrait, S: MessageStore> Session<C, S> {
    /// A session for the key described by `config`. `store` should be empty
    /// and must not be shared with any other session.
    pub fn new(config: KeyShareConfig, mode: Mode, store: S) -> Result<Self> {
        config.check_curve::<C>()?;
        // Decode eagerly so a malformed pinned key is caught up front.
        let _ = config.public_key::<C>()?;
        Ok(Self {
            config,
            mode,
            status: SessionStatus::Ready,
            store,
            key_players: vec![],
            signing_players: vec![],
        })
    }

    /// The protocol this session runs.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the session is ready, completed or aborted.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The configuration, with the public key pinned once key sharing has
    /// completed.
    pub fn config(&self) -> &KeyShareConfig {
        &self.config
    }

    /// The message store, e.g. for inspection after the session ran.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The group public key as compressed hex, if known.
    pub fn public_key(&self) -> Option<&str> {
        self.config.encoded_public_key()
    }

    fn expect_mode(&self, expected: Mode) -> Result<()> {
        if self.mode != expected {
            error!("Session is in mode {:?}, not {:?}", self.mode, expected);
            return config_err!(
                "operation needs a {:?} session, but this session is {:?}",
                expected,
                self.mode
            );
        }
        Ok(())
    }

    fn expect_ready(&self) -> Result<()> {
        if self.status != SessionStatus::Ready {
            return state_err!("session is {:?}", self.status);
        }
        Ok(())
    }

    fn check_key_id(&self, key_id: &str) -> Result<()> {
        if key_id != self.config.key_id() {
            return config_err!(
                "share of key {} cannot join a session for key {}",
                key_id,
                self.config.key_id()
            );
        }
        Ok(())
    }

    fn check_new_index(&self, index: PartyIndex) -> Result<()> {
        let taken = self
            .key_players
            .iter()
            .filter_map(KeySharingPlayer::index)
            .chain(self.signing_players.iter().map(SigningPlayer::index))
            .any(|i| i == index);
        if taken {
            return config_err!("party {} has already joined the session", index);
        }
        Ok(())
    }

    /// Mark the session aborted on failure and drop every player.
    fn abort_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.status = SessionStatus::Completed;
                Ok(value)
            }
            Err(e) => {
                warn!("Aborting {:?} session for key {}: {}", self.mode, self.config.key_id(), e);
                self.status = SessionStatus::Aborted;
                self.key_players.clear();
                self.signing_players.clear();
                Err(e)
            }
        }
    }

    /// Add a fresh party to a key sharing session. Parties are given the
    /// indexes `1..=n` in the order they are added.
    pub fn add_key_sharing_player(&mut self) -> Result<PartyIndex> {
        self.expect_mode(Mode::KeySharing)?;
        self.expect_ready()?;
        if self.key_players.len() >= self.config.n() {
            return config_err!("key {} has only {} parties", self.config.key_id(), self.config.n());
        }
        let mut player = KeySharingPlayer::<C>::new(&self.config)?;
        let index = PartyIndex::new(self.key_players.len() as u32 + 1)?;
        let all = (1..=self.config.n() as u32)
            .map(PartyIndex::new)
            .collect::<Result<Vec<_>>>()?;
        player.set_index(index, &all)?;
        self.key_players.push(player);
        Ok(index)
    }

    /// Add the holder of an existing share to a key update session.
    pub fn add_key_update_player(&mut self, share: &PlayerKeyShare<C>) -> Result<()> {
        self.expect_mode(Mode::KeyUpdate)?;
        self.expect_ready()?;
        self.check_key_id(share.key_id())?;
        self.check_new_index(share.index())?;
        if share.threshold() != self.config.t() || share.others().len() + 1 != self.config.n() {
            return config_err!(
                "share of party {} does not match the key's n and t",
                share.index()
            );
        }
        self.key_players.push(KeySharingPlayer::from_key_share(share));
        Ok(())
    }

    /// Add a signer, together with the Paillier key it uses in this
    /// session only.
    pub fn add_signing_player(
        &mut self,
        share: PlayerKeyShare<C>,
        paillier: PaillierDecryptionKey,
    ) -> Result<()> {
        self.expect_mode(Mode::Signing)?;
        self.expect_ready()?;
        self.check_key_id(share.key_id())?;
        self.check_new_index(share.index())?;
        if share.threshold() != self.config.t() {
            return config_err!(
                "share of party {} has threshold {}, key has {}",
                share.index(),
                share.threshold(),
                self.config.t()
            );
        }
        self.signing_players.push(SigningPlayer::new(share, paillier)?);
        Ok(())
    }

    fn expect_all_parties(&self) -> Result<()> {
        if self.key_players.len() != self.config.n() {
            error!(
                "{} of {} parties joined the session",
                self.key_players.len(),
                self.config.n()
            );
            return state_err!(
                "{} parties joined, but key {} has {}",
                self.key_players.len(),
                self.config.key_id(),
                self.config.n()
            );
        }
        Ok(())
    }

    /// Run distributed key generation. Returns the group public key as
    /// compressed hex and pins it in the configuration.
    #[instrument(skip_all, err(Debug))]
    pub fn key_sharing<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<String> {
        self.expect_mode(Mode::KeySharing)?;
        self.expect_ready()?;
        self.expect_all_parties()?;
        let result = self.run_key_generation(rng, false);
        self.abort_on_error(result)
    }

    /// Run a proactive refresh. Every party's share changes; the group
    /// public key does not.
    #[instrument(skip_all, err(Debug))]
    pub fn key_update<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<String> {
        self.expect_mode(Mode::KeyUpdate)?;
        self.expect_ready()?;
        self.expect_all_parties()?;
        let result = self.run_key_generation(rng, true);
        self.abort_on_error(result)
    }

    fn run_key_generation<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        refresh: bool,
    ) -> Result<String> {
        for player in self.key_players.iter_mut() {
            let messages = if refresh {
                player.update_key(rng)?
            } else {
                player.generate_key(rng)?
            };
            self.store.save_all(messages)?;
        }
        let mut pk = C::identity();
        for player in self.key_players.iter_mut() {
            pk = pk.add(&player.finalize(&self.store)?);
        }
        if pk.is_identity() {
            error!("Key generation produced the point at infinity");
            return crypto_err!("group public key is the point at infinity");
        }

        match self.config.public_key::<C>()? {
            Some(expected) if expected != pk => {
                error!("Public commitments do not add up to the pinned public key");
                return integrity_err!("derived public key does not match the pinned one");
            }
            Some(_) => {}
            None => self.config.set_public_key(&pk)?,
        }
        let shares = self.key_shares()?;
        check_shares_against(&shares, &pk)?;
        info!(
            "Finished {:?} for key {}",
            self.mode,
            self.config.key_id()
        );
        Ok(point_to_hex(&pk))
    }

    /// The finalized key shares of a key sharing or key update session, or
    /// the shares held by the signers of a signing session.
    pub fn key_shares(&self) -> Result<Vec<PlayerKeyShare<C>>> {
        match self.mode {
            Mode::Signing => Ok(self
                .signing_players
                .iter()
                .map(|p| p.key_share().clone())
                .collect()),
            _ => self
                .key_players
                .iter()
                .map(KeySharingPlayer::key_share)
                .collect(),
        }
    }

    /// The key shares in their persisted JSON form, one per party. These
    /// contain secrets and must only be handed to their owners.
    pub fn player_keys(&self) -> Result<Vec<String>> {
        self.key_shares()?
            .iter()
            .map(PlayerKeyShare::to_json)
            .collect()
    }

    /// Check the hex-encoded public key `pk` against the shares available in
    /// this session: every `t + 1` of them must interpolate to its secret key.
    pub fn check_key_pair(&self, pk: &str) -> Result<()> {
        let pk = crate::curve::point_from_hex::<C>(pk)?;
        check_shares_against(&self.key_shares()?, &pk)
    }

    /// Run the four signing rounds over `digest` with every signer that
    /// joined. Returns the DER-encoded signature as hex, after checking it
    /// against the pinned public key.
    #[instrument(skip_all, err(Debug))]
    pub fn signing<R: RngCore + CryptoRng>(&mut self, rng: &mut R, digest: &[u8]) -> Result<String> {
        self.expect_mode(Mode::Signing)?;
        self.expect_ready()?;
        let pk = match self.config.public_key::<C>()? {
            Some(pk) => pk,
            None => return config_err!("signing needs the public key of key {}", self.config.key_id()),
        };
        if self.signing_players.len() <= self.config.t() {
            error!(
                "{} signers cannot reach threshold {}",
                self.signing_players.len(),
                self.config.t()
            );
            return config_err!(
                "{} signers cannot sign with threshold {}",
                self.signing_players.len(),
                self.config.t()
            );
        }
        if digest.is_empty() {
            return config_err!("message digest must not be empty");
        }
        let result = self.run_signing(rng, digest, &pk);
        self.abort_on_error(result)
    }

    fn run_signing<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        digest: &[u8],
        pk: &C,
    ) -> Result<String> {
        let signers: Vec<_> = self.signing_players.iter().map(SigningPlayer::index).collect();

        for player in self.signing_players.iter_mut() {
            let messages = player.pre_signing_step1(rng)?;
            self.store.save_all(messages)?;
        }
        // Round two reads every round one broadcast, so it can only start
        // once all of them have been written.
        let mut round_two = vec![];
        for player in self.signing_players.iter_mut() {
            round_two.extend(player.pre_signing_step2(rng, &signers, &self.store)?);
        }
        self.store.save_all(round_two)?;

        let mut round_three = vec![];
        for player in self.signing_players.iter_mut() {
            round_three.push(player.pre_signing_step3(&signers, &self.store)?);
        }
        self.store.save_all(round_three)?;

        let rs = self
            .signing_players
            .iter_mut()
            .map(|player| player.pre_signing_final(&signers, &self.store))
            .collect::<Result<Vec<_>>>()?;
        if rs.iter().any(|r| *r != rs[0]) {
            error!("Signers derived different values of r");
            return integrity_err!("signers disagree on r");
        }

        let mut shares = self
            .signing_players
            .iter_mut()
            .map(|player| player.sign(digest))
            .collect::<Result<Vec<_>>>()?
            .into_iter();
        let first = match shares.next() {
            Some(first) => first,
            None => return state_err!("no signers"),
        };
        let signature = shares.try_fold(first, |acc, share| acc.chain(&share))?;
        let der = signature.finish()?;

        pk.verify_prehash(digest, &der).map_err(|e| {
            error!("Aggregated signature does not verify: {}", e);
            Error::ProtocolIntegrity(format!("aggregated signature does not verify: {e}"))
        })?;
        info!(
            "Signers {:?} signed with key {}",
            signers,
            self.config.key_id()
        );
        Ok(hex::encode(der))
    }
}

/// Checks that every share lies on the polynomial whose secret matches `pk`.
///
/// The first `t + 1` shares form a base that must reconstruct `pk`. Each
/// further share is then swapped in for the last base share, so a single
/// bad share anywhere in the list changes the reconstructed point.
fn check_shares_against<C: CurveTrait>(shares: &[PlayerKeyShare<C>], pk: &C) -> Result<()> {
    let t = match shares.first() {
        Some(share) => share.threshold(),
        None => return config_err!("no key shares to check"),
    };
    if shares.len() <= t {
        return config_err!("{} shares cannot reconstruct a key with threshold {}", shares.len(), t);
    }
    let indexes: Vec<_> = shares.iter().map(PlayerKeyShare::index).collect();
    if !all_distinct(&indexes) {
        return config_err!("key shares must belong to distinct parties");
    }

    let (base, rest) = shares.split_at(t + 1);
    let mut subset: Vec<&PlayerKeyShare<C>> = base.iter().collect();
    if reconstruct(&subset)? != *pk {
        error!("Key shares do not match the public key");
        return integrity_err!("key shares do not reconstruct the public key");
    }
    for share in rest {
        subset[t] = share;
        if reconstruct(&subset)? != *pk {
            error!("Key share of party {} does not match the public key", share.index());
            return integrity_err!(
                "key share of party {} does not reconstruct the public key",
                share.index()
            );
        }
    }
    Ok(())
}

/// `Σ ℓ_i·x_i·G` over the given shares.
fn reconstruct<C: CurveTrait>(subset: &[&PlayerKeyShare<C>]) -> Result<C> {
    let indexes: Vec<_> = subset.iter().map(|share| share.index()).collect();
    let mut point = C::identity();
    for share in subset {
        let mut w = share.additive_share(&indexes)?;
        point = point.add(&C::scale_generator(&w));
        w.zeroize();
    }
    Ok(point)
}
