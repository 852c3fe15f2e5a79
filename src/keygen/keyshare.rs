// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{point_from_hex, point_to_hex, scalar_from_hex, CurveTrait, ScalarTrait},
    errors::Result,
    messages::PartyIndex,
    polynomial::lagrange_coefficient,
    utils::all_distinct,
};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

/// A party's persistent share of a threshold key.
///
/// `xi` is the party's Shamir share of the private key and never leaves the
/// owning process except through [`PlayerKeyShare::to_json`], which is meant
/// for the party's own storage. `uiG` is the party's public commitment to the
/// constant term of its key generation polynomial; the commitments of all `n`
/// parties add up to the group public key.
#[derive(Clone)]
pub struct PlayerKeyShare<C: CurveTrait> {
    key_id: String,
    my_index: PartyIndex,
    others: Vec<PartyIndex>,
    t: usize,
    xi: C::Scalar,
    ui_g: C,
}

impl<C: CurveTrait> Drop for PlayerKeyShare<C> {
    fn drop(&mut self) {
        self.xi.zeroize();
    }
}

impl<C: CurveTrait> Debug for PlayerKeyShare<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerKeyShare")
            .field("key_id", &self.key_id)
            .field("my_index", &self.my_index)
            .field("others", &self.others)
            .field("t", &self.t)
            .field("xi", &"[redacted]")
            .field("ui_g", &self.ui_g)
            .finish()
    }
}

/// The persisted form: `{keyId, crv, index, others, t, xi, uiG}`.
#[derive(Serialize, Deserialize)]
struct KeyShareJson {
    #[serde(rename = "keyId")]
    key_id: String,
    crv: String,
    index: PartyIndex,
    others: Vec<PartyIndex>,
    t: usize,
    xi: String,
    #[serde(rename = "uiG")]
    ui_g: String,
}

impl Drop for KeyShareJson {
    fn drop(&mut self) {
        self.xi.zeroize();
    }
}

impl<C: CurveTrait> PlayerKeyShare<C> {
    pub(crate) fn new(
        key_id: String,
        my_index: PartyIndex,
        others: Vec<PartyIndex>,
        t: usize,
        xi: C::Scalar,
        ui_g: C,
    ) -> Result<Self> {
        let share = Self {
            key_id,
            my_index,
            others,
            t,
            xi,
            ui_g,
        };
        share.validate()?;
        Ok(share)
    }

    fn validate(&self) -> Result<()> {
        if self.key_id.is_empty() {
            return config_err!("key id must not be empty");
        }
        if self.my_index.is_broadcast() || self.others.iter().any(PartyIndex::is_broadcast) {
            return config_err!("party indexes start at 1");
        }
        if self.others.contains(&self.my_index) || !all_distinct(&self.others) {
            error!("Key share has duplicate party indexes");
            return config_err!("key share lists party {} more than once", self.my_index);
        }
        if self.t < 1 || self.others.len() < self.t {
            return config_err!(
                "key share for {} parties cannot have threshold {}",
                self.others.len() + 1,
                self.t
            );
        }
        if self.ui_g.is_identity() {
            return crypto_err!("public share must not be the point at infinity");
        }
        Ok(())
    }

    /// Identifier of the shared key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// This party's index.
    pub fn index(&self) -> PartyIndex {
        self.my_index
    }

    /// Indexes of every other party holding a share of the key.
    pub fn others(&self) -> &[PartyIndex] {
        &self.others
    }

    /// Every party's index, this party included, in ascending order.
    pub fn all_indexes(&self) -> Vec<PartyIndex> {
        let mut all = self.others.clone();
        all.push(self.my_index);
        all.sort();
        all
    }

    /// Threshold: `t + 1` shares are needed to sign.
    pub fn threshold(&self) -> usize {
        self.t
    }

    /// The public commitment `uiG`.
    pub fn public_share(&self) -> &C {
        &self.ui_g
    }

    pub(crate) fn xi(&self) -> &C::Scalar {
        &self.xi
    }

    /// Converts the Shamir share into an additive share for the given signer
    /// set, `w_i = ℓ_i(signers) · x_i`.
    pub(crate) fn additive_share(&self, signers: &[PartyIndex]) -> Result<C::Scalar> {
        if let Some(stranger) = signers
            .iter()
            .find(|s| **s != self.my_index && !self.others.contains(s))
        {
            error!("Signer {} does not hold a share of this key", stranger);
            return config_err!("party {} does not hold a share of key {}", stranger, self.key_id);
        }
        let l = lagrange_coefficient::<C::Scalar>(signers, self.my_index)?;
        Ok(l.mul(&self.xi))
    }

    /// The persisted JSON form. Contains the secret share.
    pub fn to_json(&self) -> Result<String> {
        let json = KeyShareJson {
            key_id: self.key_id.clone(),
            crv: C::NAME.to_string(),
            index: self.my_index,
            others: self.others.clone(),
            t: self.t,
            xi: hex::encode(Zeroizing::new(self.xi.to_bytes())),
            ui_g: point_to_hex(&self.ui_g),
        };
        serialize!(&json)
    }

    /// Parse and validate the persisted JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: KeyShareJson = deserialize!(json)?;
        if !C::matches_name(&parsed.crv) {
            return config_err!("key share is on {}, not on {}", parsed.crv, C::NAME);
        }
        Self::new(
            parsed.key_id.clone(),
            parsed.index,
            parsed.others.clone(),
            parsed.t,
            scalar_from_hex::<C::Scalar>(&parsed.xi)?,
            point_from_hex::<C>(&parsed.ui_g)?,
        )
    }
}
