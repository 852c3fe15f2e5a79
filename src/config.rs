// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Configuration of a shared key: `{keyId, crv, n, t, pk?}`.

use crate::{
    curve::{point_from_hex, point_to_hex, CurveTrait, Secp256k1, P256},
    errors::Result,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Parameters of a key shared among `n` parties, any `t + 1` of which can
/// sign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShareConfig {
    #[serde(rename = "keyId")]
    key_id: String,
    crv: String,
    n: usize,
    t: usize,
    /// The group public key as a hex SEC1 point, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pk: Option<String>,
}

impl KeyShareConfig {
    /// Create and validate a configuration.
    pub fn new(key_id: &str, crv: &str, n: usize, t: usize) -> Result<Self> {
        let config = Self {
            key_id: key_id.to_string(),
            crv: crv.to_string(),
            n,
            t,
            pk: None,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.key_id.is_empty() {
            return config_err!("key id must not be empty");
        }
        if self.t < 1 || self.n <= self.t {
            error!("Invalid threshold parameters n = {}, t = {}", self.n, self.t);
            return config_err!("The value t({}) MUST be in (0 < t < {})", self.t, self.n);
        }
        if u32::try_from(self.n).is_err() {
            return config_err!("too many parties: {}", self.n);
        }
        if let Some(pk) = &self.pk {
            if Secp256k1::matches_name(&self.crv) {
                let _ = point_from_hex::<Secp256k1>(pk)?;
            } else if P256::matches_name(&self.crv) {
                let _ = point_from_hex::<P256>(pk)?;
            }
        }
        if !Secp256k1::matches_name(&self.crv) && !P256::matches_name(&self.crv) {
            return config_err!("unsupported curve: {}", self.crv);
        }
        Ok(())
    }

    /// Parse and validate the JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = deserialize!(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The JSON form.
    pub fn to_json(&self) -> Result<String> {
        serialize!(self)
    }

    /// Identifier of the shared key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Curve name as configured, e.g. `secp256k1` or `P-256`.
    pub fn curve_name(&self) -> &str {
        &self.crv
    }

    /// Number of parties holding a share.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Threshold: `t + 1` parties are needed to sign.
    pub fn t(&self) -> usize {
        self.t
    }

    /// The pinned group public key, hex encoded.
    pub fn encoded_public_key(&self) -> Option<&str> {
        self.pk.as_deref()
    }

    /// Pin the group public key.
    pub fn set_public_key<C: CurveTrait>(&mut self, pk: &C) -> Result<()> {
        self.check_curve::<C>()?;
        self.pk = Some(point_to_hex(pk));
        Ok(())
    }

    /// The pinned group public key, decoded on the curve `C`.
    pub fn public_key<C: CurveTrait>(&self) -> Result<Option<C>> {
        self.check_curve::<C>()?;
        self.pk.as_deref().map(point_from_hex::<C>).transpose()
    }

    /// Fails unless this configuration is for the curve `C`.
    pub fn check_curve<C: CurveTrait>(&self) -> Result<()> {
        if !C::matches_name(&self.crv) {
            return config_err!(
                "key {} is on {}, not on {}",
                self.key_id,
                self.crv,
                C::NAME
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn threshold_must_be_below_party_count() {
        assert!(KeyShareConfig::new("k", "P-256", 3, 1).is_ok());
        assert!(KeyShareConfig::new("k", "P-256", 2, 1).is_ok());
        for (n, t) in [(3, 3), (1, 1), (3, 0), (0, 0), (3, usize::MAX), (usize::MAX, usize::MAX)] {
            let err = KeyShareConfig::new("k", "P-256", n, t).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "n = {n}, t = {t}");
        }
    }

    #[test]
    fn unknown_curves_and_empty_ids_are_rejected() {
        assert!(KeyShareConfig::new("k", "ed25519", 3, 1).is_err());
        assert!(KeyShareConfig::new("", "secp256k1", 3, 1).is_err());
    }

    #[test]
    fn json_roundtrip_and_public_key() {
        let mut config = KeyShareConfig::new("key-1", "secp256k1", 5, 2).unwrap();
        assert_eq!(
            config.to_json().unwrap(),
            r#"{"keyId":"key-1","crv":"secp256k1","n":5,"t":2}"#
        );

        config.set_public_key(&Secp256k1::generator()).unwrap();
        let parsed = KeyShareConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.public_key::<Secp256k1>().unwrap(),
            Some(Secp256k1::generator())
        );
        assert!(parsed.public_key::<P256>().is_err());
        assert!(config.set_public_key(&P256::generator()).is_err());
    }

    #[test]
    fn invalid_json_configs() {
        let err = KeyShareConfig::from_json(r#"{"keyId":"k","crv":"P-256","n":2,"t":2}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = KeyShareConfig::from_json(r#"{"keyId":"k","crv":"P-256"}"#).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        let err =
            KeyShareConfig::from_json(r#"{"keyId":"k","crv":"P-256","n":3,"t":1,"pk":"00ff"}"#)
                .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn huge_threshold_in_json_is_a_config_error() {
        let json = format!(r#"{{"keyId":"k","crv":"P-256","n":3,"t":{}}}"#, usize::MAX);
        let err = KeyShareConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err:?}");
    }
}
