// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Contains the functions and definitions for dealing with messages that are
//! passed between parties.
//!
//! On the wire a message is the JSON object
//! `{"from": 1, "to": 0, "type": "giG", "data": "<hex>"}`, where `to = 0`
//! addresses every party.

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use tracing::{error, instrument, trace};

/// The 1-based index of a party within a key. Index 0 is reserved for
/// broadcast.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyIndex(u32);

impl PartyIndex {
    /// The sentinel recipient of broadcast messages.
    pub const BROADCAST: PartyIndex = PartyIndex(0);

    /// Creates a party index. Fails for 0, which is the broadcast sentinel.
    pub fn new(index: u32) -> Result<Self> {
        if index == 0 {
            return config_err!("party indexes start at 1");
        }
        Ok(Self(index))
    }

    /// The raw index.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// True for [`PartyIndex::BROADCAST`].
    pub fn is_broadcast(&self) -> bool {
        self.0 == 0
    }
}

impl Display for PartyIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/////////////////
// Message API //
/////////////////

/// An enum consisting of all message types.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// A private share `u_ij` of a key generation or refresh polynomial
    #[serde(rename = "uij")]
    KeygenShare,
    /// The sender's Paillier public key
    #[serde(rename = "hePubKey")]
    PaillierPublicKey,
    /// Paillier encryption of the sender's ephemeral `k_i`
    #[serde(rename = "encki")]
    EncryptedK,
    /// The commitment `g_i·G` to the sender's ephemeral `g_i`
    #[serde(rename = "giG")]
    GammaPoint,
    /// Masked MtA ciphertext for the `k·g` product
    #[serde(rename = "encKiGi")]
    EncryptedKG,
    /// Masked MtA ciphertext for the `k·w` product
    #[serde(rename = "encKiWi")]
    EncryptedKW,
    /// The sender's additive share of `k·g`
    #[serde(rename = "kgi")]
    KGShare,
}

impl MessageType {
    /// True for the types that are addressed to every party.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            MessageType::PaillierPublicKey
                | MessageType::EncryptedK
                | MessageType::GammaPoint
                | MessageType::KGShare
        )
    }
}

/// A message that can be posted to (and read from) the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Which party this message is coming from.
    from: PartyIndex,
    /// Which party this message is addressed to.
    to: PartyIndex,
    /// The type of the message
    #[serde(rename = "type")]
    message_type: MessageType,
    /// The payload. Its format depends on the message type.
    #[serde(with = "hex")]
    data: Vec<u8>,
}

impl Message {
    /// Creates a new instance of [`Message`]. Broadcast types must be sent
    /// to [`PartyIndex::BROADCAST`] and private types to a concrete party
    /// other than the sender.
    #[instrument(skip_all)]
    pub fn new(
        message_type: MessageType,
        from: PartyIndex,
        to: PartyIndex,
        data: Vec<u8>,
    ) -> Result<Self> {
        let message = Self {
            from,
            to,
            message_type,
            data,
        };
        message.validate()?;
        trace!("New message created.");
        Ok(message)
    }

    fn validate(&self) -> Result<()> {
        if self.from.is_broadcast() {
            error!("Messages must have a concrete sender");
            return state_err!("message of type {:?} has no sender", self.message_type);
        }
        if self.message_type.is_broadcast() != self.to.is_broadcast() {
            error!(
                "A message was misrouted: {:?} addressed to {}",
                self.message_type, self.to
            );
            return state_err!(
                "message of type {:?} cannot be addressed to {}",
                self.message_type,
                self.to
            );
        }
        if self.from == self.to {
            return state_err!("party {} cannot send a message to itself", self.from);
        }
        Ok(())
    }

    /// The message type associated with the message.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The party that sent this message.
    pub fn from(&self) -> PartyIndex {
        self.from
    }

    /// The party that should receive this message.
    pub fn to(&self) -> PartyIndex {
        self.to
    }

    /// The payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> Result<String> {
        serialize!(self)
    }

    /// Parse the JSON wire format, enforcing the same routing rules as
    /// [`Message::new`].
    pub fn from_json(json: &str) -> Result<Self> {
        let message: Self = deserialize!(json)?;
        message.validate()?;
        Ok(message)
    }

    /// Check if the message type is correct.
    pub(crate) fn check_type(&self, expected_type: MessageType) -> Result<()> {
        if self.message_type() != expected_type {
            error!(
                "A message was misrouted. Expected {:?}, Got {:?}",
                expected_type,
                self.message_type()
            );
            return state_err!(
                "expected a {:?} message, got {:?}",
                expected_type,
                self.message_type()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn idx(i: u32) -> PartyIndex {
        PartyIndex::new(i).unwrap()
    }

    #[test]
    fn wire_format_uses_fixed_names() {
        let m = Message::new(MessageType::GammaPoint, idx(2), PartyIndex::BROADCAST, vec![0xab, 0x01])
            .unwrap();
        let json = m.to_json().unwrap();
        assert_eq!(json, r#"{"from":2,"to":0,"type":"giG","data":"ab01"}"#);
        assert_eq!(Message::from_json(&json).unwrap(), m);

        let m = Message::new(MessageType::EncryptedKW, idx(1), idx(3), vec![]).unwrap();
        assert!(m.to_json().unwrap().contains(r#""type":"encKiWi""#));
    }

    #[test]
    fn routing_rules_are_enforced() {
        let err = Message::new(MessageType::KeygenShare, idx(1), PartyIndex::BROADCAST, vec![])
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolState(_)));
        assert!(Message::new(MessageType::KGShare, idx(1), idx(2), vec![]).is_err());
        assert!(Message::new(MessageType::KeygenShare, idx(1), idx(1), vec![]).is_err());
        assert!(Message::new(MessageType::KeygenShare, PartyIndex::BROADCAST, idx(1), vec![]).is_err());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Message::from_json(r#"{"from":1,"to":0,"type":"nope","data":""}"#).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        let err = Message::from_json(r#"{"from":1,"to":0,"type":"uij","data":""}"#).unwrap_err();
        assert!(matches!(err, Error::ProtocolState(_)));
        assert!(Message::from_json(r#"{"from":1,"to":0,"type":"kgi","data":"zz"}"#).is_err());
    }

    #[test]
    fn index_zero_is_reserved() {
        assert!(PartyIndex::new(0).is_err());
        assert!(PartyIndex::BROADCAST.is_broadcast());
        assert_eq!(idx(7).to_string(), "7");
    }
}
