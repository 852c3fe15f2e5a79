// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The [`MessageStore`] abstraction for shuttling [`Message`]s between
//! rounds.
//!
//! Messages are addressed by `(from, to, type)`. In an honest execution every
//! address is written exactly once per session, so a store must reject a
//! second write rather than overwrite. A read that finds nothing means a party
//! did not deliver its round output, and the session has to be aborted.

use crate::{
    errors::Result,
    messages::{Message, MessageType, PartyIndex},
};
use std::collections::HashMap;
use tracing::{error, trace};

/// Keyed store/forward of protocol messages for a single session.
pub trait MessageStore {
    /// Store a message under its `(from, to, type)` address.
    fn save(&mut self, message: Message) -> Result<()>;

    /// Retrieve the message stored under `(from, to, type)`, if any.
    fn read(&self, from: PartyIndex, to: PartyIndex, message_type: MessageType)
        -> Option<Message>;

    /// Like [`read`](Self::read), but a missing message is a
    /// [`ProtocolState`](crate::errors::Error::ProtocolState) error.
    fn read_required(
        &self,
        from: PartyIndex,
        to: PartyIndex,
        message_type: MessageType,
    ) -> Result<Message> {
        match self.read(from, to, message_type) {
            Some(message) => {
                message.check_type(message_type)?;
                Ok(message)
            }
            None => {
                error!(
                    "Expected a {:?} message from {} to {}, but none was delivered",
                    message_type, from, to
                );
                state_err!(
                    "missing {:?} message from party {} to {}",
                    message_type,
                    from,
                    to
                )
            }
        }
    }

    /// Store every message of a round's output.
    fn save_all(&mut self, messages: Vec<Message>) -> Result<()> {
        for message in messages {
            self.save(message)?;
        }
        Ok(())
    }
}

type Address = (PartyIndex, PartyIndex, MessageType);

/// A session-scoped, in-memory [`MessageStore`] with single-writer-per-address
/// enforcement.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMessageStore(HashMap<Address, Message>);

impl InMemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop every stored message.
    pub fn clear(&mut self) {
        self.0.clear()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn save(&mut self, message: Message) -> Result<()> {
        let address = (message.from(), message.to(), message.message_type());
        if self.0.contains_key(&address) {
            error!(
                "Second write of a {:?} message from {} to {}",
                address.2, address.0, address.1
            );
            return state_err!(
                "a {:?} message from party {} to {} was already stored",
                address.2,
                address.0,
                address.1
            );
        }
        trace!("Stored {:?} message from {} to {}", address.2, address.0, address.1);
        let _ = self.0.insert(address, message);
        Ok(())
    }

    fn read(
        &self,
        from: PartyIndex,
        to: PartyIndex,
        message_type: MessageType,
    ) -> Option<Message> {
        self.0.get(&(from, to, message_type)).cloned()
    }
}
