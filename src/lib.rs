// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Threshold ECDSA signing
//!
//! In a threshold signature scheme, any `t + 1` of `n` parties, each of whom
//! holds a share of a private signing key, can communicate to produce a valid
//! signature for a message, while no `t` of them can forge one or learn the
//! key.
//!
//! Signatures generated in this threshold manner are indistinguishable from
//! signatures generated using a normal ECDSA signing method, and verify with
//! any regular ECDSA verifier. Both secp256k1 and P-256 are supported.
//!
//! The key is Shamir-shared with a distributed key generation in which every
//! party deals a random polynomial; shares can be refreshed without changing
//! the key. Signing runs four rounds between the chosen signers and uses
//! Paillier encryption to turn products of secret values into additive
//! shares (multiplicative-to-additive, or MtA).
//!
//! This library only drives the rounds; it does not move messages between
//! machines. A [`Session`] runs every party in process and shuttles their
//! [`Message`]s through a [`MessageStore`]. The individual players
//! ([`KeySharingPlayer`], [`SigningPlayer`]) can be driven directly by an
//! application that delivers the messages itself, as the `threaded` demo
//! does.
//!
//! # Security
//! - Paillier keys given to a [`SigningPlayer`] are used for one session
//!   only. No proof of their well-formedness is exchanged, so a malicious
//!   signer is detected only by the final signature check.
//! - Every error is fatal to its session: discard the session and start over
//!   with fresh randomness.

#![warn(missing_docs)]

#[macro_use]
pub mod errors;

mod config;
mod curve;
mod keygen;
mod message_store;
mod messages;
mod paillier;
mod parameters;
mod polynomial;
mod presign;
mod protocol;
mod secp256k1;
mod secp256r1;
mod serialization;
mod utils;

pub use config::KeyShareConfig;
pub use curve::{CurveTrait, ScalarTrait, Secp256k1, P256};
pub use keygen::{KeySharingPlayer, KeygenStatus, PlayerKeyShare};
pub use message_store::{InMemoryMessageStore, MessageStore};
pub use messages::{Message, MessageType, PartyIndex};
pub use paillier::{PaillierCiphertext, PaillierDecryptionKey, PaillierEncryptionKey};
pub use parameters::PRIME_BITS;
pub use polynomial::{evaluate, interpolate_at_zero, lagrange_coefficient};
pub use presign::SigningPlayer;
pub use protocol::{Mode, Session, SessionStatus, SignatureShare};

#[cfg(test)]
mod tests;
