// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Runs the four-round signing protocol, producing a
//! [`SignatureShare`](crate::SignatureShare).
//!
//! 1. Each signer samples `k_i`, `g_i` and broadcasts `enc(k_i)` and `g_i·G`.
//! 2. Each pair of signers runs two MtA exchanges, turning `k_j·g_i` and
//!    `k_j·w_i` into additive shares.
//! 3. Each signer broadcasts its share `kg_i` of `k·g`.
//! 4. Every signer derives `R = (g·G)·(k·g)⁻¹ = k⁻¹·G` and `r = x(R)`.
//!
//! The signature share is then `s_i = r·kw_i + m·k_i`.

mod participant;
mod record;
mod round_one;
mod round_three;
mod round_two;

pub use participant::SigningPlayer;
