// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Distributed key generation and proactive refresh.
//!
//! Every party deals a random degree-`t` polynomial and sends its evaluations
//! to the other parties; a party's share `xi` of the group key is the sum of
//! the evaluations it receives. A refresh round deals polynomials with a zero
//! constant term instead.

mod keyshare;
mod participant;

pub use keyshare::PlayerKeyShare;
pub use participant::{KeySharingPlayer, KeygenStatus};
