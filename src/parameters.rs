// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Security parameter definitions.
//!
//! A Paillier modulus must exceed `2·q²` for the curve order `q` so that MtA
//! plaintexts never wrap around. The default below leaves a wide margin and
//! follows NIST's Recommendation for Key Management \[1\], under which a
//! 2048-bit modulus provides 112 bits of computational security.
//!
//! ## References
//! 1. Recommendation for Key Management, Special Publication 800-57 Part 1 Rev. 5, NIST, 05/2020.
//!    Interpreted via [keylength.org](https://www.keylength.com/en/compare/).

/// Bit size of the prime factors of a Paillier modulus.
///
/// The product of two 1024-bit primes will produce 2048-bit Paillier moduli.
pub const PRIME_BITS: usize = 1024;
