// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Shamir secret sharing over the scalar field of a curve.

use crate::{curve::ScalarTrait, errors::Result, messages::PartyIndex, utils::all_distinct};
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use zeroize::Zeroize;

/// A random polynomial `f(x) = c_0 + c_1·x + ... + c_t·x^t`.
pub(crate) struct Polynomial<S: ScalarTrait> {
    coefficients: Vec<S>,
}

impl<S: ScalarTrait> Drop for Polynomial<S> {
    fn drop(&mut self) {
        self.coefficients.zeroize();
    }
}

impl<S: ScalarTrait> Debug for Polynomial<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polynomial")
            .field("degree", &self.degree())
            .field("coefficients", &"[redacted]")
            .finish()
    }
}

impl<S: ScalarTrait> Polynomial<S> {
    /// A polynomial of degree `degree` with uniformly random coefficients.
    pub(crate) fn random<R: RngCore + CryptoRng>(rng: &mut R, degree: usize) -> Self {
        Self {
            coefficients: (0..=degree).map(|_| S::random(&mut *rng)).collect(),
        }
    }

    /// Like [`random`](Self::random) but with `f(0) = 0`. Adding such a
    /// polynomial to a sharing re-randomizes the shares and keeps the secret.
    pub(crate) fn random_zero_constant<R: RngCore + CryptoRng>(rng: &mut R, degree: usize) -> Self {
        let mut polynomial = Self::random(rng, degree);
        polynomial.coefficients[0] = S::zero();
        polynomial
    }

    pub(crate) fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// The constant term `f(0)`.
    pub(crate) fn constant(&self) -> S {
        self.coefficients[0]
    }

    /// Evaluate at the given party's index.
    pub(crate) fn evaluate_at(&self, index: PartyIndex) -> S {
        evaluate(&S::from_u64(index.value() as u64), &self.coefficients)
    }
}

/// Horner evaluation of `coefficients[0] + coefficients[1]·x + ...`.
pub fn evaluate<S: ScalarTrait>(x: &S, coefficients: &[S]) -> S {
    coefficients
        .iter()
        .rev()
        .fold(S::zero(), |acc, c| acc.mul(x).add(c))
}

fn check_index_set(index_set: &[PartyIndex]) -> Result<()> {
    if index_set.is_empty() {
        return config_err!("index set must not be empty");
    }
    if index_set.iter().any(PartyIndex::is_broadcast) {
        return config_err!("index set must not contain 0");
    }
    if !all_distinct(index_set) {
        return config_err!("index set contains duplicates");
    }
    Ok(())
}

/// The Lagrange coefficient of party `i` for interpolation at zero:
/// `ℓ_i = Π_{j≠i} (0 - x_j) / (x_i - x_j)` over `index_set`.
pub fn lagrange_coefficient<S: ScalarTrait>(index_set: &[PartyIndex], i: PartyIndex) -> Result<S> {
    check_index_set(index_set)?;
    if !index_set.contains(&i) {
        return config_err!("party {} is not part of the index set", i);
    }
    let x_i = S::from_u64(i.value() as u64);
    let mut numerator = S::one();
    let mut denominator = S::one();
    for j in index_set.iter().filter(|j| **j != i) {
        let x_j = S::from_u64(j.value() as u64);
        numerator = numerator.mul(&x_j.negate());
        denominator = denominator.mul(&x_i.sub(&x_j));
    }
    match denominator.invert() {
        Some(inv) => Ok(numerator.mul(&inv)),
        None => config_err!("index set contains indexes that collide mod q"),
    }
}

/// Reconstructs `f(0)` from the points `(index_set[k], values[k])`.
///
/// The result is only the shared secret when at least `t + 1` shares of a
/// degree-`t` polynomial are supplied.
pub fn interpolate_at_zero<S: ScalarTrait>(index_set: &[PartyIndex], values: &[S]) -> Result<S> {
    if index_set.len() != values.len() {
        return config_err!(
            "{} indexes but {} values to interpolate",
            index_set.len(),
            values.len()
        );
    }
    let mut acc = S::zero();
    for (i, value) in index_set.iter().zip(values) {
        let l = lagrange_coefficient::<S>(index_set, *i)?;
        acc = acc.add(&l.mul(value));
    }
    Ok(acc)
}
