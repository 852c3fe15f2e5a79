// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};

/// Generate a random BigNumber in the range 0..n
pub(crate) fn random_bn<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Generate a random BigNumber in the multiplicative group Z_N^*, i.e. in
/// 1..N-1 and coprime to N
pub(crate) fn random_bn_in_z_star<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> BigNumber {
    loop {
        let bn = BigNumber::from_rng(n, rng);
        if bn != BigNumber::zero() && bn.gcd(n) == BigNumber::one() {
            return bn;
        }
    }
}

/// Returns true if all items of the slice are distinct.
pub(crate) fn all_distinct<T: PartialEq>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(i, a)| items[i + 1..].iter().all(|b| a != b))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn z_star_samples_are_units() {
        let mut rng = init_testing();
        let n = BigNumber::from(15u64);
        for _ in 0..50 {
            let x = random_bn_in_z_star(&mut rng, &n);
            assert!(x > BigNumber::zero() && x < n);
            assert_eq!(x.gcd(&n), BigNumber::one());
        }
    }

    #[test]
    fn random_bn_stays_below_bound() {
        let mut rng = init_testing();
        let n = BigNumber::from(1000u64);
        assert!((0..100).all(|_| random_bn(&mut rng, &n) < n));
    }

    #[test]
    fn detects_duplicates() {
        assert!(all_distinct(&[1, 2, 3]));
        assert!(!all_distinct(&[1, 2, 1]));
        assert!(all_distinct::<u8>(&[]));
    }
}
