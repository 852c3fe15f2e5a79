// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier encryption, as used by the multiplicative-to-additive exchange of
//! the signing protocol.
//!
//! The public generator defaults to `g = N + 1`, in which case `λ = φ(N)` and
//! `μ = φ(N)^-1 mod N`. A custom generator may be attached to a public key, and
//! the matching decryption then uses `λ = lcm(p - 1, q - 1)`.

use crate::{
    errors::Result,
    serialization::{serialize, tokenize},
    utils::random_bn_in_z_star,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use tracing::{error, instrument};
use zeroize::Zeroize;

/// Number of bytes used for the length prefix of each encoded integer.
const LENGTH_PREFIX_BYTES: usize = 2;

/// A Paillier ciphertext, an integer in `[1, N²)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaillierCiphertext(pub(crate) BigNumber);

impl PaillierCiphertext {
    /// Big-endian encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// Parse a big-endian encoding. Range checks happen when the ciphertext is
    /// used with a key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return crypto_err!("empty Paillier ciphertext");
        }
        Ok(Self(BigNumber::from_slice(bytes)))
    }
}

/// The public half of a Paillier key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaillierEncryptionKey {
    n: BigNumber,
    nn: BigNumber,
    g: Option<BigNumber>,
}

impl PaillierEncryptionKey {
    /// Build a key for the modulus `n` with the default generator `N + 1`.
    pub fn new(n: BigNumber) -> Result<Self> {
        Self::with_generator(n, None)
    }

    /// Build a key for the modulus `n`, optionally with a custom generator.
    pub fn with_generator(n: BigNumber, g: Option<BigNumber>) -> Result<Self> {
        if n <= BigNumber::one() {
            return crypto_err!("Paillier modulus must be larger than one");
        }
        let nn = &n * &n;
        let g = match g {
            Some(g) if g == &n + BigNumber::one() => None,
            Some(g) if g <= BigNumber::zero() || g >= nn => {
                return crypto_err!("Paillier generator must lie in [1, N²)");
            }
            other => other,
        };
        Ok(Self { n, nn, g })
    }

    /// The modulus N.
    pub fn n(&self) -> &BigNumber {
        &self.n
    }

    /// The generator, `None` meaning `N + 1`.
    pub fn g(&self) -> Option<&BigNumber> {
        self.g.as_ref()
    }

    fn generator(&self) -> BigNumber {
        match &self.g {
            Some(g) => g.clone(),
            None => &self.n + BigNumber::one(),
        }
    }

    /// Encrypt `x` with a fresh random nonce. Fails if `x` is outside `[0, N)`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        x: &BigNumber,
    ) -> Result<PaillierCiphertext> {
        let nonce = random_bn_in_z_star(rng, &self.n);
        self.encrypt_with_nonce(x, &nonce)
    }

    /// Encrypt `x` with the caller-chosen nonce `r`.
    pub fn encrypt_with_nonce(&self, x: &BigNumber, r: &BigNumber) -> Result<PaillierCiphertext> {
        if x < &BigNumber::zero() || x >= &self.n {
            error!("Paillier plaintext is out of range");
            return crypto_err!("plaintext must lie in [0, N)");
        }
        let a = self.generator().modpow(x, &self.nn);
        let b = r.modpow(&self.n, &self.nn);
        Ok(PaillierCiphertext(a.modmul(&b, &self.nn)))
    }

    /// Homomorphic addition: the result decrypts to the sum of the plaintexts
    /// mod N.
    pub fn add(&self, c1: &PaillierCiphertext, c2: &PaillierCiphertext) -> Result<PaillierCiphertext> {
        self.check_ciphertext(c1)?;
        self.check_ciphertext(c2)?;
        Ok(PaillierCiphertext(c1.0.modmul(&c2.0, &self.nn)))
    }

    /// Homomorphic scalar multiplication: the result decrypts to `k` times the
    /// plaintext mod N.
    pub fn scalar_mul(&self, k: &BigNumber, c: &PaillierCiphertext) -> Result<PaillierCiphertext> {
        self.check_ciphertext(c)?;
        if k < &BigNumber::zero() {
            return crypto_err!("homomorphic multiplier must be non-negative");
        }
        Ok(PaillierCiphertext(c.0.modpow(k, &self.nn)))
    }

    /// Returns an error unless `c` lies in `[1, N²)`.
    pub(crate) fn check_ciphertext(&self, c: &PaillierCiphertext) -> Result<()> {
        if c.0 <= BigNumber::zero() || c.0 >= self.nn {
            error!("Paillier ciphertext is out of range");
            return crypto_err!("ciphertext must lie in [1, N²)");
        }
        Ok(())
    }

    /// Returns an error unless products of two values below `order` plus a
    /// mask can be carried without wrapping around N, i.e. `N > 2·order²`.
    pub(crate) fn check_modulus_for(&self, order: &BigNumber) -> Result<()> {
        let bound = BigNumber::from(2u64) * order * order;
        if self.n <= bound {
            error!("Paillier modulus is too small for the curve order");
            return crypto_err!("Paillier modulus must exceed 2·q²");
        }
        Ok(())
    }

    /// `I2OSP(len, 2) || N || I2OSP(len, 2) || g`, with an empty `g` for the
    /// default generator.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let g = self.g.as_ref().map(BigNumber::to_bytes).unwrap_or_default();
        Ok([
            serialize(&self.n.to_bytes(), LENGTH_PREFIX_BYTES)?,
            serialize(&g, LENGTH_PREFIX_BYTES)?,
        ]
        .concat())
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (n, rest) = tokenize(bytes, LENGTH_PREFIX_BYTES)?;
        let (g, rest) = tokenize(&rest, LENGTH_PREFIX_BYTES)?;
        if !rest.is_empty() {
            return crypto_err!("trailing bytes after Paillier public key");
        }
        let g = (!g.is_empty()).then(|| BigNumber::from_slice(&g));
        Self::with_generator(BigNumber::from_slice(&n), g)
    }
}

/// The secret half of a Paillier key.
#[derive(Clone)]
pub struct PaillierDecryptionKey {
    public: PaillierEncryptionKey,
    p: BigNumber,
    q: BigNumber,
    lambda: BigNumber,
    mu: BigNumber,
}

impl Drop for PaillierDecryptionKey {
    fn drop(&mut self) {
        self.p.zeroize();
        self.q.zeroize();
        self.lambda.zeroize();
        self.mu.zeroize();
    }
}

impl Debug for PaillierDecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaillierDecryptionKey")
            .field("public", &self.public)
            .field("p", &"[redacted]")
            .field("q", &"[redacted]")
            .field("lambda", &"[redacted]")
            .field("mu", &"[redacted]")
            .finish()
    }
}

impl PaillierDecryptionKey {
    /// Generate a fresh key with two random primes of `prime_bits` bits each.
    #[instrument(skip_all)]
    pub fn generate(prime_bits: usize) -> Result<Self> {
        loop {
            let p = BigNumber::prime(prime_bits);
            let q = BigNumber::prime(prime_bits);
            if p != q {
                return Self::from_primes(&p, &q);
            }
        }
    }

    /// Build a key with the default generator from the primes `p` and `q`.
    pub fn from_primes(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        let two = BigNumber::from(2u64);
        if p == q {
            return crypto_err!("Paillier primes must be distinct");
        }
        if p <= &two || q <= &two || !p.is_prime() || !q.is_prime() {
            return crypto_err!("Paillier factors must be odd primes");
        }
        let n = p * q;
        let phi = (p - BigNumber::one()) * (q - BigNumber::one());
        let mu = match phi.invert(&n) {
            Some(mu) => mu,
            None => return crypto_err!("φ(N) is not invertible mod N"),
        };
        Ok(Self {
            public: PaillierEncryptionKey::new(n)?,
            p: p.clone(),
            q: q.clone(),
            lambda: phi,
            mu,
        })
    }

    /// Rebuild this key around a custom generator `g`. Fails if `g` is not a
    /// valid Paillier generator for N.
    pub fn with_generator(&self, g: BigNumber) -> Result<Self> {
        let public = PaillierEncryptionKey::with_generator(self.public.n.clone(), Some(g))?;
        let g = match public.g() {
            Some(g) => g.clone(),
            None => return Self::from_primes(&self.p, &self.q),
        };
        let p1 = &self.p - BigNumber::one();
        let q1 = &self.q - BigNumber::one();
        let lambda = (&p1 * &q1) / p1.gcd(&q1);
        let l = ell(&g.modpow(&lambda, &public.nn), &public.n);
        let mu = match l.invert(&public.n) {
            Some(mu) => mu,
            None => return crypto_err!("invalid Paillier generator"),
        };
        Ok(Self {
            public,
            p: self.p.clone(),
            q: self.q.clone(),
            lambda,
            mu,
        })
    }

    /// The matching public key.
    pub fn encryption_key(&self) -> &PaillierEncryptionKey {
        &self.public
    }

    /// Decrypt `c`, returning a plaintext in `[0, N)`.
    pub fn decrypt(&self, c: &PaillierCiphertext) -> Result<BigNumber> {
        self.public.check_ciphertext(c)?;
        let u = c.0.modpow(&self.lambda, &self.public.nn);
        Ok(ell(&u, &self.public.n).modmul(&self.mu, &self.public.n))
    }
}

/// L(u) = (u - 1) / N
fn ell(u: &BigNumber, n: &BigNumber) -> BigNumber {
    (u - BigNumber::one()) / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{random_bn, testing::*};

    #[test]
    fn encryption_roundtrips() {
        let mut rng = init_testing();
        let sk = get_test_paillier_key(&mut rng);
        let pk = sk.encryption_key();
        let n = pk.n().clone();

        for m in [
            BigNumber::zero(),
            BigNumber::one(),
            &n - BigNumber::one(),
            random_bn(&mut rng, &n),
        ] {
            let c = pk.encrypt(&mut rng, &m).unwrap();
            assert_eq!(sk.decrypt(&c).unwrap(), m);
        }
    }

    #[test]
    fn plaintext_must_be_below_n() {
        let mut rng = init_testing();
        let sk = get_test_paillier_key(&mut rng);
        let pk = sk.encryption_key();
        let err = pk.encrypt(&mut rng, pk.n()).unwrap_err();
        assert!(matches!(err, crate::errors::Error::Crypto(_)));
    }

    #[test]
    fn homomorphic_operations() {
        let mut rng = init_testing();
        let sk = get_test_paillier_key(&mut rng);
        let pk = sk.encryption_key();
        let n = pk.n().clone();

        let a = random_bn(&mut rng, &n);
        let b = random_bn(&mut rng, &n);
        let k = random_bn(&mut rng, &n);
        let ca = pk.encrypt(&mut rng, &a).unwrap();
        let cb = pk.encrypt(&mut rng, &b).unwrap();

        let sum = pk.add(&ca, &cb).unwrap();
        assert_eq!(sk.decrypt(&sum).unwrap(), (&a + &b).nmod(&n));

        let prod = pk.scalar_mul(&k, &ca).unwrap();
        assert_eq!(sk.decrypt(&prod).unwrap(), a.modmul(&k, &n));
    }

    #[test]
    fn custom_generator() {
        let mut rng = init_testing();
        let sk = get_test_paillier_key(&mut rng);
        let n = sk.encryption_key().n().clone();
        // (1 + N)^a·b^N is a valid generator whenever b is a unit.
        let nn = &n * &n;
        let g = (&n + BigNumber::one())
            .modpow(&BigNumber::from(3u64), &nn)
            .modmul(&random_bn_in_z_star(&mut rng, &n).modpow(&n, &nn), &nn);
        let sk = sk.with_generator(g).unwrap();
        assert!(sk.encryption_key().g().is_some());

        let m = random_bn(&mut rng, &n);
        let c = sk.encryption_key().encrypt(&mut rng, &m).unwrap();
        assert_eq!(sk.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn public_key_encoding() {
        let mut rng = init_testing();
        let sk = get_test_paillier_key(&mut rng);
        let pk = sk.encryption_key();
        let bytes = pk.to_bytes().unwrap();
        assert_eq!(&PaillierEncryptionKey::from_bytes(&bytes).unwrap(), pk);
        assert!(PaillierEncryptionKey::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn rejects_bad_primes() {
        let p = BigNumber::from(11u64);
        assert!(PaillierDecryptionKey::from_primes(&p, &p).is_err());
        assert!(PaillierDecryptionKey::from_primes(&p, &BigNumber::from(15u64)).is_err());
        assert!(PaillierDecryptionKey::from_primes(&p, &BigNumber::from(2u64)).is_err());
        assert!(PaillierDecryptionKey::from_primes(&p, &BigNumber::from(13u64)).is_ok());
    }

    #[test]
    fn ciphertexts_outside_range_do_not_decrypt() {
        let mut rng = init_testing();
        let sk = get_test_paillier_key(&mut rng);
        let nn = sk.encryption_key().n() * sk.encryption_key().n();
        assert!(sk.decrypt(&PaillierCiphertext(BigNumber::zero())).is_err());
        assert!(sk.decrypt(&PaillierCiphertext(nn)).is_err());
    }

    #[test]
    fn debug_output_hides_the_factors() {
        let sk = PaillierDecryptionKey::from_primes(&BigNumber::from(11u64), &BigNumber::from(13u64))
            .unwrap();
        let printed = format!("{sk:?}");
        assert!(printed.contains("[redacted]"));
        assert!(!printed.contains("p: 11"));
    }
}
