// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::*;
use crate::{
    errors::{Error, Result},
    utils::testing::{get_test_paillier_key, init_testing},
};
use ecdsa::signature::Verifier;
use rand::{rngs::StdRng, seq::IteratorRandom};
use sha2::{Digest, Sha256};

/// Runs key sharing for `n` parties with threshold `t` and returns the
/// pinned configuration and every party's key share.
fn key_sharing<C: CurveTrait>(
    rng: &mut StdRng,
    key_id: &str,
    n: usize,
    t: usize,
) -> Result<(KeyShareConfig, Vec<PlayerKeyShare<C>>)> {
    let config = KeyShareConfig::new(key_id, C::NAME, n, t)?;
    let mut session = Session::<C, _>::new(config, Mode::KeySharing, InMemoryMessageStore::new())?;
    for _ in 0..n {
        let _ = session.add_key_sharing_player()?;
    }
    let pk = session.key_sharing(rng)?;
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.public_key(), Some(pk.as_str()));
    session.check_key_pair(&pk)?;
    Ok((session.config().clone(), session.key_shares()?))
}

fn signing_session<C: CurveTrait, S: MessageStore>(
    rng: &mut StdRng,
    config: &KeyShareConfig,
    shares: &[PlayerKeyShare<C>],
    signers: &[u32],
    store: S,
) -> Result<Session<C, S>> {
    let mut session = Session::<C, S>::new(config.clone(), Mode::Signing, store)?;
    for share in shares.iter().filter(|s| signers.contains(&s.index().value())) {
        session.add_signing_player(share.clone(), get_test_paillier_key(rng))?;
    }
    Ok(session)
}

fn verify<C: CurveTrait>(config: &KeyShareConfig, digest: &[u8], signature_hex: &str) -> Result<()> {
    let pk = match config.public_key::<C>()? {
        Some(pk) => pk,
        None => panic!("public key was not pinned"),
    };
    let der = hex::decode(signature_hex).unwrap();
    pk.verify_prehash(digest, &der)
}

#[test]
fn p256_three_parties_threshold_one() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<P256>(&mut rng, "e2e-p256", 3, 1)?;

    let digest = Sha256::digest(b"hello");
    let mut session =
        signing_session(&mut rng, &config, &shares, &[1, 2], InMemoryMessageStore::new())?;
    let signature = session.signing(&mut rng, &digest)?;
    assert_eq!(session.status(), SessionStatus::Completed);
    verify::<P256>(&config, &digest, &signature)?;

    // The signature also checks out with the p256 crate directly.
    let pk_bytes = hex::decode(config.encoded_public_key().unwrap()).unwrap();
    let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&pk_bytes).unwrap();
    let sig = p256::ecdsa::Signature::from_der(&hex::decode(&signature).unwrap()).unwrap();
    assert!(key.verify(b"hello", &sig).is_ok());
    Ok(())
}

#[test]
fn secp256k1_any_quorum_signs() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<Secp256k1>(&mut rng, "e2e-k256", 5, 2)?;

    for message in [&b"first"[..], b"second", b"third"] {
        let signers = (1..=5u32).choose_multiple(&mut rng, 3);
        let digest = Sha256::digest(message);
        let mut session =
            signing_session(&mut rng, &config, &shares, &signers, InMemoryMessageStore::new())?;
        let signature = session.signing(&mut rng, &digest)?;
        verify::<Secp256k1>(&config, &digest, &signature)?;
    }
    Ok(())
}

#[test]
fn all_parties_can_sign_together() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<Secp256k1>(&mut rng, "e2e-all", 4, 1)?;
    let digest = Sha256::digest(b"everyone");
    let mut session =
        signing_session(&mut rng, &config, &shares, &[1, 2, 3, 4], InMemoryMessageStore::new())?;
    let signature = session.signing(&mut rng, &digest)?;
    verify::<Secp256k1>(&config, &digest, &signature)
}

#[test]
fn refreshed_shares_still_sign() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<P256>(&mut rng, "e2e-refresh", 3, 1)?;

    let mut update = Session::<P256, _>::new(config.clone(), Mode::KeyUpdate, InMemoryMessageStore::new())?;
    for share in &shares {
        update.add_key_update_player(share)?;
    }
    let pk = update.key_update(&mut rng)?;
    assert_eq!(Some(pk.as_str()), config.encoded_public_key());
    let refreshed = update.key_shares()?;
    for (before, after) in shares.iter().zip(&refreshed) {
        assert_eq!(before.index(), after.index());
        assert_eq!(before.public_share(), after.public_share());
        assert_ne!(before.to_json()?, after.to_json()?);
    }

    // Refreshed shares sign; shares from before and after cannot be mixed.
    let digest = Sha256::digest(b"after refresh");
    let mut session =
        signing_session(&mut rng, &config, &refreshed, &[2, 3], InMemoryMessageStore::new())?;
    verify::<P256>(&config, &digest, &session.signing(&mut rng, &digest)?)?;

    let mixed = vec![shares[0].clone(), refreshed[1].clone()];
    let mut session = signing_session(&mut rng, &config, &mixed, &[1, 2], InMemoryMessageStore::new())?;
    assert!(matches!(
        session.signing(&mut rng, &digest),
        Err(Error::ProtocolIntegrity(_))
    ));
    assert_eq!(session.status(), SessionStatus::Aborted);
    Ok(())
}

#[test]
fn persisted_shares_can_be_reloaded() -> Result<()> {
    let mut rng = init_testing();
    let config = KeyShareConfig::new("e2e-json", "prime256v1", 3, 1)?;
    let mut session = Session::<P256, _>::new(config, Mode::KeySharing, InMemoryMessageStore::new())?;
    for _ in 0..3 {
        let _ = session.add_key_sharing_player()?;
    }
    let _ = session.key_sharing(&mut rng)?;
    let config = KeyShareConfig::from_json(&session.config().to_json()?)?;
    let shares = session
        .player_keys()?
        .iter()
        .map(|json| PlayerKeyShare::<P256>::from_json(json))
        .collect::<Result<Vec<_>>>()?;

    let digest = Sha256::digest(b"reloaded");
    let mut signing =
        signing_session(&mut rng, &config, &shares, &[1, 3], InMemoryMessageStore::new())?;
    verify::<P256>(&config, &digest, &signing.signing(&mut rng, &digest)?)
}

#[test]
fn too_few_signers_fail_before_any_round() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<P256>(&mut rng, "e2e-few", 4, 2)?;
    let digest = Sha256::digest(b"not enough");
    let mut session =
        signing_session(&mut rng, &config, &shares, &[1, 4], InMemoryMessageStore::new())?;
    assert!(matches!(session.signing(&mut rng, &digest), Err(Error::Config(_))));
    assert!(session.store().is_empty());
    assert_eq!(session.status(), SessionStatus::Ready);
    Ok(())
}

#[test]
fn signing_without_a_pinned_key_fails() -> Result<()> {
    let mut rng = init_testing();
    let (_, shares) = key_sharing::<Secp256k1>(&mut rng, "e2e-unpinned", 3, 1)?;
    let config = KeyShareConfig::new("e2e-unpinned", "secp256k1", 3, 1)?;
    let mut session =
        signing_session(&mut rng, &config, &shares, &[1, 2], InMemoryMessageStore::new())?;
    assert!(matches!(
        session.signing(&mut rng, &Sha256::digest(b"x")),
        Err(Error::Config(_))
    ));
    Ok(())
}

#[test]
fn signers_must_hold_shares_of_the_session_key() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<P256>(&mut rng, "e2e-key-a", 3, 1)?;
    let (_, other_shares) = key_sharing::<P256>(&mut rng, "e2e-key-b", 3, 1)?;
    let mut session = signing_session(&mut rng, &config, &shares, &[1], InMemoryMessageStore::new())?;
    let err = session
        .add_signing_player(other_shares[1].clone(), get_test_paillier_key(&mut rng))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    let err = session
        .add_signing_player(shares[0].clone(), get_test_paillier_key(&mut rng))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    Ok(())
}

#[test]
fn mismatched_pinned_key_is_an_integrity_error() -> Result<()> {
    let mut rng = init_testing();
    let (other, _) = key_sharing::<P256>(&mut rng, "e2e-other", 2, 1)?;
    let config = KeyShareConfig::from_json(&format!(
        r#"{{"keyId":"e2e-pinned","crv":"secp256r1","n":2,"t":1,"pk":"{}"}}"#,
        other.encoded_public_key().unwrap()
    ))?;
    let mut session = Session::<P256, _>::new(config, Mode::KeySharing, InMemoryMessageStore::new())?;
    for _ in 0..2 {
        let _ = session.add_key_sharing_player()?;
    }
    assert!(matches!(
        session.key_sharing(&mut rng),
        Err(Error::ProtocolIntegrity(_))
    ));
    assert_eq!(session.status(), SessionStatus::Aborted);
    assert!(session.key_shares()?.is_empty());
    assert!(session.key_sharing(&mut rng).is_err());
    Ok(())
}

/// A store that flips a bit in every message of one type.
#[derive(Debug, Default)]
struct TamperingStore {
    inner: InMemoryMessageStore,
    target: Option<MessageType>,
    from: Option<PartyIndex>,
}

impl MessageStore for TamperingStore {
    fn save(&mut self, message: Message) -> Result<()> {
        let tamper = Some(message.message_type()) == self.target
            && self.from.map_or(true, |from| from == message.from());
        if !tamper {
            return self.inner.save(message);
        }
        let mut data = message.data().to_vec();
        if let Some(last) = data.last_mut() {
            *last ^= 0x02;
        }
        self.inner.save(Message::new(
            message.message_type(),
            message.from(),
            message.to(),
            data,
        )?)
    }

    fn read(&self, from: PartyIndex, to: PartyIndex, message_type: MessageType) -> Option<Message> {
        self.inner.read(from, to, message_type)
    }
}

#[test]
fn tampered_mta_ciphertext_is_detected() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<P256>(&mut rng, "e2e-tamper", 3, 1)?;
    let store = TamperingStore {
        target: Some(MessageType::EncryptedKW),
        ..Default::default()
    };
    let mut session = signing_session(&mut rng, &config, &shares, &[1, 2], store)?;
    let err = session
        .signing(&mut rng, &Sha256::digest(b"hello"))
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolIntegrity(_)), "{err:?}");
    assert_eq!(session.status(), SessionStatus::Aborted);
    Ok(())
}

#[test]
fn tampered_kg_broadcast_splits_r() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<Secp256k1>(&mut rng, "e2e-tamper-kg", 3, 2)?;
    let store = TamperingStore {
        target: Some(MessageType::KGShare),
        from: Some(PartyIndex::new(1)?),
        ..Default::default()
    };
    let mut session = signing_session(&mut rng, &config, &shares, &[1, 2, 3], store)?;
    let err = session
        .signing(&mut rng, &Sha256::digest(b"hello"))
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolIntegrity(_)), "{err:?}");
    Ok(())
}

#[test]
fn tampered_kg_ciphertext_is_caught_by_the_signature_check() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<P256>(&mut rng, "e2e-tamper-enc-kg", 3, 1)?;
    // Every signer derives r from the same broadcasts, so they all agree on
    // a wrong R and only the final verification notices.
    let store = TamperingStore {
        target: Some(MessageType::EncryptedKG),
        ..Default::default()
    };
    let mut session = signing_session(&mut rng, &config, &shares, &[1, 2], store)?;
    let result = session.signing(&mut rng, &Sha256::digest(b"hello"));
    assert!(matches!(result, Err(Error::ProtocolIntegrity(_))), "{result:?}");
    assert_eq!(session.status(), SessionStatus::Aborted);
    assert!(session.key_shares()?.is_empty());
    Ok(())
}

#[test]
fn corrupted_share_beyond_the_first_quorum_fails_the_key_check() -> Result<()> {
    let mut rng = init_testing();
    let (config, mut shares) = key_sharing::<P256>(&mut rng, "e2e-bad-share", 3, 1)?;
    let pk = config.encoded_public_key().unwrap().to_string();

    let mut json: serde_json::Value = serde_json::from_str(&shares[2].to_json()?).unwrap();
    json["xi"] = hex::encode(<P256 as CurveTrait>::Scalar::from_u64(42).to_bytes()).into();
    shares[2] = PlayerKeyShare::from_json(&json.to_string())?;

    let session = signing_session(&mut rng, &config, &shares, &[1, 2], InMemoryMessageStore::new())?;
    session.check_key_pair(&pk)?;
    let session =
        signing_session(&mut rng, &config, &shares, &[1, 2, 3], InMemoryMessageStore::new())?;
    assert!(matches!(
        session.check_key_pair(&pk),
        Err(Error::ProtocolIntegrity(_))
    ));
    Ok(())
}

#[test]
fn a_session_runs_once() -> Result<()> {
    let mut rng = init_testing();
    let (config, shares) = key_sharing::<P256>(&mut rng, "e2e-once", 2, 1)?;
    let digest = Sha256::digest(b"once");
    let mut session =
        signing_session(&mut rng, &config, &shares, &[1, 2], InMemoryMessageStore::new())?;
    let _ = session.signing(&mut rng, &digest)?;
    assert!(matches!(
        session.signing(&mut rng, &digest),
        Err(Error::ProtocolState(_))
    ));
    Ok(())
}
