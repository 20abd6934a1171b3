#![cfg(feature = "aws-lc")]

use rama_jws::{
    AsymmetricKey, AwsLcBackend, ErrorKind, Headers, JWA, JWSContext, Key, KeyDescriptor, KeyUse,
    SignOptions, SignerConfig, VerifyOptions, parse, parse_reader,
};

use quickcheck_macros::quickcheck;
use tokio_test::{assert_err, assert_ok};

const RSA_KEY: &[u8] = include_bytes!("fixtures/rsa-2048.pk8.der");
const RSA_OTHER_KEY: &[u8] = include_bytes!("fixtures/rsa-2048-other.pk8.der");
const P256_KEY: &[u8] = include_bytes!("fixtures/ec-p256.pk8.der");
const P384_KEY: &[u8] = include_bytes!("fixtures/ec-p384.pk8.der");
const P521_KEY: &[u8] = include_bytes!("fixtures/ec-p521.pk8.der");
const ED25519_KEY: &[u8] = include_bytes!("fixtures/ed25519.pk8.der");

fn hmac_key() -> Key {
    Key::Octet(b"0123456789abcdef0123456789abcdef".to_vec())
}

fn rsa_key() -> Key {
    Key::Rsa(AsymmetricKey::Private(RSA_KEY.to_vec()))
}

fn private_key_for(alg: JWA) -> Key {
    match alg {
        JWA::HS256 | JWA::HS384 | JWA::HS512 => hmac_key(),
        JWA::RS256 | JWA::RS384 | JWA::RS512 | JWA::PS256 | JWA::PS384 | JWA::PS512 => rsa_key(),
        JWA::ES256 => Key::Ec(AsymmetricKey::Private(P256_KEY.to_vec())),
        JWA::ES384 => Key::Ec(AsymmetricKey::Private(P384_KEY.to_vec())),
        JWA::ES512 => Key::Ec(AsymmetricKey::Private(P521_KEY.to_vec())),
        JWA::EdDSA => Key::Okp(AsymmetricKey::Private(ED25519_KEY.to_vec())),
    }
}

#[test]
fn round_trip_all_algorithms() {
    let ctx = JWSContext::default();

    for alg in JWA::ALL {
        let key = private_key_for(alg);
        assert!(ctx.algorithms_for(&key).unwrap().contains(&alg));

        let compact = ctx
            .sign(b"It's a dangerous business, Frodo", alg, &key, &SignOptions::new())
            .unwrap();
        let payload = ctx
            .verify(&compact, alg, &key, &VerifyOptions::new())
            .unwrap();
        assert_eq!(payload, b"It's a dangerous business, Frodo", "{alg}");

        if alg.key_type() != rama_jws::KeyType::Octet {
            let public = AwsLcBackend::public_key(&key).unwrap();
            let payload = ctx
                .verify(&compact, alg, &public, &VerifyOptions::new())
                .unwrap();
            assert_eq!(payload, b"It's a dangerous business, Frodo", "{alg}");
        }

        let message = parse(&compact).unwrap();
        assert_eq!(message.payload(), b"It's a dangerous business, Frodo");
        assert_eq!(message.signatures().len(), 1);
        assert_eq!(
            message.signatures()[0].protected_headers().algorithm(),
            Some(alg)
        );
    }
}

#[test]
fn other_rsa_key_does_not_verify() {
    let ctx = JWSContext::default();
    let compact = ctx
        .sign(b"payload", JWA::RS256, &rsa_key(), &SignOptions::new())
        .unwrap();

    let other = Key::Rsa(AsymmetricKey::Private(RSA_OTHER_KEY.to_vec()));
    let err = ctx
        .verify(&compact, JWA::RS256, &other, &VerifyOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationFailed);
}

#[test]
fn single_bit_flips_never_verify() {
    let ctx = JWSContext::default();

    for alg in [JWA::HS256, JWA::ES256] {
        let key = private_key_for(alg);
        let compact = ctx
            .sign(b"{\"iss\":\"joe\"}", alg, &key, &SignOptions::new())
            .unwrap();
        assert_ok!(ctx.verify(&compact, alg, &key, &VerifyOptions::new()));

        for index in 0..compact.len() {
            if compact[index] == b'.' {
                continue;
            }
            for bit in 0..8 {
                let mut tampered = compact.clone();
                tampered[index] ^= 1 << bit;
                assert_err!(
                    ctx.verify(&tampered, alg, &key, &VerifyOptions::new()),
                    "{alg}: flipped bit {bit} of byte {index}"
                );
            }
        }
    }
}

#[test]
fn multi_signature_verified_by_single_key() {
    let ctx = JWSContext::default();
    let configs = [
        SignerConfig::new(JWA::HS256, hmac_key()),
        SignerConfig::new(JWA::RS256, rsa_key()),
        SignerConfig::new(JWA::ES256, private_key_for(JWA::ES256)),
    ];
    let json = ctx.sign_multi(b"shared payload", &configs).unwrap();

    let message = parse(&json).unwrap();
    assert_eq!(message.payload(), b"shared payload");
    assert_eq!(message.signatures().len(), 3);

    let public = AwsLcBackend::public_key(&rsa_key()).unwrap();
    let verified = ctx
        .verify_detailed(&json, JWA::RS256, &public, &VerifyOptions::new())
        .unwrap();
    assert_eq!(verified.payload(), b"shared payload");
    assert_eq!(verified.signature_index(), 1);
}

#[test]
fn key_set_skips_encryption_keys() {
    let ctx = JWSContext::default();
    let compact = ctx
        .sign(b"payload", JWA::ES384, &private_key_for(JWA::ES384), &SignOptions::new())
        .unwrap();

    let public = AwsLcBackend::public_key(&private_key_for(JWA::ES384)).unwrap();
    let keys = [
        KeyDescriptor::new(public.clone())
            .with_algorithm(JWA::ES384)
            .with_usage(KeyUse::Encryption)
            .into_key(),
        KeyDescriptor::new(public)
            .with_algorithm(JWA::ES384)
            .with_usage(KeyUse::Signature)
            .into_key(),
    ];
    let payload = ctx
        .verify_with_key_set(&compact, &keys, &VerifyOptions::new())
        .unwrap();
    assert_eq!(payload, b"payload");

    let err = ctx
        .verify_with_key_set(&compact, &keys[..1], &VerifyOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoKeyVerified);
}

#[test]
fn detached_payload() {
    let ctx = JWSContext::default();
    let key = private_key_for(JWA::ES256);
    let compact = ctx
        .sign(
            b"detached",
            JWA::ES256,
            &key,
            &SignOptions::new().with_detached(true),
        )
        .unwrap();
    assert_eq!(compact.iter().filter(|b| **b == b'.').count(), 2);
    assert!(compact.windows(2).any(|w| w == b".."));

    let payload = ctx
        .verify(
            &compact,
            JWA::ES256,
            &key,
            &VerifyOptions::new().with_detached_payload("detached"),
        )
        .unwrap();
    assert_eq!(payload, b"detached");

    let attached = ctx
        .sign(b"detached", JWA::ES256, &key, &SignOptions::new())
        .unwrap();
    let err = ctx
        .verify(
            &attached,
            JWA::ES256,
            &key,
            &VerifyOptions::new().with_detached_payload("detached"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousPayload);
}

#[test]
fn key_id_mismatch_is_fatal() {
    let ctx = JWSContext::default();
    let signing_key = KeyDescriptor::new(private_key_for(JWA::EdDSA))
        .with_key_id("ed-1")
        .into_key();
    let compact = ctx
        .sign(b"payload", JWA::EdDSA, &signing_key, &SignOptions::new())
        .unwrap();

    let message = parse(&compact).unwrap();
    assert_eq!(message.signatures()[0].protected_headers().key_id(), Some("ed-1"));

    let verify_key = KeyDescriptor::new(private_key_for(JWA::EdDSA))
        .with_key_id("ed-2")
        .into_key();
    let err = ctx
        .verify(&compact, JWA::EdDSA, &verify_key, &VerifyOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyIdMismatch);
}

#[test]
fn unencoded_payload_is_signed_verbatim() {
    let ctx = JWSContext::default();
    let key = private_key_for(JWA::EdDSA);
    let options = SignOptions::new().with_headers(
        Headers::new()
            .with_b64(false)
            .with_critical([rama_jws::header::BASE64_ENCODE_PAYLOAD]),
    );
    let compact = ctx.sign(b"$02 raw", JWA::EdDSA, &key, &options).unwrap();
    assert!(compact.windows(7).any(|w| w == b"$02 raw"));

    let payload = ctx
        .verify(&compact, JWA::EdDSA, &key, &VerifyOptions::new())
        .unwrap();
    assert_eq!(payload, b"$02 raw");
}

#[test]
fn parse_reader_matches_parse() {
    let ctx = JWSContext::default();
    let compact = ctx
        .sign(
            &vec![b'x'; 10_000],
            JWA::PS256,
            &rsa_key(),
            &SignOptions::new(),
        )
        .unwrap();

    let streamed = parse_reader(compact.as_slice()).unwrap();
    assert_eq!(streamed, parse(&compact).unwrap());
    assert_eq!(streamed.payload().len(), 10_000);
}

#[quickcheck]
fn hmac_round_trip(payload: Vec<u8>) -> bool {
    let ctx = JWSContext::default();
    let compact = match ctx.sign(&payload, JWA::HS512, &hmac_key(), &SignOptions::new()) {
        Ok(compact) => compact,
        Err(_) => return false,
    };
    ctx.verify(&compact, JWA::HS512, &hmac_key(), &VerifyOptions::new())
        .is_ok_and(|verified| verified == payload)
}
