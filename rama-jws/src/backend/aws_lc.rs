use std::{borrow::Cow, sync::Arc};

use aws_lc_rs::{
    hmac,
    rand::SystemRandom,
    signature::{
        self, ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING,
        ECDSA_P521_SHA512_FIXED_SIGNING, EcdsaKeyPair, EcdsaSigningAlgorithm, Ed25519KeyPair,
        KeyPair as _, RsaEncoding, RsaKeyPair, UnparsedPublicKey, VerificationAlgorithm,
    },
};

use rama_error::{BoxErrorExt as _, ErrorContext as _, ErrorExt as _};

use super::{SignatureBackend, Signer, Verifier};
use crate::{AsymmetricKey, BoxError, ErrorKind, ErrorKindExt as _, JWA, JWSError, Key};

#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
/// [`SignatureBackend`] implemented with [`aws-lc-rs`].
///
/// Private keys are expected as PKCS#8 DER, public keys as described
/// by [`AsymmetricKey::Public`]. A private key can be used to verify
/// as well, its public key is derived on the fly.
///
/// [`aws-lc-rs`]: https://docs.rs/aws-lc-rs
pub struct AwsLcBackend;

impl AwsLcBackend {
    /// Create a new [`AwsLcBackend`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Derive the public key of the given key.
    ///
    /// Public keys are returned as-is, opaque keys are resolved to their
    /// material first. Symmetric keys have no public key.
    pub fn public_key(key: &Key) -> Result<Key, JWSError> {
        match key.material() {
            Key::Rsa(AsymmetricKey::Private(der)) => {
                let pair = RsaKeyPair::from_pkcs8(der)
                    .context("parse rsa pkcs8 private key")
                    .error_kind(ErrorKind::Decode)?;
                Ok(Key::Rsa(AsymmetricKey::Public(
                    pair.public_key().as_ref().to_vec(),
                )))
            }
            Key::Ec(AsymmetricKey::Private(der)) => {
                let public = [
                    &ECDSA_P256_SHA256_FIXED_SIGNING,
                    &ECDSA_P384_SHA384_FIXED_SIGNING,
                    &ECDSA_P521_SHA512_FIXED_SIGNING,
                ]
                .into_iter()
                .find_map(|alg| EcdsaKeyPair::from_pkcs8(alg, der).ok())
                .map(|pair| pair.public_key().as_ref().to_vec())
                .ok_or_else(|| {
                    JWSError::new(
                        ErrorKind::Decode,
                        "parse ec pkcs8 private key: not a P-256, P-384 or P-521 key",
                    )
                })?;
                Ok(Key::Ec(AsymmetricKey::Public(public)))
            }
            Key::Okp(AsymmetricKey::Private(der)) => {
                let pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der)
                    .context("parse ed25519 pkcs8 private key")
                    .error_kind(ErrorKind::Decode)?;
                Ok(Key::Okp(AsymmetricKey::Public(
                    pair.public_key().as_ref().to_vec(),
                )))
            }
            key @ (Key::Rsa(_) | Key::Ec(_) | Key::Okp(_)) => Ok(key.clone()),
            Key::Octet(_) => Err(JWSError::new(
                ErrorKind::UnsupportedKeyType,
                "symmetric key has no public key",
            )),
            Key::Opaque(_) => Err(JWSError::new(
                ErrorKind::UnsupportedKeyType,
                "opaque key without key material",
            )),
        }
    }
}

impl SignatureBackend for AwsLcBackend {
    fn new_signer(&self, alg: JWA) -> Result<Arc<dyn Signer>, JWSError> {
        Ok(Arc::new(AwsLcSigner {
            alg,
            rng: SystemRandom::new(),
        }))
    }

    fn new_verifier(&self, alg: JWA) -> Result<Arc<dyn Verifier>, JWSError> {
        Ok(Arc::new(AwsLcVerifier { alg }))
    }
}

#[derive(Debug)]
struct AwsLcSigner {
    alg: JWA,
    rng: SystemRandom,
}

impl Signer for AwsLcSigner {
    fn algorithm(&self) -> JWA {
        self.alg
    }

    fn sign(&self, message: &[u8], key: &Key) -> Result<Vec<u8>, BoxError> {
        match (self.alg, key.material()) {
            (JWA::HS256 | JWA::HS384 | JWA::HS512, Key::Octet(secret)) => {
                let key = hmac::Key::new(hmac_algorithm(self.alg)?, secret);
                Ok(hmac::sign(&key, message).as_ref().to_vec())
            }
            (
                JWA::RS256 | JWA::RS384 | JWA::RS512 | JWA::PS256 | JWA::PS384 | JWA::PS512,
                Key::Rsa(AsymmetricKey::Private(der)),
            ) => {
                let pair = RsaKeyPair::from_pkcs8(der).context("parse rsa pkcs8 private key")?;
                let mut signature = vec![0u8; pair.public_modulus_len()];
                pair.sign(rsa_encoding(self.alg)?, &self.rng, message, &mut signature)
                    .context("rsa sign")?;
                Ok(signature)
            }
            (JWA::ES256 | JWA::ES384 | JWA::ES512, Key::Ec(AsymmetricKey::Private(der))) => {
                let pair = EcdsaKeyPair::from_pkcs8(ecdsa_signing_algorithm(self.alg)?, der)
                    .context("parse ec pkcs8 private key")?;
                Ok(pair
                    .sign(&self.rng, message)
                    .context("ecdsa sign")?
                    .as_ref()
                    .to_vec())
            }
            (JWA::EdDSA, Key::Okp(AsymmetricKey::Private(der))) => {
                let pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der)
                    .context("parse ed25519 pkcs8 private key")?;
                Ok(pair.sign(message).as_ref().to_vec())
            }
            (alg, key) => Err(BoxError::from_static_str("key can not be used to sign")
                .context_field("alg", alg)
                .context_debug_field("kty", key.key_type())),
        }
    }
}

#[derive(Debug)]
struct AwsLcVerifier {
    alg: JWA,
}

impl Verifier for AwsLcVerifier {
    fn algorithm(&self) -> JWA {
        self.alg
    }

    fn verify(&self, message: &[u8], signature: &[u8], key: &Key) -> Result<(), BoxError> {
        match (self.alg, key.material()) {
            (JWA::HS256 | JWA::HS384 | JWA::HS512, Key::Octet(secret)) => {
                let key = hmac::Key::new(hmac_algorithm(self.alg)?, secret);
                hmac::verify(&key, message, signature).context("hmac verify")
            }
            (_, key @ (Key::Rsa(_) | Key::Ec(_) | Key::Okp(_))) => {
                let algorithm = verification_algorithm(self.alg)?;
                let public = match key {
                    Key::Rsa(AsymmetricKey::Public(public))
                    | Key::Ec(AsymmetricKey::Public(public))
                    | Key::Okp(AsymmetricKey::Public(public)) => Cow::Borrowed(public),
                    _ => match AwsLcBackend::public_key(key)? {
                        Key::Rsa(AsymmetricKey::Public(public))
                        | Key::Ec(AsymmetricKey::Public(public))
                        | Key::Okp(AsymmetricKey::Public(public)) => Cow::Owned(public),
                        _ => return Err(BoxError::from_static_str("derive public key")),
                    },
                };
                UnparsedPublicKey::new(algorithm, public.as_slice())
                    .verify(message, signature)
                    .context("verify signature")
                    .context_field("alg", self.alg)
            }
            (alg, key) => Err(BoxError::from_static_str("key can not be used to verify")
                .context_field("alg", alg)
                .context_debug_field("kty", key.key_type())),
        }
    }
}

fn hmac_algorithm(alg: JWA) -> Result<hmac::Algorithm, BoxError> {
    match alg {
        JWA::HS256 => Ok(hmac::HMAC_SHA256),
        JWA::HS384 => Ok(hmac::HMAC_SHA384),
        JWA::HS512 => Ok(hmac::HMAC_SHA512),
        alg => Err(BoxError::from_static_str("not a hmac algorithm").context_field("alg", alg)),
    }
}

fn rsa_encoding(alg: JWA) -> Result<&'static dyn RsaEncoding, BoxError> {
    match alg {
        JWA::RS256 => Ok(&signature::RSA_PKCS1_SHA256),
        JWA::RS384 => Ok(&signature::RSA_PKCS1_SHA384),
        JWA::RS512 => Ok(&signature::RSA_PKCS1_SHA512),
        JWA::PS256 => Ok(&signature::RSA_PSS_SHA256),
        JWA::PS384 => Ok(&signature::RSA_PSS_SHA384),
        JWA::PS512 => Ok(&signature::RSA_PSS_SHA512),
        alg => Err(BoxError::from_static_str("not a rsa algorithm").context_field("alg", alg)),
    }
}

fn ecdsa_signing_algorithm(alg: JWA) -> Result<&'static EcdsaSigningAlgorithm, BoxError> {
    match alg {
        JWA::ES256 => Ok(&ECDSA_P256_SHA256_FIXED_SIGNING),
        JWA::ES384 => Ok(&ECDSA_P384_SHA384_FIXED_SIGNING),
        JWA::ES512 => Ok(&ECDSA_P521_SHA512_FIXED_SIGNING),
        alg => Err(BoxError::from_static_str("not an ecdsa algorithm").context_field("alg", alg)),
    }
}

fn verification_algorithm(alg: JWA) -> Result<&'static dyn VerificationAlgorithm, BoxError> {
    match alg {
        JWA::RS256 => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
        JWA::RS384 => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
        JWA::RS512 => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
        JWA::PS256 => Ok(&signature::RSA_PSS_2048_8192_SHA256),
        JWA::PS384 => Ok(&signature::RSA_PSS_2048_8192_SHA384),
        JWA::PS512 => Ok(&signature::RSA_PSS_2048_8192_SHA512),
        JWA::ES256 => Ok(&signature::ECDSA_P256_SHA256_FIXED),
        JWA::ES384 => Ok(&signature::ECDSA_P384_SHA384_FIXED),
        JWA::ES512 => Ok(&signature::ECDSA_P521_SHA512_FIXED),
        JWA::EdDSA => Ok(&signature::ED25519),
        alg => Err(
            BoxError::from_static_str("not an asymmetric algorithm").context_field("alg", alg),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn hmac_round_trip() {
        let backend = AwsLcBackend::new();
        let key = Key::Octet(b"a very secret key".to_vec());
        for alg in [JWA::HS256, JWA::HS384, JWA::HS512] {
            let signer = backend.new_signer(alg).unwrap();
            let verifier = backend.new_verifier(alg).unwrap();
            assert_eq!(signer.algorithm(), alg);
            assert_eq!(verifier.algorithm(), alg);

            let signature = signer.sign(b"message", &key).unwrap();
            verifier.verify(b"message", &signature, &key).unwrap();
            assert_err!(verifier.verify(b"massage", &signature, &key));
        }
    }

    #[test]
    fn key_mismatch_is_an_error() {
        let backend = AwsLcBackend::new();
        let signer = backend.new_signer(JWA::ES256).unwrap();
        let err = signer
            .sign(b"message", &Key::Octet(b"secret".to_vec()))
            .unwrap_err();
        assert!(err.to_string().contains("alg=\"ES256\""), "{err}");

        let verifier = backend.new_verifier(JWA::HS256).unwrap();
        assert_err!(verifier.verify(
            b"message",
            b"signature",
            &Key::Ec(AsymmetricKey::Public(vec![4; 65]))
        ));
    }

    #[test]
    fn symmetric_key_has_no_public_key() {
        let err = AwsLcBackend::public_key(&Key::Octet(b"secret".to_vec())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedKeyType);
    }
}
