//! Signature capabilities consumed by the signing and verification engines.

use std::{fmt, sync::Arc};

use crate::{BoxError, JWA, JWSError, Key};

#[cfg(feature = "aws-lc")]
mod aws_lc;
#[cfg(feature = "aws-lc")]
#[cfg_attr(docsrs, doc(cfg(feature = "aws-lc")))]
pub use aws_lc::AwsLcBackend;

/// A [`Signer`] computes the signature over a signing input.
///
/// Signers are cached per algorithm by a [`JWSContext`](crate::JWSContext)
/// and shared between threads, so they should be stateless.
pub trait Signer: fmt::Debug + Send + Sync {
    /// The algorithm produced signatures are valid for.
    fn algorithm(&self) -> JWA;

    /// Sign `message` using `key`.
    fn sign(&self, message: &[u8], key: &Key) -> Result<Vec<u8>, BoxError>;
}

/// A [`Verifier`] checks a signature over a signing input.
pub trait Verifier: fmt::Debug + Send + Sync {
    /// The algorithm signatures are checked for.
    fn algorithm(&self) -> JWA;

    /// Verify that `signature` is a valid signature over `message` for `key`.
    fn verify(&self, message: &[u8], signature: &[u8], key: &Key) -> Result<(), BoxError>;
}

/// Factory of [`Signer`]s and [`Verifier`]s.
pub trait SignatureBackend: fmt::Debug + Send + Sync {
    /// Create a [`Signer`] for the given algorithm.
    ///
    /// Fails with [`ErrorKind::UnsupportedAlgorithm`](crate::ErrorKind::UnsupportedAlgorithm)
    /// if the backend does not implement it.
    fn new_signer(&self, alg: JWA) -> Result<Arc<dyn Signer>, JWSError>;

    /// Create a [`Verifier`] for the given algorithm.
    ///
    /// Fails with [`ErrorKind::UnsupportedAlgorithm`](crate::ErrorKind::UnsupportedAlgorithm)
    /// if the backend does not implement it.
    fn new_verifier(&self, alg: JWA) -> Result<Arc<dyn Verifier>, JWSError>;
}

impl<B: SignatureBackend + ?Sized> SignatureBackend for Arc<B> {
    fn new_signer(&self, alg: JWA) -> Result<Arc<dyn Signer>, JWSError> {
        (**self).new_signer(alg)
    }

    fn new_verifier(&self, alg: JWA) -> Result<Arc<dyn Verifier>, JWSError> {
        (**self).new_verifier(alg)
    }
}
