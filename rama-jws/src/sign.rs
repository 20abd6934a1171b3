use std::sync::Arc;

use rama_error::ErrorContext as _;
use rama_utils::macros::generate_set_and_with;

use crate::{
    ErrorKind, ErrorKindExt as _, Headers, JWA, JWSContext, JWSError, Key, Message, Signature,
    Signer, codec, header::ALGORITHM,
};

#[derive(Debug, Clone, Default)]
/// Options for [`JWSContext::sign`].
pub struct SignOptions {
    headers: Option<Headers>,
    detached: bool,
}

impl SignOptions {
    /// Create new default [`SignOptions`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Protected headers to sign. `alg` is always set to the signing algorithm.
        pub fn headers(mut self, headers: Headers) -> Self {
            self.headers = Some(headers);
            self
        }
    }

    generate_set_and_with! {
        /// Sign the payload but leave it out of the compact serialization,
        /// as described in [`rfc7515, appendix F`].
        ///
        /// [`rfc7515, appendix F`]: https://datatracker.ietf.org/doc/html/rfc7515#appendix-F
        pub fn detached(mut self, detached: bool) -> Self {
            self.detached = detached;
            self
        }
    }
}

#[derive(Debug, Clone)]
enum SignerSource {
    Algorithm(JWA),
    Signer(Arc<dyn Signer>),
}

#[derive(Debug, Clone)]
/// [`SignerConfig`] describes one signature of [`JWSContext::sign_multi`].
pub struct SignerConfig {
    source: SignerSource,
    key: Key,
    protected: Option<Headers>,
    public: Option<Headers>,
}

impl SignerConfig {
    /// Sign using the context's cached [`Signer`] for `alg`.
    pub fn new(alg: JWA, key: impl Into<Key>) -> Self {
        Self::with_source(SignerSource::Algorithm(alg), key.into())
    }

    /// Sign using the given [`Signer`].
    pub fn from_signer(signer: Arc<dyn Signer>, key: impl Into<Key>) -> Self {
        Self::with_source(SignerSource::Signer(signer), key.into())
    }

    fn with_source(source: SignerSource, key: Key) -> Self {
        Self {
            source,
            key,
            protected: None,
            public: None,
        }
    }

    /// The algorithm of this signer.
    #[must_use]
    pub fn algorithm(&self) -> JWA {
        match &self.source {
            SignerSource::Algorithm(alg) => *alg,
            SignerSource::Signer(signer) => signer.algorithm(),
        }
    }

    generate_set_and_with! {
        /// Protected headers of this signature.
        pub fn protected_headers(mut self, headers: Headers) -> Self {
            self.protected = Some(headers);
            self
        }
    }

    generate_set_and_with! {
        /// Unprotected headers of this signature.
        pub fn public_headers(mut self, headers: Headers) -> Self {
            self.public = Some(headers);
            self
        }
    }
}

impl JWSContext {
    /// Sign `payload` with `alg` and `key`, returning the compact serialization.
    ///
    /// The `alg` header is set to `alg`, the `kid` header to the key id
    /// of the key if it has one and no `kid` was given. With `"b64": false`
    /// the payload may not contain a `.` unless it is detached.
    pub fn sign(
        &self,
        payload: &[u8],
        alg: JWA,
        key: &Key,
        options: &SignOptions,
    ) -> Result<Vec<u8>, JWSError> {
        let signer = self.signer(alg)?;
        let protected = options.headers.clone().unwrap_or_default();

        if !protected.b64() && !options.detached && memchr::memchr(b'.', payload).is_some() {
            return Err(JWSError::new(
                ErrorKind::InvalidInput,
                "unencoded payload must not contain a '.' in compact serialization",
            ));
        }

        let signature = self.sign_one(payload, signer.as_ref(), key, protected, None)?;

        let payload = if options.detached { &[][..] } else { payload };
        codec::to_compact(&signature, payload, signature.b64())
    }

    /// Sign `payload` once per [`SignerConfig`], returning the JSON serialization.
    ///
    /// Signatures are produced and serialized in the given order. A single
    /// failing signer fails the whole call, the error reports its index and
    /// algorithm through [`JWSError::failed_signer`]. All configurations must
    /// agree on the `b64` header, as the payload is shared.
    pub fn sign_multi(&self, payload: &[u8], configs: &[SignerConfig]) -> Result<Vec<u8>, JWSError> {
        let Some(first) = configs.first() else {
            return Err(JWSError::new(
                ErrorKind::NoSigners,
                "no signers provided to sign multi",
            ));
        };
        let b64 = first.protected.as_ref().is_none_or(Headers::b64);

        let mut signatures = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let alg = config.algorithm();
            let protected = config.protected.clone().unwrap_or_default();
            if protected.b64() != b64 {
                return Err(JWSError::new(
                    ErrorKind::InvalidInput,
                    "all signers must agree on the b64 header",
                )
                .with_failed_signer(index, alg));
            }

            let signer = match &config.source {
                SignerSource::Algorithm(alg) => self.signer(*alg),
                SignerSource::Signer(signer) => Ok(signer.clone()),
            }
            .map_err(|err| err.with_failed_signer(index, alg))?;

            let signature = self
                .sign_one(
                    payload,
                    signer.as_ref(),
                    &config.key,
                    protected,
                    config.public.clone(),
                )
                .map_err(|err| err.with_failed_signer(index, alg))?;
            signatures.push(signature);
        }

        codec::to_json(&Message::new(payload, signatures))
    }

    fn sign_one(
        &self,
        payload: &[u8],
        signer: &dyn Signer,
        key: &Key,
        mut protected: Headers,
        public: Option<Headers>,
    ) -> Result<Signature, JWSError> {
        let alg = signer.algorithm();
        self.key_types().check_compatible(alg, key)?;

        if protected.contains(ALGORITHM) && protected.algorithm() != Some(alg) {
            tracing::debug!("overwrite alg header {:?} with {alg}", protected.get(ALGORITHM));
        }
        protected.set_algorithm(alg);
        if let Some(kid) = key.key_id()
            && protected.key_id().is_none()
        {
            protected.set_key_id(kid);
        }

        let b64 = protected.b64();
        let mut signature = Signature::new(protected);
        if let Some(public) = public {
            signature.set_public_headers(public);
        }

        let input = codec::signing_input(signature.seal_protected()?.as_bytes(), payload, b64);
        let signed = signer
            .sign(&input, key)
            .context("generate signature")
            .error_kind(ErrorKind::SigningFailed)?;
        signature.set_signature(signed);
        Ok(signature)
    }
}
