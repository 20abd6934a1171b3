use std::{collections::HashMap, fmt, io::Read, sync::Arc};

use parking_lot::Mutex;
use rama_utils::macros::generate_set_and_with;
use serde::de::DeserializeOwned;

use crate::{
    CustomFields, JWA, JWSError, Key, KeyTypeRegistry, Message, SignatureBackend, Signer,
    Verifier, codec,
};

/// [`JWSContext`] is the entry point for signing and verifying JWS messages.
///
/// It owns everything that is shared between calls:
///
/// - the [`SignatureBackend`] creating [`Signer`]s and [`Verifier`]s;
/// - a cache of [`Signer`]s, one per algorithm, created on first use;
/// - the [`KeyTypeRegistry`] which decides what algorithms a key may be used with;
/// - the [`CustomFields`] registry used to decode private header fields.
///
/// A context is meant to be created once and shared, all methods take `&self`.
pub struct JWSContext {
    backend: Arc<dyn SignatureBackend>,
    signers: Mutex<HashMap<JWA, Arc<dyn Signer>>>,
    key_types: KeyTypeRegistry,
    custom_fields: CustomFields,
}

impl JWSContext {
    /// Create a new [`JWSContext`] using the given [`SignatureBackend`].
    pub fn new(backend: impl SignatureBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            signers: Mutex::new(HashMap::new()),
            key_types: KeyTypeRegistry::default(),
            custom_fields: CustomFields::new(),
        }
    }

    generate_set_and_with! {
        /// Replace the [`KeyTypeRegistry`] of this context.
        pub fn key_type_registry(mut self, registry: KeyTypeRegistry) -> Self {
            self.key_types = registry;
            self
        }
    }

    generate_set_and_with! {
        /// Replace the [`CustomFields`] registry of this context,
        /// e.g. to share one registry between contexts.
        pub fn custom_fields(mut self, custom_fields: CustomFields) -> Self {
            self.custom_fields = custom_fields;
            self
        }
    }

    #[must_use]
    pub fn key_type_registry(&self) -> &KeyTypeRegistry {
        &self.key_types
    }

    #[must_use]
    pub fn custom_fields(&self) -> &CustomFields {
        &self.custom_fields
    }

    /// Decode header field `name` as `T` in all headers decoded from now on.
    ///
    /// See [`CustomFields::register`].
    pub fn register_custom_field<T>(&self, name: impl Into<String>)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.custom_fields.register::<T>(name);
    }

    /// The algorithms permitted for the given key.
    pub fn algorithms_for(&self, key: &Key) -> Result<&[JWA], JWSError> {
        self.key_types.algorithms_for(key)
    }

    /// Get the cached [`Signer`] for the given algorithm,
    /// creating it if this is its first use.
    pub fn signer(&self, alg: JWA) -> Result<Arc<dyn Signer>, JWSError> {
        let mut signers = self.signers.lock();
        if let Some(signer) = signers.get(&alg) {
            return Ok(signer.clone());
        }

        tracing::debug!("no cached signer for {alg}: creating new signer");
        let signer = self.backend.new_signer(alg)?;
        signers.insert(alg, signer.clone());
        Ok(signer)
    }

    /// Create a new [`Verifier`] for the given algorithm.
    pub fn verifier(&self, alg: JWA) -> Result<Arc<dyn Verifier>, JWSError> {
        self.backend.new_verifier(alg)
    }

    /// Parse a JWS message, decoding registered custom header fields.
    ///
    /// See [`codec::parse`].
    pub fn parse(&self, buf: &[u8]) -> Result<Message, JWSError> {
        codec::parse_with_fields(buf, &self.custom_fields)
    }

    /// Parse a JWS message, decoding registered custom header fields.
    pub fn parse_str(&self, s: &str) -> Result<Message, JWSError> {
        self.parse(s.as_bytes())
    }

    /// Parse a JWS message from a reader, decoding registered custom header fields.
    ///
    /// See [`codec::parse_reader`].
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<Message, JWSError> {
        codec::parse_reader_with_fields(reader, &self.custom_fields)
    }

    pub(crate) fn key_types(&self) -> &KeyTypeRegistry {
        &self.key_types
    }
}

#[cfg(feature = "aws-lc")]
#[cfg_attr(docsrs, doc(cfg(feature = "aws-lc")))]
impl Default for JWSContext {
    fn default() -> Self {
        Self::new(crate::AwsLcBackend::new())
    }
}

impl fmt::Debug for JWSContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JWSContext")
            .field("backend", &self.backend)
            .field(
                "signers",
                &self.signers.lock().keys().copied().collect::<Vec<_>>(),
            )
            .field("key_types", &self.key_types)
            .field("custom_fields", &self.custom_fields)
            .finish()
    }
}
