//! Key-type/algorithm compatibility and custom header field registries.

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use rama_error::ErrorContext as _;

use crate::{
    ErrorKind, ErrorKindExt as _, Headers, JWA, JWSError, Key, KeyType, header::CustomValue,
};

#[derive(Debug, Clone)]
/// [`KeyTypeRegistry`] maps a [`KeyType`] to the algorithms permitted for it.
///
/// The default registry is populated with all algorithms of [`JWA`].
/// It is treated as immutable once handed to a [`JWSContext`](crate::JWSContext).
pub struct KeyTypeRegistry {
    algorithms: HashMap<KeyType, Vec<JWA>>,
}

impl Default for KeyTypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.add_algorithm(KeyType::OKP, JWA::EdDSA);
        for alg in [JWA::HS256, JWA::HS384, JWA::HS512] {
            registry.add_algorithm(KeyType::Octet, alg);
        }
        for alg in [
            JWA::RS256,
            JWA::RS384,
            JWA::RS512,
            JWA::PS256,
            JWA::PS384,
            JWA::PS512,
        ] {
            registry.add_algorithm(KeyType::RSA, alg);
        }
        for alg in [JWA::ES256, JWA::ES384, JWA::ES512] {
            registry.add_algorithm(KeyType::EC, alg);
        }
        registry
    }
}

impl KeyTypeRegistry {
    /// Create a registry which permits no algorithm for any key type.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            algorithms: HashMap::new(),
        }
    }

    /// Permit the given algorithm for the given key type.
    ///
    /// Algorithms are kept in insertion order, duplicates are ignored.
    pub fn add_algorithm(&mut self, key_type: KeyType, alg: JWA) -> &mut Self {
        let algorithms = self.algorithms.entry(key_type).or_default();
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
        self
    }

    /// Permit the given algorithm for the given key type.
    #[must_use]
    pub fn with_algorithm(mut self, key_type: KeyType, alg: JWA) -> Self {
        self.add_algorithm(key_type, alg);
        self
    }

    /// Classify the given key.
    ///
    /// Raw keys are classified by their variant, opaque keys
    /// by what they report about themselves.
    pub fn key_type_of(&self, key: &Key) -> Result<KeyType, JWSError> {
        key.key_type().ok_or_else(|| {
            JWSError::new(
                ErrorKind::UnsupportedKeyType,
                "key does not report its key type",
            )
        })
    }

    /// The algorithms permitted for the given key.
    pub fn algorithms_for(&self, key: &Key) -> Result<&[JWA], JWSError> {
        let key_type = self.key_type_of(key)?;
        self.algorithms_for_key_type(key_type)
    }

    /// The algorithms permitted for the given [`KeyType`].
    pub fn algorithms_for_key_type(&self, key_type: KeyType) -> Result<&[JWA], JWSError> {
        self.algorithms
            .get(&key_type)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                JWSError::new(
                    ErrorKind::UnsupportedKeyType,
                    format!("no algorithms registered for key type {key_type}"),
                )
            })
    }

    /// Ensure `alg` may be used with `key`.
    ///
    /// Opaque keys which cannot tell their key type are let through,
    /// it is up to the [`Signer`](crate::Signer) or [`Verifier`](crate::Verifier)
    /// to deal with those.
    pub fn check_compatible(&self, alg: JWA, key: &Key) -> Result<(), JWSError> {
        let Some(key_type) = key.key_type() else {
            return Ok(());
        };
        if self.algorithms_for_key_type(key_type)?.contains(&alg) {
            Ok(())
        } else {
            Err(JWSError::new(
                ErrorKind::UnsupportedAlgorithm,
                format!("algorithm {alg} can not be used with key type {key_type}"),
            ))
        }
    }
}

type DecodeFn = Arc<dyn Fn(&Value) -> Result<CustomValue, serde_json::Error> + Send + Sync>;

#[derive(Default, Clone)]
/// [`CustomFields`] registers the type private header fields decode into.
///
/// Once a field name is registered, every header decoded afterwards
/// through the owning [`JWSContext`](crate::JWSContext) exposes that field
/// as the registered type via [`Headers::custom`]. Registering a name
/// again replaces the previous registration. There is no way to unregister.
///
/// Registration and decoding may happen from different threads, but a
/// registration racing with the decoding of the same field name is not
/// ordered: the decode sees either the old or the new registration.
pub struct CustomFields {
    decoders: Arc<RwLock<HashMap<String, DecodeFn>>>,
}

impl CustomFields {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode field `name` as `T`.
    pub fn register<T>(&self, name: impl Into<String>)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.register_with(name, |value: &Value| T::deserialize(value));
    }

    /// Decode field `name` using the given decoder.
    pub fn register_with<T, F>(&self, name: impl Into<String>, decoder: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Value) -> Result<T, serde_json::Error> + Send + Sync + 'static,
    {
        let decoder: DecodeFn = Arc::new(move |value: &Value| {
            decoder(value).map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>)
        });
        self.decoders.write().insert(name.into(), decoder);
    }

    /// Returns true if a decoder is registered for `name`.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.decoders.read().contains_key(name)
    }

    /// Decode all registered fields present in `headers`.
    ///
    /// Decoders run without the registry lock held,
    /// so they are free to register fields themselves.
    pub(crate) fn apply(&self, headers: &mut Headers) -> Result<(), JWSError> {
        let pending: Vec<(String, DecodeFn)> = {
            let decoders = self.decoders.read();
            if decoders.is_empty() {
                return Ok(());
            }
            headers
                .iter()
                .filter_map(|(name, _)| {
                    decoders
                        .get(name)
                        .map(|decoder| (name.to_owned(), decoder.clone()))
                })
                .collect()
        };

        for (name, decoder) in pending {
            let Some(value) = headers.get(&name) else {
                continue;
            };
            let custom = decoder(value)
                .context("decode custom header")
                .context_str_field("header", name.as_str())
                .error_kind(ErrorKind::Decode)?;
            headers.insert_custom(name, custom);
        }
        Ok(())
    }
}

impl fmt::Debug for CustomFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFields")
            .field("fields", &self.decoders.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AsymmetricKey, KeyCapability};
    use serde::Deserialize;

    #[test]
    fn default_algorithms_per_key_type() {
        let registry = KeyTypeRegistry::default();

        let secret = Key::Octet(b"secret".to_vec());
        assert_eq!(
            registry.algorithms_for(&secret).unwrap(),
            &[JWA::HS256, JWA::HS384, JWA::HS512]
        );

        let rsa = Key::Rsa(AsymmetricKey::Public(vec![]));
        assert_eq!(
            registry.algorithms_for(&rsa).unwrap(),
            &[
                JWA::RS256,
                JWA::RS384,
                JWA::RS512,
                JWA::PS256,
                JWA::PS384,
                JWA::PS512
            ]
        );

        let ec = Key::Ec(AsymmetricKey::Public(vec![]));
        assert_eq!(
            registry.algorithms_for(&ec).unwrap(),
            &[JWA::ES256, JWA::ES384, JWA::ES512]
        );

        let okp = Key::Okp(AsymmetricKey::Public(vec![]));
        assert_eq!(registry.algorithms_for(&okp).unwrap(), &[JWA::EdDSA]);
    }

    #[derive(Debug)]
    struct Mystery(Key);

    impl KeyCapability for Mystery {
        fn key_type(&self) -> Option<KeyType> {
            None
        }

        fn key(&self) -> &Key {
            &self.0
        }
    }

    #[test]
    fn unknown_key_type_is_unsupported() {
        let registry = KeyTypeRegistry::default();
        let key = Key::opaque(Mystery(Key::Octet(vec![])));
        let err = registry.algorithms_for(&key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedKeyType);
        registry.check_compatible(JWA::HS256, &key).unwrap();
    }

    #[test]
    fn unregistered_key_type_is_unsupported() {
        let registry = KeyTypeRegistry::empty().with_algorithm(KeyType::Octet, JWA::HS256);
        let err = registry
            .algorithms_for(&Key::Okp(AsymmetricKey::Public(vec![])))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedKeyType);
    }

    #[test]
    fn incompatible_algorithm() {
        let registry = KeyTypeRegistry::default();
        let key = Key::Octet(b"secret".to_vec());
        registry.check_compatible(JWA::HS384, &key).unwrap();
        let err = registry.check_compatible(JWA::ES256, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    }

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct Birthday {
        year: u16,
        month: u8,
    }

    #[test]
    fn custom_fields_decode_registered_types() {
        let fields = CustomFields::new();
        fields.register::<Birthday>("x-birthday");
        assert!(fields.is_registered("x-birthday"));

        let mut headers = Headers::new()
            .try_with_header("x-birthday", serde_json::json!({"year": 1990, "month": 4}))
            .unwrap()
            .try_with_header("x-other", 42)
            .unwrap();
        fields.apply(&mut headers).unwrap();

        assert_eq!(
            headers.custom::<Birthday>("x-birthday"),
            Some(&Birthday {
                year: 1990,
                month: 4
            })
        );
        assert_eq!(headers.custom::<String>("x-birthday"), None);
        assert_eq!(headers.custom::<u64>("x-other"), None);
    }

    #[test]
    fn custom_fields_registration_overwrites() {
        let fields = CustomFields::new();
        fields.register::<String>("x-level");
        fields.register_with("x-level", |value: &Value| {
            u8::deserialize(value).map(|level| level * 2)
        });

        let mut headers = Headers::new().try_with_header("x-level", 21).unwrap();
        fields.apply(&mut headers).unwrap();
        assert_eq!(headers.custom::<u8>("x-level"), Some(&42));
    }

    #[test]
    fn custom_field_decode_failure() {
        let fields = CustomFields::new();
        fields.register::<Birthday>("x-birthday");
        let mut headers = Headers::new().try_with_header("x-birthday", "1990-04").unwrap();
        let err = fields.apply(&mut headers).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn decoder_may_register_fields() {
        let fields = CustomFields::new();
        let registry = fields.clone();
        fields.register_with("x-first", move |value: &Value| {
            registry.register::<u8>("x-second");
            u8::deserialize(value)
        });

        let mut headers = Headers::new().try_with_header("x-first", 1).unwrap();
        fields.apply(&mut headers).unwrap();
        assert_eq!(headers.custom::<u8>("x-first"), Some(&1));
        assert!(fields.is_registered("x-second"));
    }
}
