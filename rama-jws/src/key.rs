use std::{fmt, sync::Arc};

use rama_utils::macros::generate_set_and_with;
use serde::{Deserialize, Serialize};

use crate::{JWA, KeyType};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
/// [`KeyUse`] identifies the intended use of a key
pub enum KeyUse {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUse {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signature => "sig",
            Self::Encryption => "enc",
        }
    }
}

impl fmt::Display for KeyUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
/// Encoded material of an asymmetric key.
pub enum AsymmetricKey {
    /// PKCS#8 (v1 or v2) DER encoded private key
    Private(Vec<u8>),
    /// Encoded public key
    ///
    /// - RSA: PKCS#1 `RSAPublicKey` DER
    /// - EC: uncompressed SEC1 point (`0x04 || x || y`)
    /// - OKP: the raw 32 byte public key
    Public(Vec<u8>),
}

impl AsymmetricKey {
    /// Returns true if this is private key material.
    #[must_use]
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// The raw encoded bytes of this key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Private(der) | Self::Public(der) => der,
        }
    }
}

impl fmt::Debug for AsymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print key material
        match self {
            Self::Private(der) => write!(f, "Private({} bytes)", der.len()),
            Self::Public(der) => write!(f, "Public({} bytes)", der.len()),
        }
    }
}

/// Key material as accepted by [`Signer`](crate::Signer)s and
/// [`Verifier`](crate::Verifier)s.
///
/// Raw keys are classified by their variant. Keys which know more about
/// themselves (a key id, an intended usage or algorithm) are passed as
/// [`Key::Opaque`] through the [`KeyCapability`] trait.
#[derive(Clone)]
pub enum Key {
    /// Symmetric secret, used for the HMAC family.
    Octet(Vec<u8>),
    Rsa(AsymmetricKey),
    Ec(AsymmetricKey),
    /// Ed25519 or X25519 key.
    Okp(AsymmetricKey),
    Opaque(Arc<dyn KeyCapability>),
}

impl Key {
    /// Create a [`Key::Opaque`] from the given [`KeyCapability`].
    pub fn opaque(key: impl KeyCapability + 'static) -> Self {
        Self::Opaque(Arc::new(key))
    }

    /// The [`KeyType`] of this key, `None` if an opaque key can't tell.
    #[must_use]
    pub fn key_type(&self) -> Option<KeyType> {
        match self {
            Self::Octet(_) => Some(KeyType::Octet),
            Self::Rsa(_) => Some(KeyType::RSA),
            Self::Ec(_) => Some(KeyType::EC),
            Self::Okp(_) => Some(KeyType::OKP),
            Self::Opaque(key) => key.key_type(),
        }
    }

    /// The key id (`kid`) of this key, only ever available for opaque keys.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Opaque(key) => key.key_id(),
            _ => None,
        }
    }

    /// The intended usage of this key, only ever available for opaque keys.
    #[must_use]
    pub fn key_usage(&self) -> Option<KeyUse> {
        match self {
            Self::Opaque(key) => key.key_usage(),
            _ => None,
        }
    }

    /// The algorithm this key is meant to be used with, only ever available for opaque keys.
    #[must_use]
    pub fn algorithm(&self) -> Option<JWA> {
        match self {
            Self::Opaque(key) => key.algorithm(),
            _ => None,
        }
    }

    /// Resolve opaque keys to the raw key material they wrap.
    ///
    /// Nested opaque keys are resolved until raw material is found.
    #[must_use]
    pub fn material(&self) -> &Self {
        let mut key = self;
        while let Self::Opaque(inner) = key {
            key = inner.key();
        }
        key
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Octet(secret) => write!(f, "Octet({} bytes)", secret.len()),
            Self::Rsa(key) => f.debug_tuple("Rsa").field(key).finish(),
            Self::Ec(key) => f.debug_tuple("Ec").field(key).finish(),
            Self::Okp(key) => f.debug_tuple("Okp").field(key).finish(),
            Self::Opaque(key) => f.debug_tuple("Opaque").field(key).finish(),
        }
    }
}

impl From<Vec<u8>> for Key {
    fn from(secret: Vec<u8>) -> Self {
        Self::Octet(secret)
    }
}

impl From<&[u8]> for Key {
    fn from(secret: &[u8]) -> Self {
        Self::Octet(secret.to_vec())
    }
}

/// A key object which can describe itself, such as a parsed JSON Web Key
/// or a handle to a key stored in hardware.
pub trait KeyCapability: fmt::Debug + Send + Sync {
    /// The type of the key, `None` if unknown.
    fn key_type(&self) -> Option<KeyType>;

    /// The key id (`kid`)
    fn key_id(&self) -> Option<&str> {
        None
    }

    /// The intended usage (`use`)
    fn key_usage(&self) -> Option<KeyUse> {
        None
    }

    /// The intended algorithm (`alg`)
    fn algorithm(&self) -> Option<JWA> {
        None
    }

    /// The underlying key material
    fn key(&self) -> &Key;
}

#[derive(Debug, Clone)]
/// [`KeyDescriptor`] attaches a key id, usage and algorithm to raw key material.
pub struct KeyDescriptor {
    key: Key,
    key_id: Option<String>,
    usage: Option<KeyUse>,
    algorithm: Option<JWA>,
}

impl KeyDescriptor {
    /// Describe the given [`Key`].
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            key,
            key_id: None,
            usage: None,
            algorithm: None,
        }
    }

    generate_set_and_with! {
        /// Attach the given key id (`kid`).
        pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
            self.key_id = Some(key_id.into());
            self
        }
    }

    generate_set_and_with! {
        /// Attach the intended usage (`use`).
        pub fn usage(mut self, usage: KeyUse) -> Self {
            self.usage = Some(usage);
            self
        }
    }

    generate_set_and_with! {
        /// Attach the intended algorithm (`alg`).
        pub fn algorithm(mut self, algorithm: JWA) -> Self {
            self.algorithm = Some(algorithm);
            self
        }
    }

    /// Wrap this descriptor into a [`Key::Opaque`].
    #[must_use]
    pub fn into_key(self) -> Key {
        Key::opaque(self)
    }
}

impl KeyCapability for KeyDescriptor {
    fn key_type(&self) -> Option<KeyType> {
        self.key.key_type()
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn key_usage(&self) -> Option<KeyUse> {
        self.usage
    }

    fn algorithm(&self) -> Option<JWA> {
        self.algorithm
    }

    fn key(&self) -> &Key {
        &self.key
    }
}

impl From<KeyDescriptor> for Key {
    fn from(descriptor: KeyDescriptor) -> Self {
        descriptor.into_key()
    }
}

/// An ordered, indexable collection of keys, such as a JWK set.
pub trait KeySet {
    /// Amount of keys in this set.
    fn len(&self) -> usize;

    /// Returns true if this set contains no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the key at the given index.
    fn get(&self, index: usize) -> Option<&Key>;
}

impl KeySet for [Key] {
    fn len(&self) -> usize {
        <[Key]>::len(self)
    }

    fn get(&self, index: usize) -> Option<&Key> {
        <[Key]>::get(self, index)
    }
}

impl KeySet for Vec<Key> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Option<&Key> {
        self.as_slice().get(index)
    }
}

impl<const N: usize> KeySet for [Key; N] {
    fn len(&self) -> usize {
        N
    }

    fn get(&self, index: usize) -> Option<&Key> {
        self.as_slice().get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_keys_expose_no_metadata() {
        let key = Key::from(b"secret".as_slice());
        assert_eq!(key.key_type(), Some(KeyType::Octet));
        assert_eq!(key.key_id(), None);
        assert_eq!(key.key_usage(), None);
        assert_eq!(key.algorithm(), None);
    }

    #[test]
    fn descriptor_exposes_metadata() {
        let key = KeyDescriptor::new(Key::Ec(AsymmetricKey::Public(vec![4; 65])))
            .with_key_id("ec-1")
            .with_usage(KeyUse::Signature)
            .with_algorithm(JWA::ES256)
            .into_key();

        assert_eq!(key.key_type(), Some(KeyType::EC));
        assert_eq!(key.key_id(), Some("ec-1"));
        assert_eq!(key.key_usage(), Some(KeyUse::Signature));
        assert_eq!(key.algorithm(), Some(JWA::ES256));
        assert!(matches!(key.material(), Key::Ec(AsymmetricKey::Public(_))));
    }

    #[test]
    fn nested_opaque_keys_resolve_to_material() {
        let inner = KeyDescriptor::new(Key::Octet(b"k".to_vec())).with_key_id("inner");
        let outer = KeyDescriptor::new(inner.into_key()).with_key_id("outer");
        let key = Key::from(outer);
        assert_eq!(key.key_id(), Some("outer"));
        assert!(matches!(key.material(), Key::Octet(secret) if secret == b"k"));
    }

    #[test]
    fn debug_does_not_leak_material() {
        let key = Key::Octet(b"super-secret".to_vec());
        let debug = format!("{key:?}");
        assert_eq!(debug, "Octet(12 bytes)");
    }

    #[test]
    fn key_set_over_vec_and_array() {
        let keys = vec![Key::Octet(b"a".to_vec()), Key::Octet(b"b".to_vec())];
        assert_eq!(KeySet::len(&keys), 2);
        assert!(KeySet::get(&keys, 1).is_some());
        assert!(KeySet::get(&keys, 2).is_none());

        let keys: [Key; 0] = [];
        assert!(KeySet::is_empty(&keys));
    }
}
