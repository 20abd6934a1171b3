use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use rama_error::ErrorContext as _;
use rama_utils::macros::generate_set_and_with;

use crate::{ErrorKind, ErrorKindExt as _, JWA, JWSError};

pub const ALGORITHM: &str = "alg";
pub const JWK_SET_URL: &str = "jku";
pub const JWK: &str = "jwk";
pub const KEY_ID: &str = "kid";
pub const X509_URL: &str = "x5u";
pub const X509_CERT_CHAIN: &str = "x5c";
pub const X509_CERT_THUMBPRINT: &str = "x5t";
pub const X509_CERT_THUMBPRINT_S256: &str = "x5t#S256";
pub const TYPE: &str = "typ";
pub const CONTENT_TYPE: &str = "cty";
pub const CRITICAL: &str = "crit";
/// Unencoded payload option as defined in [`rfc7797`]
///
/// [`rfc7797`]: https://datatracker.ietf.org/doc/html/rfc7797
pub const BASE64_ENCODE_PAYLOAD: &str = "b64";

/// A decoded custom header value, see [`CustomFields`](crate::CustomFields).
pub(crate) type CustomValue = Arc<dyn Any + Send + Sync>;

#[derive(Default, Clone)]
/// [`Headers`] store protected or unprotected JOSE header fields
/// as JSON values.
///
/// Fields registered with [`CustomFields`](crate::CustomFields) are also
/// available in their decoded form through [`Headers::custom`].
pub struct Headers {
    fields: Map<String, Value>,
    custom: HashMap<String, CustomValue>,
}

impl Headers {
    /// Create a new empty header map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Set provided header in the header map
        ///
        /// Warning: this function will replace already existing headers
        pub fn header(
            mut self,
            name: impl Into<String>,
            value: impl Serialize,
        ) -> Result<Self, JWSError> {
            let name = name.into();
            let value = serde_json::to_value(value)
                .context("convert header to value")
                .context_str_field("header", name.as_str())
                .error_kind(ErrorKind::Serialize)?;
            self.custom.remove(&name);
            self.fields.insert(name, value);
            Ok(self)
        }
    }

    generate_set_and_with! {
        /// Set provided headers in the header map
        ///
        /// Warning: this function will replace already existing headers
        pub fn headers(mut self, headers: impl Serialize) -> Result<Self, JWSError> {
            let headers = serde_json::to_value(headers)
                .context("convert headers to serde json value")
                .error_kind(ErrorKind::Serialize)?;

            let Value::Object(headers) = headers else {
                return Err(JWSError::new(
                    ErrorKind::Serialize,
                    "can only set multiple headers if input is key value object",
                ));
            };

            for (name, value) in headers {
                self.custom.remove(&name);
                self.fields.insert(name, value);
            }
            Ok(self)
        }
    }

    /// Get the raw JSON value of a header field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get the decoded value of a field registered with
    /// [`CustomFields`](crate::CustomFields).
    ///
    /// Returns `None` if the field is absent, was not registered
    /// when these headers were decoded, or was registered as another type.
    #[must_use]
    pub fn custom<T: Any>(&self, name: &str) -> Option<&T> {
        self.custom.get(name)?.downcast_ref()
    }

    /// Remove a header field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.custom.remove(name);
        self.fields.remove(name)
    }

    /// Returns true if the given header field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate over all header fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add all fields of `other` which are not yet present in `self`.
    pub fn merge_missing(&mut self, other: &Self) {
        for (name, value) in &other.fields {
            if !self.fields.contains_key(name) {
                self.fields.insert(name.clone(), value.clone());
                if let Some(custom) = other.custom.get(name) {
                    self.custom.insert(name.clone(), custom.clone());
                }
            }
        }
    }

    /// Try decode headers to the provided `T`
    pub fn decode<'de, 'a: 'de, T>(&'a self) -> Result<T, JWSError>
    where
        T: Deserialize<'de>,
    {
        T::deserialize(&self.fields)
            .context("deserialize headers into T")
            .error_kind(ErrorKind::Decode)
    }

    /// The `alg` header, `None` if absent or not a known algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Option<JWA> {
        self.str_field(ALGORITHM)?.parse().ok()
    }

    generate_set_and_with! {
        /// Set the `alg` header
        pub fn algorithm(mut self, algorithm: JWA) -> Self {
            self.set_str_field(ALGORITHM, algorithm.as_str());
            self
        }
    }

    /// The `kid` header
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.str_field(KEY_ID)
    }

    generate_set_and_with! {
        /// Set the `kid` header
        pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
            self.set_str_field(KEY_ID, key_id);
            self
        }
    }

    /// The `typ` header
    #[must_use]
    pub fn typ(&self) -> Option<&str> {
        self.str_field(TYPE)
    }

    generate_set_and_with! {
        /// Set the `typ` header
        pub fn typ(mut self, typ: impl Into<String>) -> Self {
            self.set_str_field(TYPE, typ);
            self
        }
    }

    /// The `cty` header
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.str_field(CONTENT_TYPE)
    }

    generate_set_and_with! {
        /// Set the `cty` header
        pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
            self.set_str_field(CONTENT_TYPE, content_type);
            self
        }
    }

    /// The `jku` header
    #[must_use]
    pub fn jwk_set_url(&self) -> Option<&str> {
        self.str_field(JWK_SET_URL)
    }

    /// The `jwk` header, as raw JSON object
    #[must_use]
    pub fn jwk(&self) -> Option<&Map<String, Value>> {
        self.fields.get(JWK)?.as_object()
    }

    /// The `x5u` header
    #[must_use]
    pub fn x509_url(&self) -> Option<&str> {
        self.str_field(X509_URL)
    }

    /// The `x5c` header, base64 (not url) encoded DER certificates
    #[must_use]
    pub fn x509_cert_chain(&self) -> Option<Vec<&str>> {
        self.str_list_field(X509_CERT_CHAIN)
    }

    /// The `x5t` header
    #[must_use]
    pub fn x509_cert_thumbprint(&self) -> Option<&str> {
        self.str_field(X509_CERT_THUMBPRINT)
    }

    /// The `x5t#S256` header
    #[must_use]
    pub fn x509_cert_thumbprint_s256(&self) -> Option<&str> {
        self.str_field(X509_CERT_THUMBPRINT_S256)
    }

    /// The `crit` header
    #[must_use]
    pub fn critical(&self) -> Option<Vec<&str>> {
        self.str_list_field(CRITICAL)
    }

    generate_set_and_with! {
        /// Set the `crit` header, replacing any previous value
        pub fn critical(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
            let names = names
                .into_iter()
                .map(|name| Value::String(name.into()))
                .collect();
            self.custom.remove(CRITICAL);
            self.fields.insert(CRITICAL.to_owned(), Value::Array(names));
            self
        }
    }

    /// The `b64` header.
    ///
    /// Defaults to `true` when absent. A present value which is
    /// not a boolean is treated as `false`.
    #[must_use]
    pub fn b64(&self) -> bool {
        match self.fields.get(BASE64_ENCODE_PAYLOAD) {
            None => true,
            Some(value) => value.as_bool().unwrap_or(false),
        }
    }

    generate_set_and_with! {
        /// Set the `b64` header
        pub fn b64(mut self, b64: bool) -> Self {
            self.custom.remove(BASE64_ENCODE_PAYLOAD);
            self.fields
                .insert(BASE64_ENCODE_PAYLOAD.to_owned(), Value::Bool(b64));
            self
        }
    }

    /// Encode these headers as JSON.
    pub(crate) fn to_json(&self) -> Result<Vec<u8>, JWSError> {
        serde_json::to_vec(&self.fields)
            .context("encode headers to json")
            .error_kind(ErrorKind::Serialize)
    }

    pub(crate) fn from_map(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            custom: HashMap::new(),
        }
    }

    pub(crate) fn insert_custom(&mut self, name: String, value: CustomValue) {
        self.custom.insert(name, value);
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)?.as_str()
    }

    fn str_list_field(&self, name: &str) -> Option<Vec<&str>> {
        self.fields
            .get(name)?
            .as_array()?
            .iter()
            .map(Value::as_str)
            .collect()
    }

    fn set_str_field(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.custom.remove(name);
        self.fields
            .insert(name.to_owned(), Value::String(value.into()));
        self
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Headers")
            .field("fields", &self.fields)
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Headers {}

impl Serialize for Headers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Map::deserialize(deserializer).map(Self::from_map)
    }
}

impl From<Map<String, Value>> for Headers {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct AcmeProtected {
        alg: String,
        nonce: String,
    }

    #[test]
    fn b64_defaults_to_true() {
        let mut headers = Headers::new();
        assert!(headers.b64());
        headers.set_b64(false);
        assert!(!headers.b64());
        headers.try_set_header("b64", "false").unwrap();
        assert!(!headers.b64());
        headers.set_b64(true);
        assert!(headers.b64());
    }

    #[test]
    fn well_known_fields() {
        let headers = Headers::new()
            .with_algorithm(JWA::ES256)
            .with_key_id("key-1")
            .with_typ("JOSE")
            .with_content_type("application/json")
            .with_critical(["b64"])
            .try_with_header(X509_CERT_CHAIN, ["MIIB", "MIIC"])
            .unwrap();

        assert_eq!(headers.algorithm(), Some(JWA::ES256));
        assert_eq!(headers.key_id(), Some("key-1"));
        assert_eq!(headers.typ(), Some("JOSE"));
        assert_eq!(headers.content_type(), Some("application/json"));
        assert_eq!(headers.critical(), Some(vec!["b64"]));
        assert_eq!(headers.x509_cert_chain(), Some(vec!["MIIB", "MIIC"]));
        assert_eq!(headers.jwk_set_url(), None);
        assert_eq!(headers.len(), 6);
    }

    #[test]
    fn unknown_algorithm_reads_as_none() {
        let headers = Headers::new().try_with_header(ALGORITHM, "none").unwrap();
        assert_eq!(headers.algorithm(), None);
        assert!(headers.contains(ALGORITHM));
    }

    #[test]
    fn set_multiple_headers_and_decode() {
        let headers = Headers::new()
            .try_with_headers(AcmeProtected {
                alg: "ES256".to_owned(),
                nonce: "random".to_owned(),
            })
            .unwrap();
        let decoded: AcmeProtected = headers.decode().unwrap();
        assert_eq!(decoded.nonce, "random");
        assert_eq!(headers.algorithm(), Some(JWA::ES256));

        let err = Headers::new().try_with_headers("not a map").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialize);
    }

    #[test]
    fn merge_missing_keeps_existing_values() {
        let mut protected = Headers::new().with_key_id("protected");
        let public = Headers::new().with_key_id("public").with_typ("JWT");
        protected.merge_missing(&public);
        assert_eq!(protected.key_id(), Some("protected"));
        assert_eq!(protected.typ(), Some("JWT"));
    }

    #[test]
    fn serializes_as_plain_object() {
        let headers = Headers::new().with_algorithm(JWA::HS256);
        assert_eq!(serde_json::to_string(&headers).unwrap(), r#"{"alg":"HS256"}"#);
        let decoded: Headers = serde_json::from_str(r#"{"alg":"HS256"}"#).unwrap();
        assert_eq!(decoded, headers);
    }
}
