use std::borrow::Cow;

use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};

use crate::{ErrorKind, Headers, JWSError, codec};

#[derive(Debug, Clone, PartialEq, Eq)]
/// [`Signature`] is a single signature of a [`Message`], together
/// with the protected and unprotected headers that came with it.
pub struct Signature {
    protected: Headers,
    encoded_protected: Option<String>,
    public: Option<Headers>,
    signature: Vec<u8>,
}

impl Signature {
    /// Create a new, not yet signed, [`Signature`] with the given protected headers.
    #[must_use]
    pub fn new(protected: Headers) -> Self {
        Self {
            protected,
            encoded_protected: None,
            public: None,
            signature: Vec::new(),
        }
    }

    pub(crate) fn decoded(
        protected: Headers,
        encoded_protected: String,
        public: Option<Headers>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            protected,
            encoded_protected: Some(encoded_protected),
            public,
            signature,
        }
    }

    /// Attach unprotected headers, which are not covered by the signature.
    #[must_use]
    pub fn with_public_headers(mut self, public: Headers) -> Self {
        self.public = Some(public);
        self
    }

    /// Attach unprotected headers, which are not covered by the signature.
    pub fn set_public_headers(&mut self, public: Headers) -> &mut Self {
        self.public = Some(public);
        self
    }

    /// Headers covered by the signature.
    #[must_use]
    pub fn protected_headers(&self) -> &Headers {
        &self.protected
    }

    /// Headers not covered by the signature.
    #[must_use]
    pub fn public_headers(&self) -> Option<&Headers> {
        self.public.as_ref()
    }

    /// The protected headers, completed with the unprotected fields
    /// which are not protected.
    #[must_use]
    pub fn merged_headers(&self) -> Headers {
        let mut headers = self.protected.clone();
        if let Some(public) = &self.public {
            headers.merge_missing(public);
        }
        headers
    }

    /// Raw signature bytes, empty if not yet signed.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The `b64` header of the protected headers.
    #[must_use]
    pub fn b64(&self) -> bool {
        self.protected.b64()
    }

    /// The base64url encoded protected headers.
    ///
    /// For a parsed signature this is the segment exactly as it was received.
    pub fn protected_segment(&self) -> Result<Cow<'_, str>, JWSError> {
        match &self.encoded_protected {
            Some(encoded) => Ok(Cow::Borrowed(encoded)),
            None => Ok(Cow::Owned(encode_headers(&self.protected)?)),
        }
    }

    /// Encode the protected headers once, so that signing and
    /// serialization agree on the exact bytes.
    pub(crate) fn seal_protected(&mut self) -> Result<&str, JWSError> {
        let encoded = match self.encoded_protected.take() {
            Some(encoded) => encoded,
            None => encode_headers(&self.protected)?,
        };
        Ok(self.encoded_protected.insert(encoded).as_str())
    }

    pub(crate) fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }
}

fn encode_headers(headers: &Headers) -> Result<String, JWSError> {
    Ok(BASE64_URL_SAFE_NO_PAD.encode(headers.to_json()?))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// [`Message`] is a parsed, or about to be serialized, JWS: one payload and
/// one or more [`Signature`]s over it.
pub struct Message {
    payload: Vec<u8>,
    signatures: Vec<Signature>,
}

impl Message {
    /// Create a new [`Message`] from a payload and its signatures.
    pub fn new(payload: impl Into<Vec<u8>>, signatures: Vec<Signature>) -> Self {
        Self {
            payload: payload.into(),
            signatures,
        }
    }

    /// The payload, empty if the payload is detached.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    #[must_use]
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// The `b64` header which governs the payload encoding of the whole message.
    ///
    /// Taken from the first signature, `true` for a message without signatures.
    #[must_use]
    pub fn b64(&self) -> bool {
        self.signatures.first().is_none_or(Signature::b64)
    }

    pub(crate) fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
    }

    /// Serialize this message in compact form.
    ///
    /// Fails if the message does not carry exactly one signature.
    pub fn to_compact(&self) -> Result<Vec<u8>, JWSError> {
        let [signature] = self.signatures.as_slice() else {
            return Err(JWSError::new(
                ErrorKind::Serialize,
                format!(
                    "compact serialization requires exactly one signature, message has {}",
                    self.signatures.len()
                ),
            ));
        };
        codec::to_compact(signature, &self.payload, signature.b64())
    }

    /// Serialize this message in JSON form.
    pub fn to_json(&self) -> Result<Vec<u8>, JWSError> {
        codec::to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JWA;

    #[test]
    fn merged_headers_prefer_protected() {
        let signature = Signature::new(Headers::new().with_algorithm(JWA::HS256).with_key_id("a"))
            .with_public_headers(Headers::new().with_key_id("b").with_typ("JWT"));
        let headers = signature.merged_headers();
        assert_eq!(headers.key_id(), Some("a"));
        assert_eq!(headers.typ(), Some("JWT"));
        assert_eq!(headers.algorithm(), Some(JWA::HS256));
    }

    #[test]
    fn sealed_protected_segment_is_stable() {
        let mut signature = Signature::new(Headers::new().with_algorithm(JWA::HS256));
        let sealed = signature.seal_protected().unwrap().to_owned();
        assert_eq!(sealed, "eyJhbGciOiJIUzI1NiJ9");
        assert_eq!(signature.protected_segment().unwrap(), sealed);
        assert_eq!(signature.seal_protected().unwrap(), sealed);
    }

    #[test]
    fn message_b64_follows_first_signature() {
        assert!(Message::default().b64());

        let message = Message::new(
            "payload",
            vec![
                Signature::new(Headers::new().with_b64(false)),
                Signature::new(Headers::new()),
            ],
        );
        assert!(!message.b64());
    }

    #[test]
    fn compact_requires_single_signature() {
        let err = Message::new("payload", vec![]).to_compact().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialize);
    }
}
