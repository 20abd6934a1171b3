use std::borrow::Cow;

use rama_error::ErrorContext as _;
use rama_utils::macros::generate_set_and_with;

use crate::{
    ErrorKind, ErrorKindExt as _, Headers, JWA, JWSContext, JWSError, Key, KeySet, KeyUse,
    Message, Signature, Verifier,
    codec::{self, decode_protected, decode_segment, join_segments, payload_representation},
    header::ALGORITHM,
};

#[derive(Debug, Clone, Default)]
/// Options for [`JWSContext::verify`] and friends.
pub struct VerifyOptions {
    detached_payload: Option<Vec<u8>>,
}

impl VerifyOptions {
    /// Create new default [`VerifyOptions`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Verify against this payload, for a message which does not carry one.
        pub fn detached_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
            self.detached_payload = Some(payload.into());
            self
        }
    }

    #[must_use]
    pub fn detached_payload(&self) -> Option<&[u8]> {
        self.detached_payload.as_deref()
    }
}

#[derive(Debug, Clone)]
/// Result of [`JWSContext::verify_detailed`].
pub struct VerifiedMessage {
    payload: Vec<u8>,
    message: Message,
    signature_index: usize,
}

impl VerifiedMessage {
    /// The authenticated payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// The parsed message, with the detached payload filled in if one was used.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Index of the signature which verified.
    #[must_use]
    pub fn signature_index(&self) -> usize {
        self.signature_index
    }

    /// The signature which verified.
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        self.message.signatures().get(self.signature_index)
    }
}

impl JWSContext {
    /// Verify a compact or JSON serialized message with `alg` and `key`,
    /// returning the authenticated payload.
    ///
    /// See [`JWSContext::verify_detailed`] for the rules applied. Note that
    /// trailing segments after the signature of a compact message are ignored.
    pub fn verify(
        &self,
        buf: &[u8],
        alg: JWA,
        key: &Key,
        options: &VerifyOptions,
    ) -> Result<Vec<u8>, JWSError> {
        self.verify_detailed(buf, alg, key, options)
            .map(VerifiedMessage::into_payload)
    }

    /// Verify a compact or JSON serialized message with `alg` and `key`.
    ///
    /// Compact messages:
    ///
    /// - only the first three `.` delimited segments are read, anything
    ///   after a third `.` is ignored and not covered by the signature;
    /// - a `kid` header which differs from the key id of `key` fails with
    ///   [`ErrorKind::KeyIdMismatch`];
    /// - an empty payload segment is replaced by the detached payload, a detached
    ///   payload for a non-empty payload segment fails with [`ErrorKind::AmbiguousPayload`];
    /// - a payload which can not be decoded after the signature verified fails
    ///   with [`ErrorKind::PayloadDecodeFailed`].
    ///
    /// JSON messages: signatures are tried in order and the first one that
    /// verifies wins. Signatures with a mismatching `kid` or `alg` are skipped.
    /// The payload encoding is decided once, by the `b64` header of the first
    /// signature. Fails with [`ErrorKind::NoValidSignature`] if none verified.
    pub fn verify_detailed(
        &self,
        buf: &[u8],
        alg: JWA,
        key: &Key,
        options: &VerifyOptions,
    ) -> Result<VerifiedMessage, JWSError> {
        let buf = codec::trim_space(buf);
        if buf.is_empty() {
            return Err(JWSError::new(
                ErrorKind::InvalidInput,
                "empty or whitespace only input",
            ));
        }

        self.key_types().check_compatible(alg, key)?;
        let verifier = self.verifier(alg)?;

        if buf.first() == Some(&b'{') {
            self.verify_json(buf, alg, verifier.as_ref(), key, options)
        } else {
            self.verify_compact(buf, alg, verifier.as_ref(), key, options)
        }
    }

    fn verify_compact(
        &self,
        buf: &[u8],
        alg: JWA,
        verifier: &dyn Verifier,
        key: &Key,
        options: &VerifyOptions,
    ) -> Result<VerifiedMessage, JWSError> {
        let (protected, payload, signature) = codec::split_compact(buf)?;
        let (headers, encoded) = decode_protected(protected, self.custom_fields())?;

        if let (Some(expected), Some(found)) = (key.key_id(), headers.key_id())
            && expected != found
        {
            return Err(JWSError::new(
                ErrorKind::KeyIdMismatch,
                format!("key id '{expected}' does not match kid header '{found}'"),
            ));
        }
        if headers.contains(ALGORITHM) && headers.algorithm() != Some(alg) {
            return Err(JWSError::new(
                ErrorKind::VerificationFailed,
                format!("alg header does not match expected algorithm {alg}"),
            ));
        }

        let b64 = headers.b64();
        let (payload_segment, detached) = match options.detached_payload() {
            Some(_) if !payload.is_empty() => {
                return Err(JWSError::new(
                    ErrorKind::AmbiguousPayload,
                    "detached payload given for a message which carries a payload",
                ));
            }
            Some(detached) => (payload_representation(detached, b64), Some(detached)),
            None => (Cow::Borrowed(payload), None),
        };

        let signature = decode_segment(signature)
            .context("decode signature")
            .error_kind(ErrorKind::Decode)?;
        let input = join_segments(protected, &payload_segment);
        verifier
            .verify(&input, &signature, key)
            .context("verify compact signature")
            .error_kind(ErrorKind::VerificationFailed)?;

        let payload = match detached {
            Some(detached) => detached.to_vec(),
            None if b64 => decode_segment(payload)
                .context("decode verified payload")
                .error_kind(ErrorKind::PayloadDecodeFailed)?,
            None => payload.to_vec(),
        };

        Ok(VerifiedMessage {
            message: Message::new(
                payload.clone(),
                vec![Signature::decoded(headers, encoded, None, signature)],
            ),
            payload,
            signature_index: 0,
        })
    }

    fn verify_json(
        &self,
        buf: &[u8],
        alg: JWA,
        verifier: &dyn Verifier,
        key: &Key,
        options: &VerifyOptions,
    ) -> Result<VerifiedMessage, JWSError> {
        let mut message = codec::parse_json(buf, self.custom_fields())?;

        if let Some(detached) = options.detached_payload() {
            if !message.payload().is_empty() {
                return Err(JWSError::new(
                    ErrorKind::AmbiguousPayload,
                    "detached payload given for a message which carries a payload",
                ));
            }
            message.set_payload(detached.to_vec());
        }

        let payload_segment = payload_representation(message.payload(), message.b64());

        let mut verified = None;
        for (index, signature) in message.signatures().iter().enumerate() {
            let protected = signature.protected_headers();
            let public = signature.public_headers();

            let kid = protected
                .key_id()
                .or_else(|| public.and_then(Headers::key_id));
            if let (Some(expected), Some(found)) = (key.key_id(), kid)
                && expected != found
            {
                tracing::trace!("skip signature #{index}: kid '{found}' does not match key");
                continue;
            }
            if protected.contains(ALGORITHM) && protected.algorithm() != Some(alg) {
                tracing::trace!("skip signature #{index}: alg does not match {alg}");
                continue;
            }

            let input = join_segments(
                signature.protected_segment()?.as_bytes(),
                &payload_segment,
            );
            match verifier.verify(&input, signature.signature(), key) {
                Ok(()) => {
                    verified = Some(index);
                    break;
                }
                Err(err) => {
                    tracing::trace!("signature #{index} did not verify: {err}");
                }
            }
        }

        match verified {
            Some(signature_index) => Ok(VerifiedMessage {
                payload: message.payload().to_vec(),
                message,
                signature_index,
            }),
            None => Err(JWSError::new(
                ErrorKind::NoValidSignature,
                "could not verify message using any of the signatures or keys",
            )),
        }
    }

    /// Verify a message with the keys of a [`KeySet`], in order.
    ///
    /// Keys without an algorithm and keys meant for another use than
    /// signatures are skipped. Each remaining key is tried with its own
    /// algorithm, the payload of the first success is returned.
    pub fn verify_with_key_set<K>(
        &self,
        buf: &[u8],
        keys: &K,
        options: &VerifyOptions,
    ) -> Result<Vec<u8>, JWSError>
    where
        K: KeySet + ?Sized,
    {
        if codec::trim_space(buf).is_empty() {
            return Err(JWSError::new(
                ErrorKind::InvalidInput,
                "empty or whitespace only input",
            ));
        }

        for index in 0..keys.len() {
            let Some(key) = keys.get(index) else {
                continue;
            };
            let Some(alg) = key.algorithm() else {
                tracing::trace!("skip key #{index}: no algorithm");
                continue;
            };
            if let Some(usage) = key.key_usage()
                && usage != KeyUse::Signature
            {
                tracing::trace!("skip key #{index}: use is {usage}");
                continue;
            }

            match self.verify(buf, alg, key, options) {
                Ok(payload) => return Ok(payload),
                Err(err) => tracing::trace!("key #{index} ({alg}) did not verify: {err}"),
            }
        }

        Err(JWSError::new(
            ErrorKind::NoKeyVerified,
            "could not verify message with any of the keys",
        ))
    }
}
