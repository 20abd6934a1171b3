//! Error types for rama jws.
//!
//! Every fallible operation in this crate returns a [`JWSError`]. The
//! [`ErrorKind`] tells you *what* went wrong, the optional source (reachable
//! through [`std::error::Error::source`]) tells you *why*.

use std::{borrow::Cow, fmt};

use crate::JWA;

#[doc(inline)]
pub use rama_error::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
/// The category of a [`JWSError`].
pub enum ErrorKind {
    /// Empty or whitespace-only input.
    InvalidInput,
    /// Compact serialization does not consist of three `.` delimited segments.
    MalformedSegments,
    /// A header, signature or JSON document could not be decoded.
    Decode,
    /// The key material is not of a known [`KeyType`](crate::KeyType).
    UnsupportedKeyType,
    /// The algorithm is unknown to the backend or not permitted for the key.
    UnsupportedAlgorithm,
    /// The `kid` of the protected header and of the key differ.
    KeyIdMismatch,
    /// A detached payload was supplied for a message which carries its own payload.
    AmbiguousPayload,
    /// The [`Signer`](crate::Signer) failed.
    SigningFailed,
    /// The signature of a compact message did not verify.
    VerificationFailed,
    /// None of the signatures of a JSON message verified.
    NoValidSignature,
    /// None of the keys of a [`KeySet`](crate::KeySet) verified the message.
    NoKeyVerified,
    /// The signature verified but the payload could not be base64url decoded.
    PayloadDecodeFailed,
    /// Multi-signing was requested without any signer.
    NoSigners,
    /// Reading from the underlying stream failed.
    Io,
    /// Headers or a message could not be encoded.
    Serialize,
}

impl ErrorKind {
    /// Short, stable, human readable name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid input",
            Self::MalformedSegments => "malformed segments",
            Self::Decode => "decode",
            Self::UnsupportedKeyType => "unsupported key type",
            Self::UnsupportedAlgorithm => "unsupported algorithm",
            Self::KeyIdMismatch => "key id mismatch",
            Self::AmbiguousPayload => "ambiguous payload",
            Self::SigningFailed => "signing failed",
            Self::VerificationFailed => "verification failed",
            Self::NoValidSignature => "no valid signature",
            Self::NoKeyVerified => "no key verified",
            Self::PayloadDecodeFailed => "payload decode failed",
            Self::NoSigners => "no signers",
            Self::Io => "io",
            Self::Serialize => "serialize",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by all jws operations.
pub struct JWSError {
    kind: ErrorKind,
    context: Cow<'static, str>,
    signer: Option<(usize, JWA)>,
    source: Option<BoxError>,
}

impl JWSError {
    /// Create a new [`JWSError`] of the given kind with a context message.
    pub fn new(kind: ErrorKind, context: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            context: context.into(),
            signer: None,
            source: None,
        }
    }

    /// Create a new [`JWSError`] of the given kind caused by `source`.
    ///
    /// Context is expected to live on the source,
    /// see [`rama_error::ErrorContext`].
    pub fn from_source(kind: ErrorKind, source: impl Into<BoxError>) -> Self {
        Self::new(kind, "").with_source(source)
    }

    /// Attach the underlying cause to this [`JWSError`].
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn with_failed_signer(mut self, index: usize, algorithm: JWA) -> Self {
        self.signer = Some((index, algorithm));
        self
    }

    /// The [`ErrorKind`] of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error is of the given [`ErrorKind`].
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Index (in caller order) and algorithm of the signer that failed
    /// during multi-signing, if this error originates from one.
    #[must_use]
    pub fn failed_signer(&self) -> Option<(usize, JWA)> {
        self.signer
    }
}

impl fmt::Debug for JWSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JWSError")
            .field("kind", &self.kind)
            .field("context", &self.context)
            .field("signer", &self.signer)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for JWSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.context.is_empty() {
            write!(f, ": {}", self.context)?;
        }
        if let Some((index, alg)) = self.signer {
            write!(f, " (signer #{index}, alg={alg})")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for JWSError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Classify an error, usually one enriched through
/// [`rama_error::ErrorContext`], as a [`JWSError`] of the given kind.
pub(crate) trait ErrorKindExt<T> {
    fn error_kind(self, kind: ErrorKind) -> Result<T, JWSError>;
}

impl<T, E> ErrorKindExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn error_kind(self, kind: ErrorKind) -> Result<T, JWSError> {
        self.map_err(|err| JWSError::from_source(kind, err))
    }
}
