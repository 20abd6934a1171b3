//! Compact and JSON (de)serialization of JWS messages.
//!
//! The compact form is three base64url segments separated by `.`:
//!
//! ```text
//! BASE64URL(protected) "." BASE64URL(payload) "." BASE64URL(signature)
//! ```
//!
//! When the protected header carries `"b64": false` the payload segment holds
//! the raw payload instead. The JSON form is either the general serialization
//! (a `signatures` array) or, for a single signature, the flattened one.

use std::{
    borrow::Cow,
    io::{self, BufRead, BufReader, Read},
};

use base64::prelude::{BASE64_STANDARD_NO_PAD, BASE64_URL_SAFE_NO_PAD, Engine as _};
use rama_error::ErrorContext as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CustomFields, ErrorKind, ErrorKindExt as _, Headers, JWSError, Message, Signature};

/// Chunk size used by [`split_compact_stream`].
pub const STREAM_CHUNK_SIZE: usize = 4096;

/// The three segments of a compact serialization: protected header, payload and signature.
pub type CompactSegments<T> = (T, T, T);

/// Parse a JWS message in compact or JSON serialization.
///
/// The format is sniffed from the first non-whitespace character:
/// `{` selects the JSON form, anything else the compact form.
pub fn parse(buf: &[u8]) -> Result<Message, JWSError> {
    parse_with_fields(buf, &CustomFields::new())
}

/// Parse a JWS message in compact or JSON serialization.
pub fn parse_str(s: &str) -> Result<Message, JWSError> {
    parse(s.as_bytes())
}

/// Parse a JWS message from a reader.
///
/// A compact message is split with [`split_compact_stream`],
/// a JSON message is decoded straight from the reader.
pub fn parse_reader<R: Read>(reader: R) -> Result<Message, JWSError> {
    parse_reader_with_fields(reader, &CustomFields::new())
}

pub(crate) fn parse_with_fields(buf: &[u8], fields: &CustomFields) -> Result<Message, JWSError> {
    let buf = trim_space(buf);
    match buf.first() {
        None => Err(JWSError::new(
            ErrorKind::InvalidInput,
            "empty or whitespace only input",
        )),
        Some(b'{') => {
            tracing::trace!("parse jws message in json serialization");
            parse_json(buf, fields)
        }
        Some(_) => {
            tracing::trace!("parse jws message in compact serialization");
            let (protected, payload, signature) = split_compact(buf)?;
            decode_compact(protected, payload, signature, fields)
        }
    }
}

pub(crate) fn parse_reader_with_fields<R: Read>(
    reader: R,
    fields: &CustomFields,
) -> Result<Message, JWSError> {
    let mut reader = BufReader::new(reader);
    // bytes of a character split over two reads
    let mut pending = Vec::with_capacity(4);

    let first = loop {
        let buf = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(JWSError::new(ErrorKind::Io, "read jws message").with_source(err));
            }
        };
        if buf.is_empty() {
            if pending.is_empty() {
                return Err(JWSError::new(
                    ErrorKind::InvalidInput,
                    "empty or whitespace only input",
                ));
            }
            break char::REPLACEMENT_CHARACTER;
        }

        if !pending.is_empty() {
            pending.push(buf[0]);
            reader.consume(1);
            match std::str::from_utf8(&pending) {
                Ok(s) if s.chars().all(char::is_whitespace) => pending.clear(),
                Ok(s) => break s.chars().next().unwrap_or(char::REPLACEMENT_CHARACTER),
                Err(err) if err.error_len().is_none() => (),
                Err(_) => break char::REPLACEMENT_CHARACTER,
            }
            continue;
        }

        match first_non_space(buf) {
            Sniff::Found(offset, first) => {
                reader.consume(offset);
                break first;
            }
            Sniff::Incomplete(offset) => {
                pending.extend_from_slice(&buf[offset..]);
                let len = buf.len();
                reader.consume(len);
            }
            Sniff::Space => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    };

    if first == '{' {
        tracing::trace!("parse jws message in json serialization from reader");
        let message: JsonMessage = serde_json::from_reader(reader)
            .context("decode json message")
            .error_kind(ErrorKind::Decode)?;
        message.into_message(fields)
    } else {
        tracing::trace!("parse jws message in compact serialization from reader");
        let (protected, payload, signature) =
            split_compact_stream(pending.as_slice().chain(reader))?;
        decode_compact(&protected, &payload, trim_space_end(&signature), fields)
    }
}

pub(crate) fn parse_json(buf: &[u8], fields: &CustomFields) -> Result<Message, JWSError> {
    let message: JsonMessage = serde_json::from_slice(buf)
        .context("decode json message")
        .error_kind(ErrorKind::Decode)?;
    message.into_message(fields)
}

/// Strip leading and trailing (unicode) whitespace.
///
/// Invalid UTF-8 is never stripped.
pub(crate) fn trim_space(buf: &[u8]) -> &[u8] {
    match first_non_space(buf) {
        Sniff::Found(offset, _) | Sniff::Incomplete(offset) => trim_space_end(&buf[offset..]),
        Sniff::Space => &[],
    }
}

/// Strip trailing (unicode) whitespace.
fn trim_space_end(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    'trim: while end > 0 {
        // the shortest valid suffix is exactly one character
        for width in 1..=end.min(4) {
            if let Ok(s) = std::str::from_utf8(&buf[end - width..end]) {
                if !s.chars().all(char::is_whitespace) {
                    break 'trim;
                }
                end -= width;
                continue 'trim;
            }
        }
        break;
    }
    &buf[..end]
}

enum Sniff {
    /// Byte offset and value of the first non-whitespace character.
    /// Invalid UTF-8 is reported as [`char::REPLACEMENT_CHARACTER`].
    Found(usize, char),
    /// Whitespace up to the offset, followed by a truncated UTF-8
    /// sequence at the end of the buffer.
    Incomplete(usize),
    /// Whitespace only.
    Space,
}

fn first_non_space(buf: &[u8]) -> Sniff {
    let mut offset = 0;
    for chunk in buf.utf8_chunks() {
        for (index, c) in chunk.valid().char_indices() {
            if !c.is_whitespace() {
                return Sniff::Found(offset + index, c);
            }
        }
        offset += chunk.valid().len();
        let invalid = chunk.invalid();
        if !invalid.is_empty() {
            let truncated = offset + invalid.len() == buf.len()
                && std::str::from_utf8(invalid).is_err_and(|err| err.error_len().is_none());
            return if truncated {
                Sniff::Incomplete(offset)
            } else {
                Sniff::Found(offset, char::REPLACEMENT_CHARACTER)
            };
        }
    }
    Sniff::Space
}

/// Split a compact serialization into its three segments.
///
/// Fails with [`ErrorKind::MalformedSegments`] if fewer than three
/// segments are found, segments beyond the third are ignored.
pub fn split_compact(buf: &[u8]) -> Result<CompactSegments<&[u8]>, JWSError> {
    let mut segments = buf.splitn(4, |b| *b == b'.');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(protected), Some(payload), Some(signature)) => Ok((protected, payload, signature)),
        _ => Err(JWSError::new(
            ErrorKind::MalformedSegments,
            "compact serialization requires 3 segments",
        )),
    }
}

/// Split a compact serialization read from a stream into its three segments.
///
/// The reader is consumed in chunks of [`STREAM_CHUNK_SIZE`] bytes,
/// only the segments themselves are kept in memory. Fails with
/// [`ErrorKind::MalformedSegments`] unless exactly two `.` are found.
pub fn split_compact_stream<R: Read>(reader: R) -> Result<CompactSegments<Vec<u8>>, JWSError> {
    split_compact_stream_with_chunk_size(reader, STREAM_CHUNK_SIZE)
}

/// Same as [`split_compact_stream`] but reads in chunks of the given size.
///
/// A chunk size of zero is treated as one.
pub fn split_compact_stream_with_chunk_size<R: Read>(
    mut reader: R,
    chunk_size: usize,
) -> Result<CompactSegments<Vec<u8>>, JWSError> {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut segments: [Vec<u8>; 3] = Default::default();
    let mut state = 0;
    let mut periods = 0usize;

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(
                    JWSError::new(ErrorKind::Io, "unexpected end of input").with_source(err)
                );
            }
        };

        let mut rest = &chunk[..n];
        while let Some(index) = memchr::memchr(b'.', rest) {
            segments[state].extend_from_slice(&rest[..index]);
            periods += 1;
            if state < 2 {
                state += 1;
            } else {
                // already invalid, keep memory bounded
                segments[2].clear();
            }
            rest = &rest[index + 1..];
        }
        segments[state].extend_from_slice(rest);
    }

    if periods != 2 {
        return Err(JWSError::new(
            ErrorKind::MalformedSegments,
            format!("compact serialization requires exactly 2 periods, found {periods}"),
        ));
    }

    let [protected, payload, signature] = segments;
    Ok((protected, payload, signature))
}

fn decode_compact(
    protected: &[u8],
    payload: &[u8],
    signature: &[u8],
    fields: &CustomFields,
) -> Result<Message, JWSError> {
    let (headers, encoded) = decode_protected(protected, fields)?;
    let payload = if headers.b64() {
        decode_segment(payload)
            .context("decode payload")
            .error_kind(ErrorKind::Decode)?
    } else {
        payload.to_vec()
    };
    let signature = decode_segment(signature)
        .context("decode signature")
        .error_kind(ErrorKind::Decode)?;
    Ok(Message::new(
        payload,
        vec![Signature::decoded(headers, encoded, None, signature)],
    ))
}

/// Decode a base64url encoded protected header segment.
///
/// Returns the headers and the segment as a string, which is kept
/// around to reconstruct the signing input.
pub(crate) fn decode_protected(
    segment: &[u8],
    fields: &CustomFields,
) -> Result<(Headers, String), JWSError> {
    let encoded = std::str::from_utf8(segment)
        .context("protected header is not valid utf-8")
        .error_kind(ErrorKind::Decode)?
        .to_owned();
    let json = decode_segment(segment)
        .context("decode protected header")
        .error_kind(ErrorKind::Decode)?;
    let map: Map<String, Value> = serde_json::from_slice(&json)
        .context("parse protected header")
        .error_kind(ErrorKind::Decode)?;
    let mut headers = Headers::from_map(map);
    fields.apply(&mut headers)?;
    Ok((headers, encoded))
}

/// Decode a base64url segment.
///
/// Trailing `=` padding is ignored and the standard alphabet is
/// accepted as well, so that slightly off producers interoperate.
pub(crate) fn decode_segment(segment: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let mut end = segment.len();
    while end > 0 && segment[end - 1] == b'=' {
        end -= 1;
    }
    let segment = &segment[..end];
    if segment.iter().any(|b| matches!(b, b'+' | b'/')) {
        BASE64_STANDARD_NO_PAD.decode(segment)
    } else {
        BASE64_URL_SAFE_NO_PAD.decode(segment)
    }
}

/// The representation of the payload within the signing input
/// and the serialized message.
pub(crate) fn payload_representation(payload: &[u8], b64: bool) -> Cow<'_, [u8]> {
    if b64 {
        Cow::Owned(BASE64_URL_SAFE_NO_PAD.encode(payload).into_bytes())
    } else {
        Cow::Borrowed(payload)
    }
}

/// Build the signing input for the given protected segment and payload.
///
/// The payload is base64url encoded when `b64` is true, and used as-is otherwise.
#[must_use]
pub fn signing_input(protected_segment: &[u8], payload: &[u8], b64: bool) -> Vec<u8> {
    join_segments(protected_segment, &payload_representation(payload, b64))
}

/// `protected "." payload`, with the payload already in its wire representation.
pub(crate) fn join_segments(protected_segment: &[u8], payload_segment: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(protected_segment.len() + 1 + payload_segment.len());
    input.extend_from_slice(protected_segment);
    input.push(b'.');
    input.extend_from_slice(payload_segment);
    input
}

/// Serialize a single [`Signature`] over `payload` in compact form.
///
/// An empty payload results in an empty payload segment,
/// which is also how a detached payload is expressed.
pub fn to_compact(signature: &Signature, payload: &[u8], b64: bool) -> Result<Vec<u8>, JWSError> {
    let protected = signature.protected_segment()?;
    let payload = payload_representation(payload, b64);
    let encoded_signature = BASE64_URL_SAFE_NO_PAD.encode(signature.signature());

    let mut compact = join_segments(protected.as_bytes(), &payload);
    compact.push(b'.');
    compact.extend_from_slice(encoded_signature.as_bytes());
    Ok(compact)
}

/// Serialize a [`Message`] in JSON form.
///
/// The payload is omitted when it is empty (detached). A message with
/// a single signature uses the flattened serialization.
pub fn to_json(message: &Message) -> Result<Vec<u8>, JWSError> {
    let payload = if message.payload().is_empty() {
        None
    } else if message.b64() {
        Some(Cow::Owned(BASE64_URL_SAFE_NO_PAD.encode(message.payload())))
    } else {
        Some(Cow::Borrowed(
            std::str::from_utf8(message.payload())
                .context("unencoded payload is not valid utf-8")
                .error_kind(ErrorKind::Serialize)?,
        ))
    };

    let mut signatures = message
        .signatures()
        .iter()
        .map(EncodedSignature::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let json = if signatures.len() == 1 {
        let signature = signatures.remove(0);
        serde_json::to_vec(&FlattenedJson { payload, signature })
    } else {
        serde_json::to_vec(&GeneralJson {
            payload,
            signatures,
        })
    };
    json.context("encode json message")
        .error_kind(ErrorKind::Serialize)
}

#[derive(Serialize)]
struct GeneralJson<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Cow<'a, str>>,
    signatures: Vec<EncodedSignature<'a>>,
}

#[derive(Serialize)]
struct FlattenedJson<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Cow<'a, str>>,
    #[serde(flatten)]
    signature: EncodedSignature<'a>,
}

#[derive(Serialize)]
struct EncodedSignature<'a> {
    protected: Cow<'a, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<&'a Headers>,
    signature: String,
}

impl<'a> TryFrom<&'a Signature> for EncodedSignature<'a> {
    type Error = JWSError;

    fn try_from(signature: &'a Signature) -> Result<Self, Self::Error> {
        Ok(Self {
            protected: signature.protected_segment()?,
            header: signature.public_headers(),
            signature: BASE64_URL_SAFE_NO_PAD.encode(signature.signature()),
        })
    }
}

#[derive(Deserialize)]
struct JsonMessage {
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    signatures: Option<Vec<JsonSignature>>,
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    header: Option<Headers>,
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Deserialize)]
struct JsonSignature {
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    header: Option<Headers>,
    signature: String,
}

impl JsonMessage {
    fn into_message(self, fields: &CustomFields) -> Result<Message, JWSError> {
        let raw_signatures = match (self.signatures, self.signature) {
            (Some(_), Some(_)) => {
                return Err(JWSError::new(
                    ErrorKind::Decode,
                    "json message mixes general and flattened serialization",
                ));
            }
            (Some(signatures), None) => signatures,
            (None, Some(signature)) => vec![JsonSignature {
                protected: self.protected,
                header: self.header,
                signature,
            }],
            (None, None) => {
                return Err(JWSError::new(
                    ErrorKind::Decode,
                    "json message carries no signature",
                ));
            }
        };

        let mut signatures = Vec::with_capacity(raw_signatures.len());
        for (index, raw) in raw_signatures.into_iter().enumerate() {
            let (protected, encoded) = match raw.protected {
                Some(encoded) => decode_protected(encoded.as_bytes(), fields)?,
                None => (Headers::new(), String::new()),
            };
            let public = match raw.header {
                Some(mut public) => {
                    fields.apply(&mut public)?;
                    Some(public)
                }
                None => None,
            };
            let signature = decode_segment(raw.signature.as_bytes())
                .context("decode signature")
                .context_field("index", index)
                .error_kind(ErrorKind::Decode)?;
            signatures.push(Signature::decoded(protected, encoded, public, signature));
        }

        let mut message = Message::new(Vec::new(), signatures);
        if let Some(payload) = self.payload {
            let payload = if message.b64() {
                decode_segment(payload.as_bytes())
                    .context("decode payload")
                    .error_kind(ErrorKind::Decode)?
            } else {
                payload.into_bytes()
            };
            message.set_payload(payload);
        }
        Ok(message)
    }
}
