//! JSON Web Signature (JWS) envelopes for rama.
//!
//! Sign and verify payloads in the compact serialization
//! (`protected.payload.signature`) or the JSON serialization, which can carry
//! multiple signatures over the same payload, as defined in [`rfc7515`].
//! The unencoded payload option of [`rfc7797`] (`"b64": false`) and detached
//! payloads are supported.
//!
//! Cryptography is pluggable through the [`Signer`], [`Verifier`] and
//! [`SignatureBackend`] traits. With the (default) `aws-lc` feature enabled,
//! [`AwsLcBackend`] implements all algorithms of [`JWA`].
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "aws-lc")]
//! # {
//! use rama_jws::{JWA, JWSContext, Key, SignOptions, VerifyOptions};
//!
//! let ctx = JWSContext::default();
//! let key = Key::Octet(b"a very secret key".to_vec());
//!
//! let compact = ctx.sign(b"hello", JWA::HS256, &key, &SignOptions::new())?;
//! let payload = ctx.verify(&compact, JWA::HS256, &key, &VerifyOptions::new())?;
//! assert_eq!(payload, b"hello");
//! # }
//! # Ok::<(), rama_jws::JWSError>(())
//! ```
//!
//! # Rama
//!
//! Crate used by the end-user `rama` crate and `rama` crate authors alike.
//!
//! Learn more about `rama`:
//!
//! - Github: <https://github.com/plabayo/rama>
//! - Book: <https://ramaproxy.org/book/>
//!
//! [`rfc7515`]: https://datatracker.ietf.org/doc/html/rfc7515
//! [`rfc7797`]: https://datatracker.ietf.org/doc/html/rfc7797

#![doc(
    html_favicon_url = "https://raw.githubusercontent.com/plabayo/rama/main/docs/img/old_logo.png"
)]
#![doc(html_logo_url = "https://raw.githubusercontent.com/plabayo/rama/main/docs/img/old_logo.png")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

mod backend;
mod context;
mod error;
mod jwa;
mod key;
mod message;
mod registry;
mod sign;
mod verify;

pub mod codec;
pub mod header;

#[doc(inline)]
pub use backend::{SignatureBackend, Signer, Verifier};

#[cfg(feature = "aws-lc")]
#[cfg_attr(docsrs, doc(cfg(feature = "aws-lc")))]
#[doc(inline)]
pub use backend::AwsLcBackend;

#[doc(inline)]
pub use codec::{parse, parse_reader, parse_str, split_compact, split_compact_stream};
pub use context::JWSContext;
pub(crate) use error::ErrorKindExt;
pub use error::{BoxError, ErrorKind, JWSError};
#[doc(inline)]
pub use header::Headers;
pub use jwa::{JWA, KeyType};
pub use key::{AsymmetricKey, Key, KeyCapability, KeyDescriptor, KeySet, KeyUse};
pub use message::{Message, Signature};
pub use registry::{CustomFields, KeyTypeRegistry};
pub use sign::{SignOptions, SignerConfig};
pub use verify::{VerifiedMessage, VerifyOptions};

pub mod dep {
    //! Dependencies for rama jws modules.
    //!
    //! Exported for your convenience

    #[cfg(feature = "aws-lc")]
    pub mod aws_lc_rs {
        //! Re-export of the [`aws-lc-rs`] crate.
        //!
        //! [`aws-lc-rs`]: https://docs.rs/aws-lc-rs

        #[doc(inline)]
        pub use aws_lc_rs::*;
    }

    pub mod serde_json {
        //! Re-export of the [`serde_json`] crate.
        //!
        //! [`serde_json`]: https://docs.rs/serde_json

        #[doc(inline)]
        pub use serde_json::*;
    }
}
