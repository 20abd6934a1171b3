use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, JWSError};

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
/// [`JWA`] or JSON Web Algorithms as defined in [`rfc7518`] and [`rfc8037`],
/// limited to the digital signature and MAC algorithms usable with JWS.
///
/// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518
/// [`rfc8037`]: https://datatracker.ietf.org/doc/html/rfc8037
pub enum JWA {
    /// HMAC using SHA-256 (Required)
    HS256,
    /// HMAC using SHA-384 (Optional)
    HS384,
    /// HMAC using SHA-512 (Optional)
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256 (Recommended)
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384 (Optional)
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512 (Optional)
    RS512,
    /// ECDSA using P-256 and SHA-256 (Recommended+)
    ES256,
    /// ECDSA using P-384 and SHA-384 (Optional)
    ES384,
    /// ECDSA using P-521 and SHA-512 (Optional)
    ES512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256 (Optional)
    PS256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384 (Optional)
    PS384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512 (Optional)
    PS512,
    /// Edwards-curve digital signatures, as defined in [`rfc8037`]
    ///
    /// [`rfc8037`]: https://datatracker.ietf.org/doc/html/rfc8037
    #[serde(rename = "EdDSA")]
    EdDSA,
}

impl JWA {
    /// All algorithms known to this crate.
    pub const ALL: [Self; 13] = [
        Self::HS256,
        Self::HS384,
        Self::HS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::EdDSA,
    ];

    /// Name of the algorithm as used in the `alg` header.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::EdDSA => "EdDSA",
        }
    }

    /// The [`KeyType`] this algorithm operates on.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => KeyType::Octet,
            Self::RS256
            | Self::RS384
            | Self::RS512
            | Self::PS256
            | Self::PS384
            | Self::PS512 => KeyType::RSA,
            Self::ES256 | Self::ES384 | Self::ES512 => KeyType::EC,
            Self::EdDSA => KeyType::OKP,
        }
    }
}

impl fmt::Display for JWA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JWA {
    type Err = JWSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| {
                JWSError::new(
                    ErrorKind::UnsupportedAlgorithm,
                    format!("unknown signature algorithm '{s}'"),
                )
            })
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
/// The "kty" (key type) identifies the cryptographic algorithm family
/// used with a key, as defined in [`rfc7518, section 6.1`].
///
/// [`rfc7518, section 6.1`]: https://datatracker.ietf.org/doc/html/rfc7518#section-6.1
pub enum KeyType {
    /// An octet sequence, which represents a symmetric key
    #[serde(rename = "oct")]
    Octet,
    RSA,
    /// Elliptic curve
    EC,
    /// Octet key pair (Ed25519, X25519)
    OKP,
}

impl KeyType {
    /// Name of the key type as used in the `kty` parameter.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Octet => "oct",
            Self::RSA => "RSA",
            Self::EC => "EC",
            Self::OKP => "OKP",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_follow_the_registry() {
        for alg in JWA::ALL {
            let encoded = serde_json::to_string(&alg).unwrap();
            assert_eq!(encoded, format!("\"{}\"", alg.as_str()));
            let decoded: JWA = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, alg);
        }
        assert_eq!(serde_json::to_string(&KeyType::Octet).unwrap(), "\"oct\"");
    }

    #[test]
    fn parse_from_str() {
        assert_eq!("EdDSA".parse::<JWA>().unwrap(), JWA::EdDSA);
        assert_eq!("PS384".parse::<JWA>().unwrap(), JWA::PS384);

        let err = "none".parse::<JWA>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
        let err = "hs256".parse::<JWA>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    }

    #[test]
    fn algorithm_key_type() {
        assert_eq!(JWA::HS512.key_type(), KeyType::Octet);
        assert_eq!(JWA::PS256.key_type(), KeyType::RSA);
        assert_eq!(JWA::ES384.key_type(), KeyType::EC);
        assert_eq!(JWA::EdDSA.key_type(), KeyType::OKP);
    }
}
