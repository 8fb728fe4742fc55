use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content address of a stored payload.
///
/// A `ContentAddress` is the digest of a payload's serialized bytes encoded as
/// URL-safe base64 without padding: letters, digits, `-` and `_` only. Two
/// payloads with byte-identical serialized form hashed by the same algorithm
/// always share an address.
///
/// The address does not record which algorithm produced it. Stores pin a
/// single algorithm per store instead.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

impl ContentAddress {
    /// Encode raw digest bytes as an address.
    ///
    /// Equivalent to standard base64 with `+` replaced by `-`, `/` by `_`,
    /// and trailing `=` padding stripped. An empty digest encodes to the empty
    /// address.
    pub fn encode(digest: &[u8]) -> Self {
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Parse and validate an address from text.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if let Some(bad) = s.chars().find(|c| !is_address_char(*c)) {
            return Err(TypeError::InvalidAddress {
                address: s.to_string(),
                reason: format!("character {bad:?} is outside the base64url alphabet"),
            });
        }
        URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| TypeError::InvalidAddress {
                address: s.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self(s.to_string()))
    }

    /// Decode back to the digest bytes.
    pub fn to_digest_bytes(&self) -> Vec<u8> {
        // Construction always goes through `encode` or a validated `parse`.
        URL_SAFE_NO_PAD
            .decode(&self.0)
            .expect("content address holds validated base64url")
    }

    /// The address text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the degenerate empty address.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short form (first 8 characters) for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

/// Returns `true` if `c` belongs to the unpadded base64url alphabet.
pub fn is_address_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.short())
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentAddress {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ContentAddress> for String {
    fn from(address: ContentAddress) -> Self {
        address.0
    }
}

impl AsRef<str> for ContentAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
