use std::fmt;
use std::str::FromStr;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const OPTIONAL_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Standard alphabet, padded or not.
const STANDARD_ANY_PAD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, OPTIONAL_PADDING);

/// URL-safe alphabet, padded or not.
const URL_SAFE_ANY_PAD: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, OPTIONAL_PADDING);

/// A user's public key, the identity that content and sessions are scoped to.
///
/// Accepted text forms are standard or URL-safe base64, padded or not, that
/// decode to exactly 32 bytes. The canonical text form is padded standard
/// base64; storage keys use the URL-safe unpadded form so they never contain
/// `/`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Length of the raw key in bytes.
    pub const LEN: usize = 32;

    /// Create from raw key bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a base64 public key in either alphabet, padded or not.
    ///
    /// Text mixing the two alphabets, or padded to anything but a multiple
    /// of four characters, is rejected.
    pub fn from_base64(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TypeError::InvalidPublicKey("empty key".into()));
        }

        let standard = trimmed.contains(['+', '/']);
        let url_safe = trimmed.contains(['-', '_']);
        if standard && url_safe {
            return Err(TypeError::InvalidPublicKey(
                "mixes standard and URL-safe base64 alphabets".into(),
            ));
        }
        let padding = trimmed.len() - trimmed.trim_end_matches('=').len();
        if padding > 2 || (padding > 0 && trimmed.len() % 4 != 0) {
            return Err(TypeError::InvalidPublicKey("malformed base64 padding".into()));
        }

        let engine = if url_safe { &URL_SAFE_ANY_PAD } else { &STANDARD_ANY_PAD };
        let bytes = engine
            .decode(trimmed)
            .map_err(|e| TypeError::InvalidPublicKey(e.to_string()))?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            TypeError::InvalidPublicKey(
                TypeError::InvalidLength {
                    expected: Self::LEN,
                    actual: bytes.len(),
                }
                .to_string(),
            )
        })?;
        Ok(Self(arr))
    }

    /// Canonical padded standard base64 form.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// URL-safe unpadded form, safe for use in storage keys and paths.
    pub fn to_url_safe(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("pk:{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short_id())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for PublicKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_base64(&s)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_base64()
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PublicKey {
        // 0xfb/0xff bytes force '+' and '/' into the standard encoding.
        let mut bytes = [0xfbu8; 32];
        bytes[31] = 0xff;
        PublicKey::from_bytes(bytes)
    }

    #[test]
    fn standard_base64_roundtrip() {
        let key = sample();
        let text = key.to_base64();
        assert!(text.ends_with('='));
        assert_eq!(PublicKey::from_base64(&text).unwrap(), key);
    }

    #[test]
    fn url_safe_form_is_accepted() {
        let key = sample();
        let url_safe = key.to_url_safe();
        assert!(!url_safe.contains(['+', '/', '=']));
        assert_eq!(PublicKey::from_base64(&url_safe).unwrap(), key);
    }

    #[test]
    fn mixed_alphabets_are_rejected() {
        let key = sample();
        let text = key.to_base64();
        assert!(text.contains('+') && text.contains('/'));
        let mixed = text.replacen('/', "_", 1);
        let err = PublicKey::from_base64(&mixed).unwrap_err();
        assert!(matches!(err, TypeError::InvalidPublicKey(ref m) if m.contains("alphabets")));
    }

    #[test]
    fn padding_must_be_canonical() {
        let key = sample();
        let text = key.to_base64();
        assert_eq!(PublicKey::from_base64(text.trim_end_matches('=')).unwrap(), key);
        assert_eq!(PublicKey::from_base64(&format!("{}=", key.to_url_safe())).unwrap(), key);

        for bad in [format!("{text}="), format!("{text}=="), format!("{text}====")] {
            assert!(
                matches!(PublicKey::from_base64(&bad), Err(TypeError::InvalidPublicKey(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let key = sample();
        let padded = format!("  {}\n", key.to_base64());
        assert_eq!(PublicKey::from_base64(&padded).unwrap(), key);
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            PublicKey::from_base64("   "),
            Err(TypeError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = STANDARD.encode([1u8; 16]);
        let err = PublicKey::from_base64(&short).unwrap_err();
        assert!(matches!(err, TypeError::InvalidPublicKey(ref msg) if msg.contains("16")));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PublicKey::from_base64("not a key!").is_err());
    }

    #[test]
    fn short_id_format() {
        let key = PublicKey::from_bytes([0xab; 32]);
        assert_eq!(key.short_id(), "pk:abababab");
    }

    #[test]
    fn serde_uses_canonical_text() {
        let key = sample();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_base64()));
        let parsed: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }
}
