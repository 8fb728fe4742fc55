//! Ed25519 keys proving possession of an identity [`PublicKey`].
//!
//! A login presents a signature over a challenge; the verifier rebuilds the
//! Ed25519 point from the claimed key and checks it with `verify_strict`,
//! which also rejects small-order keys and malleable signatures.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SECRET_KEY_LENGTH, SIGNATURE_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use idcas_types::PublicKey;

use crate::error::SignatureError;

fn decode_base64(text: &str) -> Result<Vec<u8>, SignatureError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| SignatureError::InvalidEncoding(e.to_string()))
}

/// Secret half of a user identity.
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    pub fn generate() -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret(secret: [u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&secret),
        }
    }

    /// Parse the standard base64 text printed by [`to_base64`](Self::to_base64).
    pub fn from_base64(text: &str) -> Result<Self, SignatureError> {
        let secret: [u8; SECRET_KEY_LENGTH] = decode_base64(text)?
            .try_into()
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self::from_secret(secret))
    }

    /// The secret as base64. Anyone holding it can log in as this identity.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.inner.as_bytes())
    }

    /// The identity this key signs for.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.inner.verifying_key().to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.inner.sign(message))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey({}, secret redacted)", self.public_key().short_id())
    }
}

/// Public half of a user identity, ready to check signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl VerifyingKey {
    /// Interpret an identity key as an Ed25519 point.
    ///
    /// Fails with [`SignatureError::InvalidKey`] when the 32 bytes are not a
    /// valid curve point.
    pub fn for_key(key: &PublicKey) -> Result<Self, SignatureError> {
        ed25519_dalek::VerifyingKey::from_bytes(key.as_bytes())
            .map(|inner| Self { inner })
            .map_err(|_| SignatureError::InvalidKey)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.inner.to_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        self.inner
            .verify_strict(message, &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({})", self.public_key().short_id())
    }
}

/// Detached Ed25519 signature. Serialized as standard base64 text.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.to_bytes())
    }

    pub fn from_base64(text: &str) -> Result<Self, SignatureError> {
        let bytes: [u8; SIGNATURE_LENGTH] = decode_base64(text)?.try_into().map_err(|v: Vec<u8>| {
            SignatureError::InvalidEncoding(format!(
                "signature is {} bytes, expected {SIGNATURE_LENGTH}",
                v.len()
            ))
        })?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&bytes)))
    }
}

impl TryFrom<String> for Signature {
    type Error = SignatureError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::from_base64(&text)
    }
}

impl From<Signature> for String {
    fn from(signature: Signature) -> Self {
        signature.to_base64()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0.to_bytes()[..6]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_signature_verifies_under_public_key() {
        let key = SigningKey::generate();
        let signature = key.sign(b"login challenge");
        let verifier = VerifyingKey::for_key(&key.public_key()).unwrap();
        assert!(verifier.verify(b"login challenge", &signature).is_ok());
        assert_eq!(verifier, key.verifying_key());
        assert_eq!(verifier.public_key(), key.public_key());
    }

    #[test]
    fn other_message_or_key_fails() {
        let alice = SigningKey::generate();
        let bob = SigningKey::generate();
        let signature = alice.sign(b"challenge-1");
        assert_eq!(
            alice.verifying_key().verify(b"challenge-2", &signature),
            Err(SignatureError::InvalidSignature)
        );
        assert!(bob.verifying_key().verify(b"challenge-1", &signature).is_err());
    }

    #[test]
    fn known_secret_gives_stable_identity() {
        let a = SigningKey::from_secret([7; 32]);
        let b = SigningKey::from_base64(&a.to_base64()).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"m"), b.sign(b"m"));
    }

    #[test]
    fn malformed_secrets_are_rejected() {
        let short = STANDARD.encode([1u8; 10]);
        assert_eq!(SigningKey::from_base64(&short).unwrap_err(), SignatureError::InvalidKey);
        assert!(matches!(
            SigningKey::from_base64("%%%"),
            Err(SignatureError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn signature_text_forms() {
        let signature = SigningKey::generate().sign(b"test");
        let text = signature.to_base64();
        assert_eq!(Signature::from_base64(&text).unwrap(), signature);

        let json = serde_json::to_string(&signature).unwrap();
        assert_eq!(json, format!("\"{text}\""));
        assert_eq!(serde_json::from_str::<Signature>(&json).unwrap(), signature);

        let truncated = STANDARD.encode([0u8; 63]);
        assert!(matches!(
            Signature::from_base64(&truncated),
            Err(SignatureError::InvalidEncoding(ref m)) if m.contains("63")
        ));
    }

    #[test]
    fn debug_never_prints_secret() {
        let key = SigningKey::from_secret([9; 32]);
        let shown = format!("{key:?}");
        assert!(shown.contains("redacted"));
        assert!(!shown.contains(&key.to_base64()));
        assert!(shown.contains("pk:"));
    }
}
