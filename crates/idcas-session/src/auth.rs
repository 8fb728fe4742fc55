use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use idcas_crypto::{Signature, SigningKey, VerifyingKey};
use idcas_types::PublicKey;

use crate::error::{SessionError, SessionResult};

/// Proof of key possession presented at login or unlock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub public_key_base64: String,
    pub username: Option<String>,
    pub challenge: String,
    /// Detached Ed25519 signature over `challenge`, base64.
    pub signature_base64: String,
}

impl Credentials {
    /// Sign `challenge` with `key`.
    pub fn sign(key: &SigningKey, username: Option<String>, challenge: impl Into<String>) -> Self {
        let challenge = challenge.into();
        Self {
            public_key_base64: key.public_key().to_base64(),
            username,
            signature_base64: key.sign(challenge.as_bytes()).to_base64(),
            challenge,
        }
    }
}

/// Identity established by a successful credential check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub public_key: PublicKey,
    pub username: Option<String>,
}

/// Credential check run by the state machine on login and unlock.
///
/// Rejections are [`SessionError::AuthenticationFailed`]; a malformed key is
/// [`SessionError::InvalidInput`]. Any other error aborts the operation.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> SessionResult<AuthenticatedUser>;
}

/// Accepts credentials whose signature verifies under their public key.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureAuthenticator;

#[async_trait]
impl Authenticator for SignatureAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> SessionResult<AuthenticatedUser> {
        let public_key = PublicKey::from_base64(&credentials.public_key_base64)
            .map_err(|e| SessionError::InvalidInput(format!("malformed public key: {e}")))?;
        if credentials.challenge.is_empty() {
            return Err(SessionError::AuthenticationFailed("empty challenge".into()));
        }

        let verifying = VerifyingKey::for_key(&public_key)
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;
        let signature = Signature::from_base64(&credentials.signature_base64)
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;
        verifying
            .verify(credentials.challenge.as_bytes(), &signature)
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;

        debug!(key = %public_key.short_id(), "signature verified");
        Ok(AuthenticatedUser {
            public_key,
            username: credentials.username.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let key = SigningKey::generate();
        let creds = Credentials::sign(&key, Some("alice".into()), "nonce-1");
        let user = SignatureAuthenticator.authenticate(&creds).await.unwrap();
        assert_eq!(user.public_key, key.public_key());
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn signature_for_other_challenge_is_rejected() {
        let key = SigningKey::generate();
        let mut creds = Credentials::sign(&key, None, "nonce-1");
        creds.challenge = "nonce-2".into();
        assert!(matches!(
            SignatureAuthenticator.authenticate(&creds).await,
            Err(SessionError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn signature_from_other_key_is_rejected() {
        let key = SigningKey::generate();
        let mut creds = Credentials::sign(&key, None, "nonce");
        creds.public_key_base64 = SigningKey::generate().public_key().to_base64();
        assert!(matches!(
            SignatureAuthenticator.authenticate(&creds).await,
            Err(SessionError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn empty_challenge_is_rejected() {
        let key = SigningKey::generate();
        let creds = Credentials::sign(&key, None, "");
        assert!(matches!(
            SignatureAuthenticator.authenticate(&creds).await,
            Err(SessionError::AuthenticationFailed(ref m)) if m.contains("empty")
        ));
    }

    #[tokio::test]
    async fn malformed_inputs() {
        let key = SigningKey::generate();
        let mut creds = Credentials::sign(&key, None, "nonce");
        creds.signature_base64 = "%%%".into();
        assert!(matches!(
            SignatureAuthenticator.authenticate(&creds).await,
            Err(SessionError::AuthenticationFailed(_))
        ));

        creds.public_key_base64 = "short".into();
        assert!(matches!(
            SignatureAuthenticator.authenticate(&creds).await,
            Err(SessionError::InvalidInput(_))
        ));
    }
}
