use idcas_store::StoreError;
use idcas_types::LoginPhase;

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Malformed argument, rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The credential check rejected the login attempt.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The operation is not allowed in the current phase.
    #[error("cannot {operation} while {from}")]
    InvalidTransition {
        from: LoginPhase,
        operation: &'static str,
    },

    /// The content store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Loading, saving or clearing the persisted session failed.
    #[error("session persistence error: {0}")]
    Persistence(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid session configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Whether this error is a rejected credential rather than a failure of
    /// the session machinery.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::InvalidInput(_))
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
