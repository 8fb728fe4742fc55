use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid content address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("malformed public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid login result: {0}")]
    InvalidLoginResult(String),
}
