/// Errors from hashing and serialization.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    /// The payload was absent or otherwise unusable. Raised before any
    /// serialization or hashing.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No serializer is registered for the payload type, or registrations
    /// conflict.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// An algorithm produced output of the wrong length.
    #[error("algorithm {algorithm} produced {actual} bytes, expected {expected}")]
    DigestLength {
        algorithm: String,
        expected: usize,
        actual: usize,
    },
}

/// Result alias for hashing operations.
pub type HashResult<T> = Result<T, HashError>;

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}
