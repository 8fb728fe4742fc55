use idcas_crypto::HashError;
use idcas_types::ContentAddress;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nothing was ever written under this address.
    #[error("content not found: {0}")]
    NotFound(ContentAddress),

    /// A stored record cannot be decoded or no longer matches its address.
    #[error("corrupt content {address}: {reason}")]
    Corrupt { address: String, reason: String },

    /// Malformed argument, rejected before any I/O.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store was created with a different hash algorithm.
    #[error("store uses hash algorithm {store}, but the hasher is configured for {hasher}")]
    AlgorithmMismatch { store: String, hasher: String },

    /// I/O error from the underlying storage backend.
    #[error("storage I/O error: {0}")]
    Storage(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Hashing or payload serialization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
