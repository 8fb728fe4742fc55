use std::fmt;
use std::sync::Arc;

use idcas_types::ContentAddress;

use crate::algorithm::{Blake3, HashAlgorithm};
use crate::digest::Digest;
use crate::error::{HashError, HashResult};
use crate::serializer::{SerializerRegistry, Tagged};

/// Turns payloads into content addresses.
///
/// Resolves the payload's serializer, digests the serialized bytes with the
/// configured algorithm, and encodes the digest as base64url without padding.
/// The algorithm and registry are explicit constructor dependencies; the
/// service holds no mutable state and is cheap to clone.
#[derive(Clone)]
pub struct HashService {
    algorithm: Arc<dyn HashAlgorithm>,
    registry: Arc<SerializerRegistry>,
}

impl HashService {
    pub fn new(algorithm: Arc<dyn HashAlgorithm>, registry: SerializerRegistry) -> Self {
        Self {
            algorithm,
            registry: Arc::new(registry),
        }
    }

    /// BLAKE3 with the given registry.
    pub fn blake3(registry: SerializerRegistry) -> Self {
        Self::new(Arc::new(Blake3), registry)
    }

    /// Name of the configured algorithm.
    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    /// Address of a typed payload.
    ///
    /// Fails with [`HashError::Configuration`] if `T` has no registered
    /// serializer.
    pub fn hash<T: Tagged>(&self, payload: &T) -> HashResult<ContentAddress> {
        let bytes = self.serialize(payload)?;
        self.hash_bytes(&bytes)
    }

    /// Address of a payload that may be absent.
    ///
    /// `None` is rejected with [`HashError::InvalidInput`] before any
    /// serialization or hashing happens.
    pub fn hash_optional<T: Tagged>(&self, payload: Option<&T>) -> HashResult<ContentAddress> {
        let payload = payload.ok_or_else(|| {
            HashError::InvalidInput(format!("absent payload of type {:?}", T::TAG))
        })?;
        self.hash(payload)
    }

    /// Address of raw bytes, hashed directly without the registry.
    pub fn hash_bytes(&self, bytes: &[u8]) -> HashResult<ContentAddress> {
        let digest = self.digest_bytes(bytes)?;
        Ok(Self::encode_digest(&digest))
    }

    /// Digest of raw bytes.
    pub fn digest_bytes(&self, bytes: &[u8]) -> HashResult<Digest> {
        self.algorithm.digest(bytes)
    }

    /// The canonical bytes [`hash`](Self::hash) digests for `payload`.
    pub fn serialize<T: Tagged>(&self, payload: &T) -> HashResult<Vec<u8>> {
        self.registry.serialize(payload)
    }

    /// Encode a digest as a content address.
    pub fn encode_digest(digest: &Digest) -> ContentAddress {
        digest.to_address()
    }

    /// Verify that `bytes` hash to `expected`.
    pub fn verify(&self, bytes: &[u8], expected: &ContentAddress) -> bool {
        matches!(self.hash_bytes(bytes), Ok(ref actual) if actual == expected)
    }
}

impl fmt::Debug for HashService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashService")
            .field("algorithm", &self.algorithm.name())
            .field("registered_types", &self.registry.len())
            .finish()
    }
}
