use std::fmt;

use idcas_types::ContentAddress;

/// Fixed-length output of a [`HashAlgorithm`](crate::HashAlgorithm).
///
/// Only algorithms produce digests: the constructor is crate-private and the
/// trait's provided `digest` method checks the declared output length.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    bytes: Vec<u8>,
}

impl Digest {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Encode as a content address (base64url, no padding).
    pub fn to_address(&self) -> ContentAddress {
        ContentAddress::encode(&self.bytes)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.bytes[..self.bytes.len().min(4)];
        write!(f, "Digest({}, {} bytes)", hex::encode(shown), self.bytes.len())
    }
}
