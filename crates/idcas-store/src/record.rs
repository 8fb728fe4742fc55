use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idcas_types::{ContentAddress, PublicKey};

use crate::error::{StoreError, StoreResult};

/// Current on-backend record format.
pub(crate) const RECORD_VERSION: u8 = 1;

/// Current manifest format.
pub(crate) const MANIFEST_VERSION: u32 = 1;

/// Backend key of the store manifest.
pub(crate) const MANIFEST_KEY: &str = "manifest";

/// Key prefix of content records.
pub(crate) const OBJECTS_PREFIX: &str = "objects/";

/// Key prefix of owner links.
pub(crate) const OWNERS_PREFIX: &str = "owners/";

pub(crate) fn object_key(address: &ContentAddress) -> String {
    format!("{OBJECTS_PREFIX}{address}")
}

/// Owner links live entirely in the key; the stored value is empty.
pub(crate) fn owner_key(owner: &PublicKey, address: &ContentAddress) -> String {
    format!("{OWNERS_PREFIX}{}/{address}", owner.to_url_safe())
}

/// Split an owner link key back into its owner and address.
pub(crate) fn parse_owner_key(key: &str) -> Option<(PublicKey, ContentAddress)> {
    let rest = key.strip_prefix(OWNERS_PREFIX)?;
    let (owner, address) = rest.split_once('/')?;
    let owner = PublicKey::from_base64(owner).ok()?;
    let address = ContentAddress::parse(address).ok()?;
    Some((owner, address))
}

/// Content read back from the store: bytes plus metadata.
///
/// `bytes` is a shared immutable buffer; the store never hands out a way to
/// change content in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredContent {
    pub address: ContentAddress,
    pub bytes: Bytes,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    /// Algorithm that produced `address`.
    pub algorithm: String,
}

/// Metadata of stored content, read without copying or re-hashing the bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentMeta {
    pub address: ContentAddress,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    pub algorithm: String,
}

fn corrupt(address: &ContentAddress, reason: String) -> StoreError {
    StoreError::Corrupt {
        address: address.to_string(),
        reason,
    }
}

fn check_version(address: &ContentAddress, version: u8) -> StoreResult<()> {
    if version != RECORD_VERSION {
        return Err(corrupt(address, format!("unsupported record version {version}")));
    }
    Ok(())
}

fn timestamp(address: &ContentAddress, millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt(address, format!("timestamp out of range: {millis}")))
}

/// On-backend form of stored content, bincode-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ObjectRecord {
    pub version: u8,
    pub algorithm: String,
    pub created_at_ms: i64,
    pub bytes: Vec<u8>,
}

impl ObjectRecord {
    pub fn new(algorithm: &str, created_at: DateTime<Utc>, bytes: &[u8]) -> Self {
        Self {
            version: RECORD_VERSION,
            algorithm: algorithm.to_string(),
            created_at_ms: created_at.timestamp_millis(),
            bytes: bytes.to_vec(),
        }
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn decode(address: &ContentAddress, data: &[u8]) -> StoreResult<Self> {
        let record: Self = bincode::deserialize(data)
            .map_err(|e| corrupt(address, format!("undecodable record: {e}")))?;
        check_version(address, record.version)?;
        Ok(record)
    }

    pub fn into_content(self, address: ContentAddress) -> StoreResult<StoredContent> {
        let created_at = timestamp(&address, self.created_at_ms)?;
        Ok(StoredContent {
            address,
            size: self.bytes.len() as u64,
            bytes: Bytes::from(self.bytes),
            created_at,
            algorithm: self.algorithm,
        })
    }
}

/// Leading fields of an [`ObjectRecord`].
///
/// bincode writes the payload as a `u64` length followed by the bytes, so
/// decoding this prefix yields the size and leaves the payload unread.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordHeader {
    pub version: u8,
    pub algorithm: String,
    pub created_at_ms: i64,
    pub size: u64,
}

impl RecordHeader {
    pub fn decode(address: &ContentAddress, data: &[u8]) -> StoreResult<Self> {
        let header: Self = bincode::deserialize(data)
            .map_err(|e| corrupt(address, format!("undecodable record header: {e}")))?;
        check_version(address, header.version)?;
        Ok(header)
    }

    pub fn into_meta(self, address: ContentAddress) -> StoreResult<ContentMeta> {
        let created_at = timestamp(&address, self.created_at_ms)?;
        Ok(ContentMeta {
            address,
            created_at,
            size: self.size,
            algorithm: self.algorithm,
        })
    }
}

/// Store manifest, JSON-encoded. Pins the hash algorithm for the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub format_version: u32,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(algorithm: &str) -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            algorithm: algorithm.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        let manifest: Self = serde_json::from_slice(data)
            .map_err(|e| StoreError::Configuration(format!("unreadable store manifest: {e}")))?;
        if manifest.format_version != MANIFEST_VERSION {
            return Err(StoreError::Configuration(format!(
                "unsupported store format version {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }
}
