use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use idcas_crypto::{HashService, Tagged};
use idcas_types::{ContentAddress, PublicKey};

use crate::error::{StoreError, StoreResult};
use crate::locks::AddressLocks;
use crate::record::{
    object_key, owner_key, parse_owner_key, ContentMeta, Manifest, ObjectRecord, RecordHeader,
    StoredContent, MANIFEST_KEY, OBJECTS_PREFIX, OWNERS_PREFIX,
};
use crate::traits::StorageBackend;

/// Aggregate store statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub object_count: u64,
    pub total_bytes: u64,
    pub owner_count: u64,
}

/// Content-addressable, write-once store over a [`StorageBackend`].
///
/// Every payload is stored under the address its [`HashService`] computes,
/// so identical bytes always land on the same record. The store keeps an
/// in-memory index of owner links, rebuilt from the backend on [`open`].
///
/// [`open`]: ContentStore::open
pub struct ContentStore<B: StorageBackend> {
    backend: B,
    hasher: HashService,
    locks: AddressLocks,
    owners: RwLock<HashMap<PublicKey, BTreeSet<ContentAddress>>>,
}

impl<B: StorageBackend> ContentStore<B> {
    /// Open a store on `backend`, creating its manifest on first use.
    ///
    /// Fails with [`StoreError::AlgorithmMismatch`] if the backend was
    /// written by a store using a different hash algorithm.
    pub async fn open(backend: B, hasher: HashService) -> StoreResult<Self> {
        match backend.get(MANIFEST_KEY).await? {
            Some(data) => {
                let manifest = Manifest::decode(&data)?;
                if manifest.algorithm != hasher.algorithm_name() {
                    return Err(StoreError::AlgorithmMismatch {
                        store: manifest.algorithm,
                        hasher: hasher.algorithm_name().to_string(),
                    });
                }
            }
            None => {
                let manifest = Manifest::new(hasher.algorithm_name());
                backend.put(MANIFEST_KEY, manifest.encode()?).await?;
                debug!(algorithm = hasher.algorithm_name(), "store manifest created");
            }
        }

        let mut owners: HashMap<PublicKey, BTreeSet<ContentAddress>> = HashMap::new();
        let mut links = 0usize;
        for key in backend.list(OWNERS_PREFIX).await? {
            match parse_owner_key(&key) {
                Some((owner, address)) => {
                    owners.entry(owner).or_default().insert(address);
                    links += 1;
                }
                None => warn!(key = %key, "ignoring malformed owner link"),
            }
        }

        info!(
            algorithm = hasher.algorithm_name(),
            owners = owners.len(),
            links,
            "content store opened"
        );

        Ok(Self {
            backend,
            hasher,
            locks: AddressLocks::new(),
            owners: RwLock::new(owners),
        })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Store raw bytes, returning their address.
    ///
    /// Idempotent: storing bytes that are already present returns the same
    /// address and leaves the existing record untouched.
    pub async fn put(&self, bytes: &[u8]) -> StoreResult<ContentAddress> {
        let address = self.hasher.hash_bytes(bytes)?;
        self.write_if_absent(&address, bytes).await?;
        Ok(address)
    }

    /// Serialize a typed payload through the registry and store it.
    pub async fn put_typed<T: Tagged>(&self, payload: &T) -> StoreResult<ContentAddress> {
        let bytes = self.hasher.serialize(payload)?;
        self.put(&bytes).await
    }

    /// Store raw bytes and link them to `owner`.
    pub async fn put_owned(&self, bytes: &[u8], owner: &PublicKey) -> StoreResult<ContentAddress> {
        let address = self.put(bytes).await?;
        self.link_owner(&address, owner).await?;
        Ok(address)
    }

    /// Link existing content to `owner`. Linking twice is a no-op.
    pub async fn link_owner(&self, address: &ContentAddress, owner: &PublicKey) -> StoreResult<()> {
        if !self.exists(address).await? {
            return Err(StoreError::NotFound(address.clone()));
        }
        if self.is_linked(address, owner) {
            return Ok(());
        }

        self.backend.put(&owner_key(owner, address), Vec::new()).await?;

        self.owners
            .write()
            .expect("lock poisoned")
            .entry(*owner)
            .or_default()
            .insert(address.clone());
        debug!(address = address.short(), owner = %owner.short_id(), "owner linked");
        Ok(())
    }

    async fn write_if_absent(&self, address: &ContentAddress, bytes: &[u8]) -> StoreResult<bool> {
        let key = object_key(address);
        let lock = self.locks.handle(address);
        let _guard = lock.lock().await;

        if self.backend.contains(&key).await? {
            debug!(address = address.short(), "content already stored");
            return Ok(false);
        }

        let record = ObjectRecord::new(self.hasher.algorithm_name(), Utc::now(), bytes);
        self.backend.put(&key, record.encode()?).await?;
        debug!(address = address.short(), size = bytes.len(), "content stored");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Bytes stored under `address`, re-verified against the address.
    pub async fn get(&self, address: &ContentAddress) -> StoreResult<Bytes> {
        Ok(self.get_content(address).await?.bytes)
    }

    /// Bytes plus metadata stored under `address`.
    ///
    /// Returns [`StoreError::NotFound`] if nothing was ever stored there and
    /// [`StoreError::Corrupt`] if the record no longer hashes to `address`.
    pub async fn get_content(&self, address: &ContentAddress) -> StoreResult<StoredContent> {
        check_address(address)?;
        let data = self
            .backend
            .get(&object_key(address))
            .await?
            .ok_or_else(|| StoreError::NotFound(address.clone()))?;

        let record = ObjectRecord::decode(address, &data).inspect_err(|e| {
            warn!(address = address.short(), error = %e, "undecodable content record");
        })?;
        if !self.hasher.verify(&record.bytes, address) {
            warn!(address = address.short(), "stored content does not match its address");
            return Err(StoreError::Corrupt {
                address: address.to_string(),
                reason: "digest mismatch".into(),
            });
        }
        record.into_content(address.clone())
    }

    /// Creation time and size of the content under `address`.
    ///
    /// Only the record header is decoded and the digest is not re-checked;
    /// use [`get_content`](Self::get_content) when the bytes matter.
    pub async fn content_meta(&self, address: &ContentAddress) -> StoreResult<ContentMeta> {
        check_address(address)?;
        let data = self
            .backend
            .get(&object_key(address))
            .await?
            .ok_or_else(|| StoreError::NotFound(address.clone()))?;
        RecordHeader::decode(address, &data)?.into_meta(address.clone())
    }

    /// Whether content exists under `address`.
    pub async fn exists(&self, address: &ContentAddress) -> StoreResult<bool> {
        check_address(address)?;
        self.backend.contains(&object_key(address)).await
    }

    /// Addresses linked to `owner`, in address order.
    pub fn owner_addresses(&self, owner: &PublicKey) -> Vec<ContentAddress> {
        self.owners
            .read()
            .expect("lock poisoned")
            .get(owner)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of all content linked to `owner`.
    pub async fn owned_by(&self, owner: &PublicKey) -> StoreResult<Vec<StoredContent>> {
        let addresses = self.owner_addresses(owner);
        let mut contents = Vec::with_capacity(addresses.len());
        for address in &addresses {
            contents.push(self.get_content(address).await?);
        }
        Ok(contents)
    }

    /// Metadata snapshot of all content linked to `owner`.
    pub async fn owned_meta(&self, owner: &PublicKey) -> StoreResult<Vec<ContentMeta>> {
        let addresses = self.owner_addresses(owner);
        let mut metas = Vec::with_capacity(addresses.len());
        for address in &addresses {
            metas.push(self.content_meta(address).await?);
        }
        Ok(metas)
    }

    /// Number of distinct owners with at least one link.
    pub fn owner_count(&self) -> usize {
        self.owners.read().expect("lock poisoned").len()
    }

    /// Object count and total payload bytes, read from the backend.
    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let keys = self.backend.list(OBJECTS_PREFIX).await?;
        let mut total_bytes = 0u64;
        for key in &keys {
            let address = key
                .strip_prefix(OBJECTS_PREFIX)
                .and_then(|s| ContentAddress::parse(s).ok())
                .ok_or_else(|| StoreError::Corrupt {
                    address: key.clone(),
                    reason: "object key is not a content address".into(),
                })?;
            if let Some(data) = self.backend.get(key).await? {
                total_bytes += RecordHeader::decode(&address, &data)?.size;
            }
        }
        Ok(StoreStats {
            object_count: keys.len() as u64,
            total_bytes,
            owner_count: self.owner_count() as u64,
        })
    }

    /// Name of the store's hash algorithm.
    pub fn algorithm(&self) -> &str {
        self.hasher.algorithm_name()
    }

    /// The hash service computing this store's addresses.
    pub fn hasher(&self) -> &HashService {
        &self.hasher
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn is_linked(&self, address: &ContentAddress, owner: &PublicKey) -> bool {
        self.owners
            .read()
            .expect("lock poisoned")
            .get(owner)
            .is_some_and(|set| set.contains(address))
    }
}

impl<B: StorageBackend> std::fmt::Debug for ContentStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("algorithm", &self.algorithm())
            .field("owner_count", &self.owner_count())
            .finish()
    }
}

fn check_address(address: &ContentAddress) -> StoreResult<()> {
    if address.is_empty() {
        return Err(StoreError::InvalidInput("empty content address".into()));
    }
    Ok(())
}
