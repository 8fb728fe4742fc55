use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Durable key-bytes store underneath a [`ContentStore`](crate::ContentStore).
///
/// All implementations must satisfy these invariants:
/// - `put` is atomic: a concurrent or later `get` observes either the
///   previous value or the complete new one, never a partial write. This
///   holds even if the calling future is dropped mid-operation.
/// - Keys are opaque `/`-separated paths built by the content store. Backends
///   never invent keys of their own.
/// - All I/O errors are propagated, never silently ignored or retried.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write `bytes` under `key`, replacing any previous value.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()>;

    /// Read the value under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether `key` exists.
    ///
    /// Default implementation reads the value. Backends should override with
    /// a cheaper check.
    async fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// List all keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        (**self).put(key, bytes).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn contains(&self, key: &str) -> StoreResult<bool> {
        (**self).contains(key).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).list(prefix).await
    }
}
