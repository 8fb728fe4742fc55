use std::sync::Arc;

use tracing::debug;

use idcas_store::{ContentStore, StorageBackend};
use idcas_types::{PublicKey, UserTrackingInfo};

use crate::error::{SessionError, SessionResult};

/// Read-only view answering "have we seen this key before?".
///
/// Facts are recomputed from the content store's owner links on every call
/// and never cached. Each call works on one snapshot of the owner's
/// addresses, so content published during the call is either fully counted
/// or not at all.
pub struct IdentityTrackingView<B: StorageBackend> {
    store: Arc<ContentStore<B>>,
}

impl<B: StorageBackend> IdentityTrackingView<B> {
    pub fn new(store: Arc<ContentStore<B>>) -> Self {
        Self { store }
    }

    /// Tracking facts for a base64 public key.
    ///
    /// A malformed key is [`SessionError::InvalidInput`], reported before
    /// the store is touched.
    pub async fn track(&self, public_key_base64: &str) -> SessionResult<UserTrackingInfo> {
        let key = PublicKey::from_base64(public_key_base64)
            .map_err(|e| SessionError::InvalidInput(format!("malformed public key: {e}")))?;
        self.track_key(&key).await
    }

    /// Tracking facts for a parsed public key.
    pub async fn track_key(&self, key: &PublicKey) -> SessionResult<UserTrackingInfo> {
        let metas = self.store.owned_meta(key).await?;
        let info = UserTrackingInfo::from_timestamps(key, metas.iter().map(|m| m.created_at));
        debug!(key = %key.short_id(), count = info.content_count, "identity tracked");
        Ok(info)
    }

    /// The store this view reads.
    pub fn store(&self) -> &Arc<ContentStore<B>> {
        &self.store
    }
}

impl<B: StorageBackend> Clone for IdentityTrackingView<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}
