use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use idcas_types::ContentAddress;

/// Table size past which dead entries are pruned on the next lookup.
const PRUNE_THRESHOLD: usize = 256;

/// Per-address async locks.
///
/// Writers of the same address share one `tokio::sync::Mutex`; writers of
/// different addresses never contend. The table holds weak references, so an
/// address's lock is freed once no writer holds its handle.
#[derive(Default)]
pub(crate) struct AddressLocks {
    table: Mutex<HashMap<ContentAddress, Weak<tokio::sync::Mutex<()>>>>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `address`, shared with every other live handle for it.
    pub fn handle(&self, address: &ContentAddress) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = self.table.lock().expect("lock poisoned");
        if let Some(lock) = table.get(address).and_then(Weak::upgrade) {
            return lock;
        }
        if table.len() >= PRUNE_THRESHOLD {
            table.retain(|_, weak| weak.strong_count() > 0);
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        table.insert(address.clone(), Arc::downgrade(&lock));
        lock
    }

    /// Number of table entries, live or not yet pruned.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.lock().expect("lock poisoned").len()
    }
}
