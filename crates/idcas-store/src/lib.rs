//! Content-addressable storage for IDCAS.
//!
//! [`ContentStore`] persists payloads under their [`ContentAddress`], the
//! base64url digest computed by a [`HashService`]. Storing the same bytes
//! twice yields the same address and a single stored copy. Content can be
//! linked to the public keys of the users it belongs to, which is what the
//! identity-tracking view reads.
//!
//! # Storage Backends
//!
//! All backends implement the async [`StorageBackend`] trait, a plain
//! key-bytes store whose keys are built exclusively by the content store:
//!
//! - [`InMemoryBackend`] -- `BTreeMap`-based backend for tests and embedding
//! - [`FileBackend`] -- one file per key, written via temp file + rename
//!
//! # Design Rules
//!
//! 1. Content is write-once: no update, no delete. A change is a new address.
//! 2. Write-then-publish: a record becomes visible only as a whole.
//! 3. Concurrent writers of the same address are serialized by a per-address
//!    lock. There is no store-wide write lock.
//! 4. One hash algorithm per store, pinned by the store manifest.
//! 5. All backend I/O errors are propagated, never retried or swallowed.
//!
//! [`HashService`]: idcas_crypto::HashService
//! [`ContentAddress`]: idcas_types::ContentAddress

pub mod config;
pub mod error;
pub mod file;
mod locks;
pub mod memory;
pub mod record;
pub mod store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use record::{ContentMeta, StoredContent};
pub use store::{ContentStore, StoreStats};
pub use traits::StorageBackend;
