use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use idcas_crypto::{AlgorithmId, HashService, SerializerRegistry};

use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::store::ContentStore;

/// Configuration for an on-disk content store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the file backend.
    pub root: PathBuf,
    /// Hash algorithm. Must match the algorithm the store was created with.
    pub algorithm: AlgorithmId,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./idcas-data"),
            algorithm: AlgorithmId::Blake3,
        }
    }
}

impl StoreConfig {
    /// Parse from TOML. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Configuration(e.to_string()))
    }

    /// Load from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&text)
    }

    /// A hash service for the configured algorithm.
    pub fn hash_service(&self, registry: SerializerRegistry) -> HashService {
        HashService::new(self.algorithm.build(), registry)
    }

    /// Open the file-backed store this configuration describes.
    pub async fn open_file_store(
        &self,
        registry: SerializerRegistry,
    ) -> StoreResult<ContentStore<FileBackend>> {
        let backend = FileBackend::open(&self.root).await?;
        ContentStore::open(backend, self.hash_service(registry)).await
    }
}
