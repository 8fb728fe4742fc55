use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use idcas_session::SessionConfig;
use idcas_store::StoreConfig;

/// Name of the configuration file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "idcas.toml";

/// Top-level `idcas.toml` layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("invalid configuration")?;
        config.session.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else `./idcas.toml` if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config =
            Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))?;
        debug!(path = %path.display(), root = %config.store.root.display(), "config loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idcas_crypto::AlgorithmId;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn parses_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            [store]
            root = "/var/lib/idcas"
            algorithm = "sha256"

            [session]
            inactivity_timeout_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.store.root, PathBuf::from("/var/lib/idcas"));
        assert_eq!(config.store.algorithm, AlgorithmId::Sha256);
        assert_eq!(config.session.inactivity_timeout_secs, 120);
        assert_eq!(config.session.channel_capacity, 64);
    }

    #[test]
    fn invalid_session_values_are_rejected() {
        assert!(AppConfig::from_toml_str("[session]\nliveness_interval_secs = 0\n").is_err());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idcas.toml");
        std::fs::write(&path, "[store]\nalgorithm = \"sha3-256\"\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store.algorithm, AlgorithmId::Sha3Placeholder);
    }
}
