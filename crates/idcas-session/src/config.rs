use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Configuration for login sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity after which a logged-in or locked session times out.
    pub inactivity_timeout_secs: u64,
    /// Period of the liveness check.
    pub liveness_interval_secs: u64,
    /// Capacity of the state-change and sync broadcast channels.
    pub channel_capacity: usize,
    /// Where the session survives restarts. `None` keeps it in memory only.
    pub session_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 30 * 60,
            liveness_interval_secs: 30,
            channel_capacity: 64,
            session_file: None,
        }
    }
}

impl SessionConfig {
    /// Parse from TOML and validate. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> SessionResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| SessionError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session machinery cannot run with.
    pub fn validate(&self) -> SessionResult<()> {
        if self.inactivity_timeout_secs == 0 {
            return Err(SessionError::Configuration(
                "inactivity_timeout_secs must be positive".into(),
            ));
        }
        if self.timeout_delta().is_none() {
            return Err(SessionError::Configuration(format!(
                "inactivity_timeout_secs {} is out of range",
                self.inactivity_timeout_secs
            )));
        }
        if self.liveness_interval_secs == 0 {
            return Err(SessionError::Configuration(
                "liveness_interval_secs must be positive".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(SessionError::Configuration(
                "channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The inactivity threshold. Out-of-range values saturate; [`validate`](Self::validate)
    /// rejects them.
    pub fn inactivity_timeout(&self) -> chrono::Duration {
        self.timeout_delta().unwrap_or(chrono::Duration::MAX)
    }

    fn timeout_delta(&self) -> Option<chrono::Duration> {
        i64::try_from(self.inactivity_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }
}
