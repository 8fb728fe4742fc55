use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use idcas_types::{LoginPhase, LoginState};

use crate::error::{SessionError, SessionResult};

/// The part of a logged-in session that survives a restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub public_key_base64: String,
    pub username: Option<String>,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_new_user: bool,
}

impl PersistedSession {
    /// Capture an authenticated state. Fails if the state has no identity.
    pub fn from_state(state: &LoginState) -> SessionResult<Self> {
        match (&state.public_key_base64, state.login_time, state.last_activity) {
            (Some(key), Some(login_time), Some(last_activity)) => Ok(Self {
                public_key_base64: key.clone(),
                username: state.username.clone(),
                login_time,
                last_activity,
                is_new_user: state.is_new_user,
            }),
            _ => Err(SessionError::InvalidInput(format!(
                "{} state has no session to persist",
                state.phase
            ))),
        }
    }

    /// The logged-in state this record restores to.
    pub fn to_state(&self) -> LoginState {
        LoginState {
            phase: LoginPhase::LoggedIn,
            username: self.username.clone(),
            public_key_base64: Some(self.public_key_base64.clone()),
            login_time: Some(self.login_time),
            last_activity: Some(self.last_activity),
            is_new_user: self.is_new_user,
        }
    }

    /// Whether the inactivity since `last_activity` exceeds `timeout`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }
}

/// Durable slot holding at most one persisted session.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// The stored session, if any.
    async fn load(&self) -> SessionResult<Option<PersistedSession>>;

    /// Replace the stored session.
    async fn save(&self, session: &PersistedSession) -> SessionResult<()>;

    /// Remove the stored session. Clearing an empty slot is a no-op.
    async fn clear(&self) -> SessionResult<()>;
}

/// Process-local persistence, lost on exit.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    slot: RwLock<Option<PersistedSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionPersistence for InMemorySessionStore {
    async fn load(&self) -> SessionResult<Option<PersistedSession>> {
        Ok(self.slot.read().expect("lock poisoned").clone())
    }

    async fn save(&self, session: &PersistedSession) -> SessionResult<()> {
        *self.slot.write().expect("lock poisoned") = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> SessionResult<()> {
        self.slot.write().expect("lock poisoned").take();
        Ok(())
    }
}

/// JSON file persistence. Saves replace the file atomically.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn persistence_error(e: impl std::fmt::Display) -> SessionError {
    SessionError::Persistence(e.to_string())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl SessionPersistence for FileSessionStore {
    async fn load(&self) -> SessionResult<Option<PersistedSession>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence_error(e)),
        };
        let session = serde_json::from_slice(&data)
            .map_err(|e| SessionError::Serialization(format!("{}: {e}", self.path.display())))?;
        Ok(Some(session))
    }

    async fn save(&self, session: &PersistedSession) -> SessionResult<()> {
        let bytes = serde_json::to_vec_pretty(session)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(persistence_error)?
            .map_err(persistence_error)?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn clear(&self) -> SessionResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(persistence_error(e)),
        }
    }
}
