use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use idcas_types::LoginStateChange;

use crate::error::{SessionError, SessionResult};

/// Identity of one state machine instance on a [`SyncHub`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire form of a state change shared between sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub origin: SessionId,
    pub change: LoginStateChange,
}

impl SyncEnvelope {
    pub fn encode(&self) -> SessionResult<String> {
        serde_json::to_string(self).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    pub fn decode(s: &str) -> SessionResult<Self> {
        serde_json::from_str(s).map_err(|e| SessionError::Serialization(e.to_string()))
    }
}

/// Receiver of serialized envelopes.
pub type SyncStream = broadcast::Receiver<String>;

/// In-process channel connecting sessions of the same user.
///
/// Carries JSON-encoded [`SyncEnvelope`]s, so anything that can move text
/// between sessions can stand in for it. Cloning yields another handle on the
/// same channel.
#[derive(Clone, Debug)]
pub struct SyncHub {
    sender: broadcast::Sender<String>,
}

impl SyncHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an envelope, returning how many receivers got it.
    pub fn publish(&self, envelope: &SyncEnvelope) -> SessionResult<usize> {
        let text = envelope.encode()?;
        // No receivers is not an error: nobody else is attached yet.
        Ok(self.sender.send(text).unwrap_or(0))
    }

    pub fn subscribe(&self) -> SyncStream {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
