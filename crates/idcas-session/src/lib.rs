//! Login sessions for IDCAS.
//!
//! A [`LoginStateMachine`] owns the authoritative [`LoginState`] of one
//! session and moves it between logged-out, logged-in, locked and timed-out
//! phases. Logins are checked by an [`Authenticator`]; whether the user is
//! new is decided by the [`IdentityTrackingView`] over the content store.
//!
//! Sessions observing the same user stay in step through a [`SyncHub`]:
//! every locally originated transition is published as a JSON
//! [`SyncEnvelope`], and attached machines mirror each other's changes.
//! Inactivity timeouts come only from the periodic liveness monitor.
//!
//! [`LoginState`]: idcas_types::LoginState

pub mod auth;
pub mod config;
pub mod error;
pub mod liveness;
pub mod machine;
pub mod persist;
pub mod sync;
pub mod tracking;

pub use auth::{AuthenticatedUser, Authenticator, Credentials, SignatureAuthenticator};
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use liveness::spawn_liveness_monitor;
pub use machine::LoginStateMachine;
pub use persist::{FileSessionStore, InMemorySessionStore, PersistedSession, SessionPersistence};
pub use sync::{SessionId, SyncEnvelope, SyncHub};
pub use tracking::IdentityTrackingView;
