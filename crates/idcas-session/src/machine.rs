use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use idcas_store::StorageBackend;
use idcas_types::{ChangeReason, LoginPhase, LoginResult, LoginState, LoginStateChange, PublicKey};

use crate::auth::{AuthenticatedUser, Authenticator, Credentials};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::persist::{InMemorySessionStore, PersistedSession, SessionPersistence};
use crate::sync::{SessionId, SyncEnvelope, SyncHub};
use crate::tracking::IdentityTrackingView;

/// Owner of one session's authoritative [`LoginState`].
///
/// | From | Operation | To |
/// |---|---|---|
/// | LoggedOut, TimedOut | [`login`](Self::login) | LoggedIn |
/// | LoggedIn, TimedOut | [`logout`](Self::logout) | LoggedOut |
/// | LoggedIn | [`lock`](Self::lock) | Locked |
/// | Locked | [`unlock`](Self::unlock) with the same key | LoggedIn |
/// | LoggedIn, Locked | [`check_timeout`](Self::check_timeout) past the threshold | TimedOut |
/// | LoggedIn | [`record_activity`](Self::record_activity) | LoggedIn |
/// | any | [`apply_sync`](Self::apply_sync) | the mirrored state |
/// | LoggedOut | [`restore`](Self::restore) | LoggedIn |
///
/// Any other combination is [`SessionError::InvalidTransition`] and changes
/// nothing. Transitions are serialized by one async mutex in arrival order.
/// Each one is broadcast to [`subscribe`](Self::subscribe)rs; locally
/// originated ones are also published to the attached [`SyncHub`].
pub struct LoginStateMachine<B: StorageBackend> {
    id: SessionId,
    authenticator: Arc<dyn Authenticator>,
    tracking: IdentityTrackingView<B>,
    persistence: Arc<dyn SessionPersistence>,
    inactivity_timeout: Duration,
    state: Mutex<LoginState>,
    changes: broadcast::Sender<LoginStateChange>,
    hub: RwLock<Option<SyncHub>>,
}

fn invalid(from: LoginPhase, operation: &'static str) -> SessionError {
    SessionError::InvalidTransition { from, operation }
}

/// Outcome of running the authenticator.
enum Checked {
    Accepted(AuthenticatedUser),
    Rejected(LoginResult),
}

impl<B: StorageBackend> LoginStateMachine<B> {
    /// A logged-out machine with in-memory persistence.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        tracking: IdentityTrackingView<B>,
        config: &SessionConfig,
    ) -> Self {
        let (changes, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            id: SessionId::new(),
            authenticator,
            tracking,
            persistence: Arc::new(InMemorySessionStore::new()),
            inactivity_timeout: config.inactivity_timeout(),
            state: Mutex::new(LoginState::logged_out()),
            changes,
            hub: RwLock::new(None),
        }
    }

    /// Replace the session persistence.
    pub fn with_persistence(mut self, persistence: Arc<dyn SessionPersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> LoginState {
        self.state.lock().await.clone()
    }

    /// An independent receiver of every subsequent transition.
    pub fn subscribe(&self) -> broadcast::Receiver<LoginStateChange> {
        self.changes.subscribe()
    }

    // -----------------------------------------------------------------------
    // Login / logout
    // -----------------------------------------------------------------------

    pub async fn login(&self, credentials: &Credentials) -> SessionResult<LoginResult> {
        self.login_at(credentials, Utc::now()).await
    }

    /// Authenticate and enter LoggedIn.
    ///
    /// A rejected credential yields a failed [`LoginResult`] and leaves the
    /// state untouched. Whether the user is new is decided here, from the
    /// content already linked to the key, and kept for the whole session.
    pub async fn login_at(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> SessionResult<LoginResult> {
        let mut state = self.state.lock().await;
        if !matches!(state.phase, LoginPhase::LoggedOut | LoginPhase::TimedOut) {
            return Err(invalid(state.phase, "login"));
        }

        let user = match self.check(credentials, "login").await? {
            Checked::Accepted(user) => user,
            Checked::Rejected(result) => return Ok(result),
        };

        let info = self.tracking.track_key(&user.public_key).await?;
        let next = LoginState {
            phase: LoginPhase::LoggedIn,
            username: user.username,
            public_key_base64: Some(user.public_key.to_base64()),
            login_time: Some(now),
            last_activity: Some(now),
            is_new_user: info.is_new_user(),
        };
        self.persistence
            .save(&PersistedSession::from_state(&next)?)
            .await?;
        self.commit(&mut state, next.clone(), ChangeReason::Login, now);
        Ok(LoginResult::succeeded(next, Some(info)))
    }

    pub async fn logout(&self) -> SessionResult<LoginStateChange> {
        self.logout_at(Utc::now()).await
    }

    pub async fn logout_at(&self, now: DateTime<Utc>) -> SessionResult<LoginStateChange> {
        let mut state = self.state.lock().await;
        if !matches!(state.phase, LoginPhase::LoggedIn | LoginPhase::TimedOut) {
            return Err(invalid(state.phase, "logout"));
        }
        self.clear_persisted().await?;
        Ok(self.commit(&mut state, LoginState::logged_out(), ChangeReason::Logout, now))
    }

    // -----------------------------------------------------------------------
    // Lock / unlock
    // -----------------------------------------------------------------------

    pub async fn lock(&self) -> SessionResult<LoginStateChange> {
        self.lock_at(Utc::now()).await
    }

    /// Lock the session. The persisted record is dropped, so a restart while
    /// locked requires a fresh login. If it cannot be dropped the session
    /// stays LoggedIn and the persistence error is returned.
    pub async fn lock_at(&self, now: DateTime<Utc>) -> SessionResult<LoginStateChange> {
        let mut state = self.state.lock().await;
        if state.phase != LoginPhase::LoggedIn {
            return Err(invalid(state.phase, "lock"));
        }
        let next = LoginState {
            phase: LoginPhase::Locked,
            ..state.clone()
        };
        self.clear_persisted().await?;
        Ok(self.commit(&mut state, next, ChangeReason::Lock, now))
    }

    pub async fn unlock(&self, credentials: &Credentials) -> SessionResult<LoginResult> {
        self.unlock_at(credentials, Utc::now()).await
    }

    /// Re-authenticate the locked user.
    ///
    /// Credentials for any other key are rejected. A session already past
    /// the inactivity threshold times out instead of unlocking.
    pub async fn unlock_at(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> SessionResult<LoginResult> {
        let mut state = self.state.lock().await;
        if state.phase != LoginPhase::Locked {
            return Err(invalid(state.phase, "unlock"));
        }

        let user = match self.check(credentials, "unlock").await? {
            Checked::Accepted(user) => user,
            Checked::Rejected(result) => return Ok(result),
        };
        if state.public_key_base64.as_deref() != Some(user.public_key.to_base64().as_str()) {
            warn!(session = %self.id, key = %user.public_key.short_id(), "unlock with another key rejected");
            return Ok(LoginResult::failed("credentials belong to a different key"));
        }
        if self.is_expired(&state, now) {
            self.time_out(&mut state, now).await?;
            return Ok(LoginResult::failed("session timed out"));
        }

        let next = LoginState {
            phase: LoginPhase::LoggedIn,
            last_activity: Some(now),
            ..state.clone()
        };
        self.persistence
            .save(&PersistedSession::from_state(&next)?)
            .await?;
        self.commit(&mut state, next.clone(), ChangeReason::Unlock, now);
        Ok(LoginResult::succeeded(next, None))
    }

    // -----------------------------------------------------------------------
    // Activity and timeout
    // -----------------------------------------------------------------------

    pub async fn check_timeout(&self) -> SessionResult<Option<LoginStateChange>> {
        self.check_timeout_at(Utc::now()).await
    }

    /// Time the session out if it has been inactive past the threshold.
    ///
    /// Returns `None` when nothing changed, including in phases that cannot
    /// time out. A failure to clear the persisted record is returned after
    /// the in-memory session has timed out.
    pub async fn check_timeout_at(
        &self,
        now: DateTime<Utc>,
    ) -> SessionResult<Option<LoginStateChange>> {
        let mut state = self.state.lock().await;
        if !matches!(state.phase, LoginPhase::LoggedIn | LoginPhase::Locked)
            || !self.is_expired(&state, now)
        {
            return Ok(None);
        }
        self.time_out(&mut state, now).await.map(Some)
    }

    pub async fn record_activity(&self) -> SessionResult<LoginStateChange> {
        self.record_activity_at(Utc::now()).await
    }

    /// Extend the session, or time it out if the threshold already passed.
    pub async fn record_activity_at(&self, now: DateTime<Utc>) -> SessionResult<LoginStateChange> {
        let mut state = self.state.lock().await;
        if state.phase != LoginPhase::LoggedIn {
            return Err(invalid(state.phase, "record activity"));
        }
        if self.is_expired(&state, now) {
            return self.time_out(&mut state, now).await;
        }

        let next = LoginState {
            last_activity: Some(now),
            ..state.clone()
        };
        self.persistence
            .save(&PersistedSession::from_state(&next)?)
            .await?;
        Ok(self.commit(&mut state, next, ChangeReason::SessionExtended, now))
    }

    fn is_expired(&self, state: &LoginState, now: DateTime<Utc>) -> bool {
        state
            .inactive_for(now)
            .is_some_and(|idle| idle > self.inactivity_timeout)
    }

    /// Timeout always commits. The persisted record is expired by now, so a
    /// failed clear cannot resurrect the session and is reported afterwards.
    async fn time_out(
        &self,
        state: &mut LoginState,
        now: DateTime<Utc>,
    ) -> SessionResult<LoginStateChange> {
        let next = LoginState {
            phase: LoginPhase::TimedOut,
            ..state.clone()
        };
        let cleared = self.clear_persisted().await;
        let change = self.commit(state, next, ChangeReason::Timeout, now);
        cleared.map(|()| change)
    }

    // -----------------------------------------------------------------------
    // Restore and sync
    // -----------------------------------------------------------------------

    pub async fn restore(&self) -> SessionResult<Option<LoginStateChange>> {
        self.restore_at(Utc::now()).await
    }

    /// Resume a persisted session.
    ///
    /// Returns `None` when there is no record, or when the record is expired
    /// or unreadable, in which case it is cleared. Failing to read or clear
    /// the slot is an error.
    pub async fn restore_at(&self, now: DateTime<Utc>) -> SessionResult<Option<LoginStateChange>> {
        let mut state = self.state.lock().await;
        if state.phase != LoginPhase::LoggedOut {
            return Err(invalid(state.phase, "restore"));
        }

        let record = match self.persistence.load().await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(SessionError::Serialization(reason)) => {
                warn!(session = %self.id, %reason, "discarding undecodable persisted session");
                self.clear_persisted().await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if record.is_expired(now, self.inactivity_timeout) {
            info!(session = %self.id, "persisted session expired");
            self.clear_persisted().await?;
            return Ok(None);
        }
        if let Err(e) = PublicKey::from_base64(&record.public_key_base64) {
            warn!(session = %self.id, error = %e, "discarding persisted session with malformed key");
            self.clear_persisted().await?;
            return Ok(None);
        }

        Ok(Some(self.commit(
            &mut state,
            record.to_state(),
            ChangeReason::SessionRestored,
            now,
        )))
    }

    /// Mirror a change made by another session.
    ///
    /// Returns `None` if this session already holds the mirrored state.
    /// Mirrored changes are broadcast locally but never re-published.
    pub async fn apply_sync(&self, change: &LoginStateChange) -> Option<LoginStateChange> {
        let mut state = self.state.lock().await;
        if *state == change.current {
            return None;
        }
        Some(self.transition(
            &mut state,
            change.current.clone(),
            ChangeReason::TabSync,
            Utc::now(),
            false,
        ))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn check(&self, credentials: &Credentials, operation: &str) -> SessionResult<Checked> {
        match self.authenticator.authenticate(credentials).await {
            Ok(user) => Ok(Checked::Accepted(user)),
            Err(e) if e.is_rejection() => {
                warn!(session = %self.id, operation, error = %e, "credentials rejected");
                Ok(Checked::Rejected(LoginResult::failed(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }

    async fn clear_persisted(&self) -> SessionResult<()> {
        self.persistence.clear().await.inspect_err(|e| {
            warn!(session = %self.id, error = %e, "failed to clear persisted session");
        })
    }

    fn commit(
        &self,
        state: &mut LoginState,
        next: LoginState,
        reason: ChangeReason,
        now: DateTime<Utc>,
    ) -> LoginStateChange {
        self.transition(state, next, reason, now, true)
    }

    fn transition(
        &self,
        state: &mut LoginState,
        next: LoginState,
        reason: ChangeReason,
        now: DateTime<Utc>,
        publish: bool,
    ) -> LoginStateChange {
        let previous = std::mem::replace(state, next);
        let change = LoginStateChange::new(previous, state.clone(), reason, now);
        info!(
            session = %self.id,
            from = %change.previous.phase,
            to = %change.current.phase,
            %reason,
            "login state changed"
        );

        // Sending fails only when nobody subscribed.
        let _ = self.changes.send(change.clone());
        if publish {
            self.publish(&change);
        }
        change
    }

    fn publish(&self, change: &LoginStateChange) {
        let hub = self.hub.read().expect("lock poisoned").clone();
        if let Some(hub) = hub {
            let envelope = SyncEnvelope {
                origin: self.id,
                change: change.clone(),
            };
            if let Err(e) = hub.publish(&envelope) {
                warn!(session = %self.id, error = %e, "failed to publish state change");
            }
        }
    }
}

impl<B: StorageBackend + 'static> LoginStateMachine<B> {
    /// Join `hub`: publish local changes to it and mirror everyone else's.
    ///
    /// The listener holds only a weak reference and stops once the machine
    /// is dropped.
    pub fn attach_sync(self: &Arc<Self>, hub: &SyncHub) -> JoinHandle<()> {
        *self.hub.write().expect("lock poisoned") = Some(hub.clone());
        let mut stream = hub.subscribe();
        let machine = Arc::downgrade(self);
        let id = self.id;

        tokio::spawn(async move {
            loop {
                let text = match stream.recv().await {
                    Ok(text) => text,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session = %id, skipped, "sync receiver lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let envelope = match SyncEnvelope::decode(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(session = %id, error = %e, "dropping undecodable sync message");
                        continue;
                    }
                };
                if envelope.origin == id {
                    continue;
                }
                let Some(machine) = machine.upgrade() else {
                    break;
                };
                machine.apply_sync(&envelope.change).await;
            }
            debug!(session = %id, "sync listener stopped");
        })
    }
}

impl<B: StorageBackend> std::fmt::Debug for LoginStateMachine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginStateMachine")
            .field("id", &self.id)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::TimeZone;
    use tokio::sync::broadcast::error::TryRecvError;

    use idcas_crypto::{HashService, SerializerRegistry, SigningKey};
    use idcas_store::{ContentStore, InMemoryBackend};

    use super::*;
    use crate::auth::SignatureAuthenticator;
    use crate::persist::FileSessionStore;

    type Machine = LoginStateMachine<InMemoryBackend>;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    async fn store() -> Arc<ContentStore<InMemoryBackend>> {
        let hasher = HashService::blake3(SerializerRegistry::new());
        Arc::new(ContentStore::open(InMemoryBackend::new(), hasher).await.unwrap())
    }

    fn machine_on(store: &Arc<ContentStore<InMemoryBackend>>) -> Machine {
        LoginStateMachine::new(
            Arc::new(SignatureAuthenticator),
            IdentityTrackingView::new(store.clone()),
            &SessionConfig::default(),
        )
    }

    async fn machine() -> Machine {
        machine_on(&store().await)
    }

    fn creds(key: &SigningKey) -> Credentials {
        Credentials::sign(key, Some("alice".into()), "challenge")
    }

    async fn logged_in(key: &SigningKey) -> Machine {
        let m = machine().await;
        assert!(m.login_at(&creds(key), t0()).await.unwrap().success());
        m
    }

    #[tokio::test]
    async fn new_key_login_is_new_user() {
        let m = machine().await;
        let key = SigningKey::generate();
        let result = m.login_at(&creds(&key), t0()).await.unwrap();

        assert!(result.success());
        assert!(result.is_new_user());
        assert!(result.error_message().is_none());
        let info = result.user_info().unwrap();
        assert!(!info.exists);
        assert_eq!(info.content_count, 0);

        let state = m.state().await;
        assert!(state.is_logged_in());
        assert_eq!(state.username.as_deref(), Some("alice"));
        assert_eq!(state.public_key_base64, Some(key.public_key().to_base64()));
        assert_eq!(state.login_time, Some(t0()));
        assert_eq!(result.session(), Some(&state));
    }

    #[tokio::test]
    async fn key_with_content_is_returning_user() {
        let store = store().await;
        let key = SigningKey::generate();
        store.put_owned(b"profile", &key.public_key()).await.unwrap();
        store.put_owned(b"avatar", &key.public_key()).await.unwrap();

        let m = machine_on(&store);
        let result = m.login_at(&creds(&key), t0()).await.unwrap();
        assert!(result.success());
        assert!(!result.is_new_user());
        assert_eq!(result.user_info().unwrap().content_count, 2);
        assert!(!m.state().await.is_new_user);
    }

    #[tokio::test]
    async fn rejected_login_changes_nothing() {
        let m = machine().await;
        let mut changes = m.subscribe();
        let key = SigningKey::generate();
        let mut bad = creds(&key);
        bad.challenge = "tampered".into();

        let result = m.login_at(&bad, t0()).await.unwrap();
        assert!(!result.success());
        assert!(result.error_message().unwrap().contains("authentication failed"));
        assert!(result.session().is_none());
        assert_eq!(m.state().await, LoginState::logged_out());
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn malformed_key_login_is_failed_result() {
        let m = machine().await;
        let mut bad = creds(&SigningKey::generate());
        bad.public_key_base64 = "not-a-key".into();
        let result = m.login_at(&bad, t0()).await.unwrap();
        assert!(!result.success());
        assert!(result.error_message().unwrap().contains("malformed public key"));
        assert_eq!(m.state().await.phase, LoginPhase::LoggedOut);
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let key = SigningKey::generate();
        let m = machine().await;
        assert!(matches!(
            m.lock_at(t0()).await,
            Err(SessionError::InvalidTransition { from: LoginPhase::LoggedOut, operation: "lock" })
        ));
        assert!(m.logout_at(t0()).await.is_err());
        assert!(m.record_activity_at(t0()).await.is_err());
        assert!(m.unlock_at(&creds(&key), t0()).await.is_err());

        m.login_at(&creds(&key), t0()).await.unwrap();
        assert!(matches!(
            m.login_at(&creds(&key), t0()).await,
            Err(SessionError::InvalidTransition { from: LoginPhase::LoggedIn, .. })
        ));
        assert!(m.unlock_at(&creds(&key), t0()).await.is_err());
        assert!(m.restore_at(t0()).await.is_err());

        m.lock_at(t0()).await.unwrap();
        assert!(matches!(
            m.logout_at(t0()).await,
            Err(SessionError::InvalidTransition { from: LoginPhase::Locked, operation: "logout" })
        ));
        assert!(m.lock_at(t0()).await.is_err());
        assert!(m.record_activity_at(t0()).await.is_err());
        assert!(m.state().await.is_locked());
    }

    #[tokio::test]
    async fn lock_and_unlock_with_same_key() {
        let key = SigningKey::generate();
        let m = logged_in(&key).await;
        let later = t0() + Duration::minutes(5);

        let change = m.lock_at(later).await.unwrap();
        assert_eq!(change.reason, ChangeReason::Lock);
        assert!(change.current.is_locked());

        let other = SigningKey::generate();
        let rejected = m.unlock_at(&creds(&other), later).await.unwrap();
        assert!(!rejected.success());
        assert!(m.state().await.is_locked());

        let result = m.unlock_at(&creds(&key), later).await.unwrap();
        assert!(result.success());
        let state = m.state().await;
        assert!(state.is_logged_in());
        assert_eq!(state.login_time, Some(t0()));
        assert_eq!(state.last_activity, Some(later));
        assert!(state.is_new_user);
    }

    #[tokio::test]
    async fn inactivity_times_out() {
        let key = SigningKey::generate();
        let m = logged_in(&key).await;

        assert!(m.check_timeout_at(t0() + Duration::minutes(30)).await.unwrap().is_none());
        let change = m
            .check_timeout_at(t0() + Duration::minutes(31))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.reason, ChangeReason::Timeout);
        assert!(m.state().await.is_timed_out());
        assert!(m.check_timeout_at(t0() + Duration::hours(2)).await.unwrap().is_none());

        let again = m.login_at(&creds(&key), t0() + Duration::hours(1)).await.unwrap();
        assert!(again.success());
    }

    #[tokio::test]
    async fn locked_session_times_out() {
        let key = SigningKey::generate();
        let m = logged_in(&key).await;
        m.lock_at(t0()).await.unwrap();
        let change = m
            .check_timeout_at(t0() + Duration::hours(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.previous.phase, LoginPhase::Locked);
        assert_eq!(change.current.phase, LoginPhase::TimedOut);

        let change = m.logout_at(t0() + Duration::hours(2)).await.unwrap();
        assert_eq!(change.current, LoginState::logged_out());
    }

    #[tokio::test]
    async fn late_unlock_times_out() {
        let key = SigningKey::generate();
        let m = logged_in(&key).await;
        m.lock_at(t0()).await.unwrap();
        let result = m.unlock_at(&creds(&key), t0() + Duration::hours(1)).await.unwrap();
        assert!(!result.success());
        assert!(m.state().await.is_timed_out());
    }

    #[tokio::test]
    async fn activity_extends_until_threshold() {
        let key = SigningKey::generate();
        let m = logged_in(&key).await;

        let t1 = t0() + Duration::minutes(20);
        let change = m.record_activity_at(t1).await.unwrap();
        assert_eq!(change.reason, ChangeReason::SessionExtended);
        assert_eq!(m.state().await.last_activity, Some(t1));

        let t2 = t1 + Duration::minutes(25);
        assert!(m.check_timeout_at(t2).await.unwrap().is_none());

        let change = m.record_activity_at(t1 + Duration::minutes(45)).await.unwrap();
        assert_eq!(change.reason, ChangeReason::Timeout);
        assert!(m.state().await.is_timed_out());
    }

    #[tokio::test]
    async fn subscribers_see_every_transition_in_order() {
        let key = SigningKey::generate();
        let m = machine().await;
        let mut a = m.subscribe();
        let mut b = m.subscribe();

        m.login_at(&creds(&key), t0()).await.unwrap();
        m.lock_at(t0()).await.unwrap();
        m.unlock_at(&creds(&key), t0()).await.unwrap();
        m.logout_at(t0()).await.unwrap();

        for rx in [&mut a, &mut b] {
            let reasons: Vec<_> = (0..4).map(|_| rx.try_recv().unwrap().reason).collect();
            assert_eq!(
                reasons,
                vec![
                    ChangeReason::Login,
                    ChangeReason::Lock,
                    ChangeReason::Unlock,
                    ChangeReason::Logout
                ]
            );
        }
    }

    #[tokio::test]
    async fn persisted_session_is_restored() {
        let store = store().await;
        let persistence: Arc<dyn SessionPersistence> = Arc::new(InMemorySessionStore::new());
        let key = SigningKey::generate();

        let first = machine_on(&store).with_persistence(persistence.clone());
        first.login_at(&creds(&key), t0()).await.unwrap();
        assert!(persistence.load().await.unwrap().is_some());

        let second = machine_on(&store).with_persistence(persistence.clone());
        let change = second
            .restore_at(t0() + Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.reason, ChangeReason::SessionRestored);
        assert_eq!(change.current, first.state().await);

        second.logout_at(t0()).await.unwrap();
        assert!(persistence.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_persisted_session_is_discarded() {
        let store = store().await;
        let persistence: Arc<dyn SessionPersistence> = Arc::new(InMemorySessionStore::new());
        let key = SigningKey::generate();

        machine_on(&store)
            .with_persistence(persistence.clone())
            .login_at(&creds(&key), t0())
            .await
            .unwrap();

        let m = machine_on(&store).with_persistence(persistence.clone());
        let mut changes = m.subscribe();
        assert!(m.restore_at(t0() + Duration::hours(1)).await.unwrap().is_none());
        assert_eq!(m.state().await.phase, LoginPhase::LoggedOut);
        assert!(persistence.load().await.unwrap().is_none());
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn lock_drops_persisted_session() {
        let store = store().await;
        let persistence: Arc<dyn SessionPersistence> = Arc::new(InMemorySessionStore::new());
        let key = SigningKey::generate();
        let m = machine_on(&store).with_persistence(persistence.clone());

        m.login_at(&creds(&key), t0()).await.unwrap();
        m.lock_at(t0()).await.unwrap();
        assert!(persistence.load().await.unwrap().is_none());
        m.unlock_at(&creds(&key), t0()).await.unwrap();
        assert!(persistence.load().await.unwrap().is_some());
    }

    /// Persistence whose `clear` always fails, leaving the record in place.
    #[derive(Default)]
    struct StuckSlot {
        inner: InMemorySessionStore,
    }

    #[async_trait::async_trait]
    impl SessionPersistence for StuckSlot {
        async fn load(&self) -> SessionResult<Option<PersistedSession>> {
            self.inner.load().await
        }

        async fn save(&self, session: &PersistedSession) -> SessionResult<()> {
            self.inner.save(session).await
        }

        async fn clear(&self) -> SessionResult<()> {
            Err(SessionError::Persistence("read-only slot".into()))
        }
    }

    #[tokio::test]
    async fn lock_fails_when_record_cannot_be_cleared() {
        let store = store().await;
        let persistence: Arc<dyn SessionPersistence> = Arc::new(StuckSlot::default());
        let key = SigningKey::generate();
        let m = machine_on(&store).with_persistence(persistence.clone());
        m.login_at(&creds(&key), t0()).await.unwrap();
        let mut changes = m.subscribe();

        assert!(matches!(m.lock_at(t0()).await, Err(SessionError::Persistence(_))));
        assert!(m.state().await.is_logged_in());
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));

        assert!(matches!(m.logout_at(t0()).await, Err(SessionError::Persistence(_))));
        assert!(m.state().await.is_logged_in());
        assert!(persistence.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn timeout_commits_even_if_record_cannot_be_cleared() {
        let store = store().await;
        let persistence: Arc<dyn SessionPersistence> = Arc::new(StuckSlot::default());
        let key = SigningKey::generate();
        let m = machine_on(&store).with_persistence(persistence.clone());
        m.login_at(&creds(&key), t0()).await.unwrap();

        let late = t0() + Duration::hours(1);
        assert!(matches!(
            m.check_timeout_at(late).await,
            Err(SessionError::Persistence(_))
        ));
        assert!(m.state().await.is_timed_out());

        // The stale record outlives the timeout but is never restored.
        let restarted = machine_on(&store).with_persistence(persistence.clone());
        assert!(restarted.restore_at(late).await.is_err());
        assert_eq!(restarted.state().await.phase, LoginPhase::LoggedOut);
    }

    #[tokio::test]
    async fn undecodable_session_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"{garbage").await.unwrap();

        let m = machine().await.with_persistence(Arc::new(FileSessionStore::new(&path)));
        let mut changes = m.subscribe();
        assert!(m.restore_at(t0()).await.unwrap().is_none());
        assert!(!path.exists());
        assert!(m.restore_at(t0()).await.unwrap().is_none());
        assert_eq!(m.state().await.phase, LoginPhase::LoggedOut);
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn apply_sync_mirrors_without_duplicates() {
        let key = SigningKey::generate();
        let source = logged_in(&key).await;
        let change = source.lock_at(t0()).await.unwrap();

        let mirror = machine().await;
        let applied = mirror.apply_sync(&change).await.unwrap();
        assert_eq!(applied.reason, ChangeReason::TabSync);
        assert_eq!(applied.previous, LoginState::logged_out());
        assert_eq!(mirror.state().await, source.state().await);
        assert!(mirror.apply_sync(&change).await.is_none());
    }

    async fn next_change(rx: &mut broadcast::Receiver<LoginStateChange>) -> LoginStateChange {
        tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for state change")
            .unwrap()
    }

    #[tokio::test]
    async fn attached_sessions_stay_in_step() {
        let store = store().await;
        let hub = SyncHub::new(16);
        let a = Arc::new(machine_on(&store));
        let b = Arc::new(machine_on(&store));
        a.attach_sync(&hub);
        b.attach_sync(&hub);

        let mut a_changes = a.subscribe();
        let mut b_changes = b.subscribe();
        let key = SigningKey::generate();

        a.login_at(&creds(&key), t0()).await.unwrap();
        let mirrored = next_change(&mut b_changes).await;
        assert_eq!(mirrored.reason, ChangeReason::TabSync);
        assert!(mirrored.current.is_logged_in());
        assert_eq!(b.state().await, a.state().await);

        b.lock_at(t0()).await.unwrap();
        assert_eq!(next_change(&mut b_changes).await.reason, ChangeReason::Lock);
        assert_eq!(next_change(&mut a_changes).await.reason, ChangeReason::Login);
        let mirrored = next_change(&mut a_changes).await;
        assert_eq!(mirrored.reason, ChangeReason::TabSync);
        assert!(a.state().await.is_locked());

        // Mirrored changes are not echoed back.
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(matches!(a_changes.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(b_changes.try_recv(), Err(TryRecvError::Empty)));
    }
}
