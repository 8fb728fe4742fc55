use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::tracking::UserTrackingInfo;

/// Phase of a login session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginPhase {
    /// No authenticated user. Initial phase.
    #[default]
    LoggedOut,
    /// Authenticated and active.
    LoggedIn,
    /// Authenticated but locked pending passphrase re-entry.
    Locked,
    /// Inactivity exceeded the threshold; re-authentication required.
    TimedOut,
}

impl fmt::Display for LoginPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged-out"),
            Self::LoggedIn => write!(f, "logged-in"),
            Self::Locked => write!(f, "locked"),
            Self::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Why a login state transition happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeReason {
    Login,
    Logout,
    Lock,
    Unlock,
    Timeout,
    SessionExtended,
    TabSync,
    SessionRestored,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::Logout => write!(f, "logout"),
            Self::Lock => write!(f, "lock"),
            Self::Unlock => write!(f, "unlock"),
            Self::Timeout => write!(f, "timeout"),
            Self::SessionExtended => write!(f, "session-extended"),
            Self::TabSync => write!(f, "tab-sync"),
            Self::SessionRestored => write!(f, "session-restored"),
        }
    }
}

/// Authoritative state of one login session.
///
/// The default value is the logged-out state with every optional field empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    pub phase: LoginPhase,
    pub username: Option<String>,
    pub public_key_base64: Option<String>,
    pub login_time: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    /// Fixed at the Login transition for the lifetime of the session.
    pub is_new_user: bool,
}

impl LoginState {
    /// The logged-out default.
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn is_logged_in(&self) -> bool {
        self.phase == LoginPhase::LoggedIn
    }

    pub fn is_locked(&self) -> bool {
        self.phase == LoginPhase::Locked
    }

    pub fn is_timed_out(&self) -> bool {
        self.phase == LoginPhase::TimedOut
    }

    /// Time since the last recorded activity, if any.
    pub fn inactive_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_activity.map(|last| now - last)
    }
}

/// Immutable record of a single state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginStateChange {
    pub previous: LoginState,
    pub current: LoginState,
    pub reason: ChangeReason,
    pub timestamp: DateTime<Utc>,
}

impl LoginStateChange {
    pub fn new(
        previous: LoginState,
        current: LoginState,
        reason: ChangeReason,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            previous,
            current,
            reason,
            timestamp,
        }
    }
}

/// Outcome of a login or unlock attempt.
///
/// A successful result always carries the session and never an error
/// message; a failed result always carries an error message and never a
/// session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLoginResult")]
pub struct LoginResult {
    success: bool,
    is_new_user: bool,
    error_message: Option<String>,
    session: Option<LoginState>,
    user_info: Option<UserTrackingInfo>,
}

impl LoginResult {
    /// A successful attempt. `is_new_user` is taken from the session.
    pub fn succeeded(session: LoginState, user_info: Option<UserTrackingInfo>) -> Self {
        Self {
            success: true,
            is_new_user: session.is_new_user,
            error_message: None,
            session: Some(session),
            user_info,
        }
    }

    /// A rejected attempt.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            is_new_user: false,
            error_message: Some(message.into()),
            session: None,
            user_info: None,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_new_user(&self) -> bool {
        self.is_new_user
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn session(&self) -> Option<&LoginState> {
        self.session.as_ref()
    }

    pub fn user_info(&self) -> Option<&UserTrackingInfo> {
        self.user_info.as_ref()
    }
}

/// Wire form of [`LoginResult`], checked before it becomes one.
#[derive(Deserialize)]
struct RawLoginResult {
    success: bool,
    is_new_user: bool,
    error_message: Option<String>,
    session: Option<LoginState>,
    user_info: Option<UserTrackingInfo>,
}

impl TryFrom<RawLoginResult> for LoginResult {
    type Error = TypeError;

    fn try_from(raw: RawLoginResult) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| TypeError::InvalidLoginResult(reason.to_string());
        match (raw.success, raw.session, raw.error_message) {
            (true, Some(session), None) => {
                if raw.is_new_user != session.is_new_user {
                    return Err(invalid("is_new_user disagrees with the session"));
                }
                Ok(Self::succeeded(session, raw.user_info))
            }
            (false, None, Some(message)) => {
                if raw.is_new_user || raw.user_info.is_some() {
                    return Err(invalid("failed result carries user details"));
                }
                Ok(Self::failed(message))
            }
            (true, _, _) => Err(invalid("success requires a session and no error")),
            (false, _, _) => Err(invalid("failure requires an error and no session")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn logged_in(is_new_user: bool) -> LoginState {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        LoginState {
            phase: LoginPhase::LoggedIn,
            username: Some("alice".into()),
            public_key_base64: Some("AAAA".into()),
            login_time: Some(t),
            last_activity: Some(t),
            is_new_user,
        }
    }

    #[test]
    fn default_is_logged_out() {
        let state = LoginState::default();
        assert_eq!(state, LoginState::logged_out());
        assert_eq!(state.phase, LoginPhase::LoggedOut);
        assert!(!state.is_logged_in());
        assert!(!state.is_locked());
        assert!(state.username.is_none());
        assert!(state.last_activity.is_none());
    }

    #[test]
    fn phase_predicates() {
        let mut state = logged_in(false);
        assert!(state.is_logged_in());
        state.phase = LoginPhase::Locked;
        assert!(state.is_locked());
        assert!(!state.is_logged_in());
        state.phase = LoginPhase::TimedOut;
        assert!(state.is_timed_out());
    }

    #[test]
    fn inactive_for_measures_from_last_activity() {
        let state = logged_in(false);
        let later = state.last_activity.unwrap() + Duration::seconds(90);
        assert_eq!(state.inactive_for(later), Some(Duration::seconds(90)));
        assert_eq!(LoginState::default().inactive_for(later), None);
    }

    #[test]
    fn succeeded_result_has_session_and_no_error() {
        let result = LoginResult::succeeded(logged_in(true), None);
        assert!(result.success());
        assert!(result.is_new_user());
        assert!(result.error_message().is_none());
        assert!(result.session().is_some());
    }

    #[test]
    fn failed_result_has_error_and_no_session() {
        let result = LoginResult::failed("bad signature");
        assert!(!result.success());
        assert_eq!(result.error_message(), Some("bad signature"));
        assert!(result.session().is_none());
        assert!(result.user_info().is_none());
    }

    #[test]
    fn result_json_keeps_outcome_invariant() {
        for result in [
            LoginResult::succeeded(logged_in(true), None),
            LoginResult::failed("bad signature"),
        ] {
            let json = serde_json::to_string(&result).unwrap();
            assert_eq!(serde_json::from_str::<LoginResult>(&json).unwrap(), result);
        }

        for json in [
            r#"{"success":true,"is_new_user":false,"error_message":null,"session":null,"user_info":null}"#,
            r#"{"success":false,"is_new_user":false,"error_message":null,"session":null,"user_info":null}"#,
            r#"{"success":false,"is_new_user":true,"error_message":"x","session":null,"user_info":null}"#,
        ] {
            let err = serde_json::from_str::<LoginResult>(json).unwrap_err();
            assert!(err.to_string().contains("invalid login result"), "{err}");
        }

        let mut success = serde_json::to_value(LoginResult::succeeded(logged_in(false), None)).unwrap();
        success["error_message"] = "also failed".into();
        assert!(serde_json::from_value::<LoginResult>(success).is_err());
    }

    #[test]
    fn state_change_serde_roundtrip() {
        let now = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let change = LoginStateChange::new(
            LoginState::default(),
            logged_in(false),
            ChangeReason::Login,
            now,
        );
        let json = serde_json::to_string(&change).unwrap();
        let parsed: LoginStateChange = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, change);
    }

    #[test]
    fn display_forms() {
        assert_eq!(LoginPhase::TimedOut.to_string(), "timed-out");
        assert_eq!(ChangeReason::SessionExtended.to_string(), "session-extended");
        assert_eq!(ChangeReason::TabSync.to_string(), "tab-sync");
    }
}
