//! Session records and the lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::types::{SessionId, UserId};

/// Actor recorded when the system itself revokes a session.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "session_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Lifecycle status of a session.
pub enum SessionStatus {
    /// Reserved; never produced by session creation.
    Pending,
    Active,
    Expired,
    Revoked,
    LoggedOut,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::Pending,
        SessionStatus::Active,
        SessionStatus::Expired,
        SessionStatus::Revoked,
        SessionStatus::LoggedOut,
    ];

    /// Returns the canonical storage/wire literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Expired => "EXPIRED",
            SessionStatus::Revoked => "REVOKED",
            SessionStatus::LoggedOut => "LOGGED_OUT",
        }
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Expired | SessionStatus::Revoked | SessionStatus::LoggedOut
        )
    }

    pub fn valid_literals() -> Vec<&'static str> {
        Self::ALL.iter().map(SessionStatus::as_str).collect()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session status `{given}`; expected one of {expected}", expected = SessionStatus::valid_literals().join(","))]
pub struct ParseSessionStatusError {
    pub given: String,
}

impl ParseSessionStatusError {
    pub fn valid_values(&self) -> Vec<&'static str> {
        SessionStatus::valid_literals()
    }
}

impl FromStr for SessionStatus {
    type Err = ParseSessionStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseSessionStatusError {
                given: s.to_string(),
            })
    }
}

#[derive(Clone, FromRow)]
/// Database representation of a session.
pub struct Session {
    /// Store-assigned surrogate key.
    pub session_id: SessionId,
    /// Opaque bearer token, unique and immutable.
    pub session_token: String,
    /// Authoritative owner identity when known.
    pub user_id: Option<UserId>,
    /// Denormalized owner name kept for lookups and display.
    pub user_name: String,
    /// Role names snapshotted when the session was created.
    pub roles: Vec<String>,
    pub status: SessionStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_by: Option<String>,
    pub created_date: DateTime<Utc>,
    /// Touched on every successful validation.
    pub last_seen_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    /// Caller-supplied blob, never interpreted here.
    pub meta_data: Option<Json<Value>>,
    /// Authoritative usability flag; queries for usable sessions filter on it.
    pub active_flag: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("session_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("roles", &self.roles)
            .field("status", &self.status)
            .field("created_date", &self.created_date)
            .field("last_seen_at", &self.last_seen_at)
            .field("expires_at", &self.expires_at)
            .field("revoked_at", &self.revoked_at)
            .field("revoked_by", &self.revoked_by)
            .field("active_flag", &self.active_flag)
            .finish_non_exhaustive()
    }
}

/// A state-machine edge applied to a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    /// Successful validation: only `last_seen_at` moves.
    Touch { at: DateTime<Utc> },
    /// Lazy expiry discovered during validation.
    Expire,
    /// Refresh/extend: new absolute expiry.
    Reschedule {
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Revoke { at: DateTime<Utc>, by: String },
}

impl Session {
    /// Strict comparison: a session expiring exactly at `now` is still valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Applies `transition` in place. Terminal or inactive sessions are left untouched.
    pub fn apply(&mut self, transition: &SessionTransition) {
        if !self.active_flag || self.status.is_terminal() {
            return;
        }
        match transition {
            SessionTransition::Touch { at } => {
                self.last_seen_at = Some(*at);
            }
            SessionTransition::Expire => {
                self.status = SessionStatus::Expired;
                self.active_flag = false;
            }
            SessionTransition::Reschedule { expires_at, at } => {
                self.expires_at = *expires_at;
                self.last_seen_at = Some(*at);
            }
            SessionTransition::Revoke { at, by } => {
                self.mark_revoked(*at, by, SessionStatus::Revoked);
                self.last_seen_at = Some(*at);
            }
        }
    }

    /// Bulk deactivation used by create and revoke-all; `last_seen_at` is left alone.
    pub fn mark_revoked(&mut self, at: DateTime<Utc>, by: &str, status: SessionStatus) {
        if !self.active_flag {
            return;
        }
        self.status = status;
        self.active_flag = false;
        self.revoked_at = Some(at);
        self.revoked_by = Some(by.to_string());
    }

    /// Whether this row belongs to the owner named `user_name` or, when an id
    /// is known, identified by `user_id`.
    pub fn is_owned_by(&self, user_id: Option<UserId>, user_name: &str) -> bool {
        self.user_name == user_name || user_id.is_some_and(|id| self.user_id == Some(id))
    }
}

/// Advisory lock keys for an owner, name first. Every create takes them in
/// this order, so two creates sharing either identifier serialize.
pub fn owner_keys(user_id: Option<UserId>, user_name: &str) -> Vec<String> {
    let mut keys = vec![format!("user_name:{}", user_name)];
    if let Some(id) = user_id {
        keys.push(format!("user_id:{}", id));
    }
    keys
}

/// Insert payload for a brand-new active session.
#[derive(Clone)]
pub struct NewSession {
    pub session_token: String,
    pub user_id: Option<UserId>,
    pub user_name: String,
    pub roles: Vec<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_by: Option<String>,
    pub created_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub meta_data: Option<Value>,
}

impl NewSession {
    /// Keys used to serialize concurrent creations for the same owner.
    pub fn owner_keys(&self) -> Vec<String> {
        owner_keys(self.user_id, &self.user_name)
    }

    /// Materializes the row once the store has assigned an id.
    pub fn into_session(self, session_id: SessionId) -> Session {
        Session {
            session_id,
            session_token: self.session_token,
            user_id: self.user_id,
            user_name: self.user_name,
            roles: self.roles,
            status: SessionStatus::Active,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_by: self.created_by,
            created_date: self.created_date,
            last_seen_at: Some(self.created_date),
            expires_at: self.expires_at,
            revoked_at: None,
            revoked_by: None,
            meta_data: self.meta_data.map(Json),
            active_flag: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(now: DateTime<Utc>) -> Session {
        NewSession {
            session_token: "a".repeat(64),
            user_id: Some(UserId::new(1)),
            user_name: "alice".into(),
            roles: vec!["USER".into()],
            ip_address: None,
            user_agent: None,
            created_by: Some("alice".into()),
            created_date: now,
            expires_at: now + Duration::minutes(10),
            meta_data: None,
        }
        .into_session(SessionId::new(1))
    }

    #[test]
    fn status_parse_is_trimmed_and_case_insensitive() {
        assert_eq!(" active ".parse::<SessionStatus>(), Ok(SessionStatus::Active));
        assert_eq!(
            "logged_out".parse::<SessionStatus>(),
            Ok(SessionStatus::LoggedOut)
        );
        let err = "INACTIVE".parse::<SessionStatus>().unwrap_err();
        assert_eq!(err.given, "INACTIVE");
        assert_eq!(
            err.valid_values(),
            vec!["PENDING", "ACTIVE", "EXPIRED", "REVOKED", "LOGGED_OUT"]
        );
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&SessionStatus::LoggedOut).unwrap();
        assert_eq!(json, "\"LOGGED_OUT\"");
    }

    #[test]
    fn expiry_comparison_is_strict() {
        let now = Utc::now();
        let session = sample(now);
        assert!(!session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn revoke_moves_status_and_flag_together() {
        let now = Utc::now();
        let mut session = sample(now);
        session.apply(&SessionTransition::Revoke {
            at: now,
            by: SYSTEM_ACTOR.into(),
        });
        assert_eq!(session.status, SessionStatus::Revoked);
        assert!(!session.active_flag);
        assert_eq!(session.revoked_by.as_deref(), Some("SYSTEM"));
        assert_eq!(session.revoked_at, Some(now));
    }

    #[test]
    fn ownership_matches_name_or_id() {
        let mut session = sample(Utc::now());
        assert!(session.is_owned_by(None, "alice"));
        assert!(session.is_owned_by(Some(UserId::new(9)), "alice"));
        assert!(session.is_owned_by(Some(UserId::new(1)), "renamed"));
        assert!(!session.is_owned_by(None, "bob"));

        session.user_id = None;
        assert!(session.is_owned_by(Some(UserId::new(7)), "alice"));
        assert!(!session.is_owned_by(Some(UserId::new(7)), "bob"));
    }

    #[test]
    fn owner_keys_always_lead_with_the_name() {
        assert_eq!(owner_keys(None, "alice"), vec!["user_name:alice"]);
        assert_eq!(
            owner_keys(Some(UserId::new(7)), "alice"),
            vec!["user_name:alice", "user_id:7"]
        );
    }

    #[test]
    fn terminal_sessions_ignore_further_transitions() {
        let now = Utc::now();
        let mut session = sample(now);
        session.apply(&SessionTransition::Expire);
        let later = now + Duration::hours(1);
        session.apply(&SessionTransition::Reschedule {
            expires_at: later,
            at: later,
        });
        session.apply(&SessionTransition::Revoke {
            at: later,
            by: "admin".into(),
        });
        assert_eq!(session.status, SessionStatus::Expired);
        assert_ne!(session.expires_at, later);
        assert!(session.revoked_at.is_none());
    }

    #[test]
    fn debug_output_never_contains_token() {
        let session = sample(Utc::now());
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains(&session.session_token));
        assert!(rendered.contains("[REDACTED]"));
    }
}
