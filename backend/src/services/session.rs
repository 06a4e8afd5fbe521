//! Session lifecycle manager.
//!
//! Owns every state transition of a session. All mutations go through one
//! store unit of work, so the manager itself keeps no state between calls.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use super::token::TokenGenerator;
use crate::models::{
    session::{
        NewSession, ParseSessionStatusError, Session, SessionStatus, SessionTransition,
        SYSTEM_ACTOR,
    },
    Page, PageRequest,
};
use crate::repositories::session::{SessionFilter, SessionLookup, SessionStore, StoreError};
use crate::types::{SessionId, UserId};

/// Placeholder shown instead of the token to callers without full access.
pub const MASKED_TOKEN: &str = "************";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub default_ttl_minutes: i64,
    pub retention_days: i64,
    pub default_page_size: i64,
    pub max_page_size: i64,
    /// Attempts allowed when a freshly generated token collides.
    pub token_attempts: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            default_ttl_minutes: 1440,
            retention_days: 30,
            default_page_size: 20,
            max_page_size: 100,
            token_attempts: 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    MalformedInput(String),
    #[error("Session not found")]
    NotFound,
    #[error("{message}")]
    InvalidState { code: &'static str, message: String },
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    InvalidStatus(#[from] ParseSessionStatusError),
    #[error("session store failure during {operation}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidReason {
    Expired,
    InvalidOrRevoked,
}

#[derive(Debug, Clone)]
pub enum SessionValidation {
    Valid(Session),
    Invalid {
        reason: InvalidReason,
        expires_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CreateSession {
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub roles: Vec<String>,
    pub ttl_minutes: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub meta_data: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RevokeSession {
    pub session_token: Option<String>,
    pub session_id: Option<SessionId>,
    pub revoked_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevokeOutcome {
    pub session_id: SessionId,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RevokeAllSessions {
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub revoked_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeAllOutcome {
    pub revoked: u64,
    pub revoked_at: DateTime<Utc>,
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListSessions {
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub status: Option<String>,
    pub active_flag: Option<bool>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub deleted: u64,
    pub threshold: DateTime<Utc>,
}

/// Who is asking, as established by the authorization layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Option<UserId>,
    pub user_name: String,
    pub roles: Vec<String>,
}

impl CallerIdentity {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| {
            let role = role.trim();
            role.eq_ignore_ascii_case("ADMIN") || role.eq_ignore_ascii_case("ROLE_ADMIN")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewAccess {
    pub is_owner: bool,
    pub is_admin: bool,
}

impl ViewAccess {
    pub fn for_caller(session: &Session, caller: &CallerIdentity) -> Self {
        // user_id is authoritative; the name only decides for id-less sessions.
        let is_owner = match session.user_id {
            Some(owner) => caller.user_id == Some(owner),
            None => caller.user_name.to_lowercase() == session.user_name.to_lowercase(),
        };
        Self {
            is_owner,
            is_admin: caller.is_admin(),
        }
    }

    pub fn grants_full_view(&self) -> bool {
        self.is_owner || self.is_admin
    }
}

/// Everything a session owner or administrator may see.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FullSessionView {
    pub session_id: SessionId,
    pub session_token: String,
    pub user_id: Option<UserId>,
    pub user_name: String,
    pub roles: Vec<String>,
    pub status: SessionStatus,
    pub created_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active_flag: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_by: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub meta_data: Option<Value>,
}

/// Shape returned to any other authenticated caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestrictedSessionView {
    pub session_id: SessionId,
    pub session_token: String,
    pub user_id: Option<UserId>,
    pub user_name: String,
    pub roles: Vec<String>,
    pub status: SessionStatus,
    pub created_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active_flag: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum SessionView {
    Full(FullSessionView),
    Restricted(RestrictedSessionView),
}

impl SessionView {
    pub fn build(session: Session, access: ViewAccess) -> Self {
        if access.grants_full_view() {
            SessionView::Full(FullSessionView {
                session_id: session.session_id,
                session_token: session.session_token,
                user_id: session.user_id,
                user_name: session.user_name,
                roles: session.roles,
                status: session.status,
                created_date: session.created_date,
                expires_at: session.expires_at,
                active_flag: session.active_flag,
                ip_address: session.ip_address,
                user_agent: session.user_agent,
                created_by: session.created_by,
                last_seen_at: session.last_seen_at,
                revoked_at: session.revoked_at,
                revoked_by: session.revoked_by,
                meta_data: session.meta_data.map(|json| json.0),
            })
        } else {
            SessionView::Restricted(RestrictedSessionView {
                session_id: session.session_id,
                session_token: MASKED_TOKEN.to_string(),
                user_id: session.user_id,
                user_name: session.user_name,
                roles: session.roles,
                status: session.status,
                created_date: session.created_date,
                expires_at: session.expires_at,
                active_flag: session.active_flag,
            })
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    tokens: Arc<dyn TokenGenerator>,
    clock: Clock,
    policy: SessionPolicy,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        tokens: Arc<dyn TokenGenerator>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            store,
            tokens,
            clock: Arc::new(Utc::now),
            policy,
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Store reachability, used by the health endpoint.
    pub async fn ping(&self) -> Result<(), SessionError> {
        self.store
            .ping()
            .await
            .map_err(|err| store_failure("ping", err))
    }

    pub async fn create(&self, request: CreateSession) -> Result<Session, SessionError> {
        let user_name = non_blank(request.user_name)
            .ok_or_else(|| SessionError::MalformedInput("Invalid UserName or UserId".into()))?;
        tracing::info!(
            user_name = %user_name,
            user_id = ?request.user_id,
            "Creating session"
        );

        let now = self.now();
        let ttl = effective_ttl(request.ttl_minutes, self.policy.default_ttl_minutes);
        let expires_at = offset_minutes(now, ttl)?;
        let template = NewSession {
            session_token: String::new(),
            user_id: request.user_id,
            user_name: user_name.clone(),
            roles: normalize_roles(request.roles),
            ip_address: request.ip_address,
            user_agent: request.user_agent,
            created_by: Some(user_name),
            created_date: now,
            expires_at,
            meta_data: request.meta_data,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let candidate = NewSession {
                session_token: self.tokens.generate(),
                ..template.clone()
            };
            match self.store.insert_exclusive(candidate, now).await {
                Ok((session, displaced)) => {
                    tracing::info!(
                        session_id = %session.session_id,
                        displaced,
                        session_token = "[REDACTED]",
                        "Session created"
                    );
                    return Ok(session);
                }
                Err(StoreError::DuplicateToken) if attempt < self.policy.token_attempts => {
                    tracing::warn!(attempt, "Session token collision, regenerating");
                }
                Err(err) => return Err(store_failure("create_session", err)),
            }
        }
    }

    pub async fn validate_token(
        &self,
        session_token: Option<&str>,
    ) -> Result<SessionValidation, SessionError> {
        tracing::info!(session_token = "[REDACTED]", "Validating session by token");
        let token = session_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| SessionError::Unauthorized("Missing token".into()))?;
        self.validate(SessionLookup::Token(token.to_string())).await
    }

    pub async fn validate_id(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<SessionValidation, SessionError> {
        tracing::info!(session_id = ?session_id, "Validating session by id");
        let session_id = session_id
            .ok_or_else(|| SessionError::MalformedInput("sessionId required".into()))?;
        self.validate(SessionLookup::Id(session_id)).await
    }

    async fn validate(&self, lookup: SessionLookup) -> Result<SessionValidation, SessionError> {
        let now = self.now();
        let decide = move |session: &Session| {
            if session.is_expired_at(now) {
                SessionTransition::Expire
            } else {
                SessionTransition::Touch { at: now }
            }
        };
        let outcome = self
            .store
            .transition_active(lookup, &decide)
            .await
            .map_err(|err| store_failure("validate_session", err))?;

        Ok(match outcome {
            None => SessionValidation::Invalid {
                reason: InvalidReason::InvalidOrRevoked,
                expires_at: None,
            },
            Some(session) if session.status == SessionStatus::Expired => {
                tracing::info!(session_id = %session.session_id, "Session expired on validation");
                SessionValidation::Invalid {
                    reason: InvalidReason::Expired,
                    expires_at: Some(session.expires_at),
                }
            }
            Some(session) => SessionValidation::Valid(session),
        })
    }

    /// Resets expiry to `now + ttl` without issuing a new token.
    pub async fn refresh(
        &self,
        session_token: Option<&str>,
        ttl_minutes: Option<i64>,
    ) -> Result<Session, SessionError> {
        tracing::info!(session_token = "[REDACTED]", ttl_minutes = ?ttl_minutes, "Refreshing session");
        let token = required_token(session_token)?;
        let now = self.now();
        let expires_at = offset_minutes(
            now,
            effective_ttl(ttl_minutes, self.policy.default_ttl_minutes),
        )?;
        let reschedule = move |_: &Session| SessionTransition::Reschedule { expires_at, at: now };
        self.store
            .transition_active(SessionLookup::Token(token), &reschedule)
            .await
            .map_err(|err| store_failure("refresh_session", err))?
            .ok_or_else(|| SessionError::InvalidState {
                code: "CANNOT_REFRESH",
                message: "Session is revoked or expired".into(),
            })
    }

    /// Sets expiry to `now + additional_minutes`; the old expiry is discarded.
    pub async fn extend(
        &self,
        session_token: Option<&str>,
        additional_minutes: Option<i64>,
    ) -> Result<Session, SessionError> {
        tracing::info!(
            session_token = "[REDACTED]",
            additional_minutes = ?additional_minutes,
            "Extending session"
        );
        let token = required_token(session_token)?;
        let minutes = additional_minutes.filter(|m| *m > 0).ok_or_else(|| {
            SessionError::MalformedInput("additionalMinutes must be > 0".into())
        })?;
        let now = self.now();
        let expires_at = offset_minutes(now, minutes)?;
        let reschedule = move |_: &Session| SessionTransition::Reschedule { expires_at, at: now };
        self.store
            .transition_active(SessionLookup::Token(token), &reschedule)
            .await
            .map_err(|err| store_failure("extend_session", err))?
            .ok_or_else(|| SessionError::InvalidState {
                code: "NOT_ACTIVE",
                message: "Session is revoked or expired and cannot be extended".into(),
            })
    }

    pub async fn revoke(&self, request: RevokeSession) -> Result<RevokeOutcome, SessionError> {
        tracing::info!(
            session_token = "[REDACTED]",
            session_id = ?request.session_id,
            revoked_by = ?request.revoked_by,
            "Revoking session"
        );
        // A token wins over an id when both are supplied.
        let lookup = match (non_blank(request.session_token), request.session_id) {
            (Some(token), _) => SessionLookup::Token(token),
            (None, Some(id)) => SessionLookup::Id(id),
            (None, None) => {
                return Err(SessionError::MalformedInput(
                    "token or sessionId required".into(),
                ))
            }
        };
        let at = self.now();
        let by = actor_or_system(request.revoked_by);
        let revoke = move |_: &Session| SessionTransition::Revoke { at, by: by.clone() };
        let session = self
            .store
            .transition_active(lookup, &revoke)
            .await
            .map_err(|err| store_failure("revoke_session", err))?
            .ok_or(SessionError::NotFound)?;

        Ok(RevokeOutcome {
            session_id: session.session_id,
            revoked_at: session.revoked_at.unwrap_or(at),
        })
    }

    pub async fn revoke_all(
        &self,
        request: RevokeAllSessions,
    ) -> Result<RevokeAllOutcome, SessionError> {
        tracing::info!(
            user_id = ?request.user_id,
            user_name = ?request.user_name,
            revoked_by = ?request.revoked_by,
            "Revoking all sessions"
        );
        let (user_id, user_name) = match (request.user_id, non_blank(request.user_name)) {
            (Some(id), Some(name)) => (id, name),
            _ => {
                return Err(SessionError::MalformedInput(
                    "UserId or UserName is Required".into(),
                ))
            }
        };
        let revoked_at = self.now();
        let by = actor_or_system(request.revoked_by);
        let revoked = self
            .store
            .bulk_revoke_by_user(user_id, revoked_at, &by, SessionStatus::Revoked)
            .await
            .map_err(|err| store_failure("revoke_all_sessions", err))?;
        tracing::info!(%user_id, revoked, "Revoked user sessions");

        Ok(RevokeAllOutcome {
            revoked,
            revoked_at,
            user_id,
            user_name,
        })
    }

    pub async fn list(&self, request: ListSessions) -> Result<Page<Session>, SessionError> {
        tracing::info!(
            user_id = ?request.user_id,
            user_name = ?request.user_name,
            status = ?request.status,
            active_flag = ?request.active_flag,
            page = ?request.page,
            size = ?request.size,
            "Listing sessions"
        );
        let status = non_blank(request.status)
            .map(|raw| raw.parse::<SessionStatus>())
            .transpose()?;
        let filter = SessionFilter {
            user_id: request.user_id,
            user_name: non_blank(request.user_name),
            status,
            active_flag: request.active_flag,
        };
        let page = PageRequest::clamped(
            request.page,
            request.size,
            self.policy.default_page_size,
            self.policy.max_page_size,
        );
        self.store
            .find_filtered(&filter, page)
            .await
            .map_err(|err| store_failure("list_sessions", err))
    }

    /// Retention sweep; `None` or a negative value falls back to the configured retention.
    pub async fn cleanup(&self, older_than_days: Option<i64>) -> Result<CleanupOutcome, SessionError> {
        let days = older_than_days
            .filter(|days| *days >= 0)
            .unwrap_or(self.policy.retention_days);
        tracing::info!(older_than_days = days, "Cleaning up sessions");
        let threshold = Duration::try_days(days)
            .and_then(|window| self.now().checked_sub_signed(window))
            .ok_or_else(|| SessionError::MalformedInput("olderThanDays out of range".into()))?;
        let deleted = self
            .store
            .bulk_delete_expired(threshold)
            .await
            .map_err(|err| store_failure("cleanup_sessions", err))?;
        tracing::info!(deleted, %threshold, "Session cleanup finished");
        Ok(CleanupOutcome { deleted, threshold })
    }

    pub async fn get_for_caller(
        &self,
        session_id: Option<SessionId>,
        caller: &CallerIdentity,
    ) -> Result<SessionView, SessionError> {
        tracing::info!(session_id = ?session_id, caller = %caller.user_name, "Fetching session");
        let session_id = session_id
            .ok_or_else(|| SessionError::MalformedInput("sessionId required".into()))?;
        let session = self
            .store
            .find_by_id(session_id, None)
            .await
            .map_err(|err| store_failure("get_session", err))?
            .ok_or(SessionError::NotFound)?;
        let access = ViewAccess::for_caller(&session, caller);
        Ok(SessionView::build(session, access))
    }
}

fn store_failure(operation: &'static str, source: StoreError) -> SessionError {
    tracing::error!(operation, error = %source, "Session store failure");
    SessionError::Store { operation, source }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_token(token: Option<&str>) -> Result<String, SessionError> {
    non_blank(token.map(str::to_string))
        .ok_or_else(|| SessionError::MalformedInput("token required".into()))
}

fn actor_or_system(actor: Option<String>) -> String {
    non_blank(actor).unwrap_or_else(|| SYSTEM_ACTOR.to_string())
}

fn effective_ttl(requested: Option<i64>, default_minutes: i64) -> i64 {
    requested.filter(|m| *m > 0).unwrap_or(default_minutes)
}

fn offset_minutes(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, SessionError> {
    Duration::try_minutes(minutes)
        .and_then(|window| now.checked_add_signed(window))
        .ok_or_else(|| SessionError::MalformedInput("minutes out of range".into()))
}

/// Trims, drops empties, and dedups role names; order carries no meaning.
fn normalize_roles(roles: Vec<String>) -> Vec<String> {
    let mut roles: Vec<String> = roles
        .into_iter()
        .map(|role| role.trim().to_string())
        .filter(|role| !role.is_empty())
        .collect();
    roles.sort();
    roles.dedup();
    roles
}
