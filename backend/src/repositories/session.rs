//! Session store contract.
//!
//! The store is the only shared mutable resource of the session lifecycle.
//! Every method is one unit of work: implementations must not interleave the
//! read and write halves of [`SessionStore::insert_exclusive`] or
//! [`SessionStore::transition_active`] with other mutations of the same rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    session::{NewSession, Session, SessionStatus, SessionTransition},
    Page, PageRequest,
};
use crate::types::{SessionId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session token already exists")]
    DuplicateToken,
    #[error("session {0} does not exist")]
    MissingRow(SessionId),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// How a single live session is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Id(SessionId),
    Token(String),
}

/// Listing filters; `None` matches every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub status: Option<SessionStatus>,
    pub active_flag: Option<bool>,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        self.user_id.map_or(true, |id| session.user_id == Some(id))
            && self
                .user_name
                .as_deref()
                .map_or(true, |name| session.user_name == name)
            && self.status.map_or(true, |status| session.status == status)
            && self
                .active_flag
                .map_or(true, |flag| session.active_flag == flag)
    }
}

/// Decision callback evaluated against the locked row inside the unit of work.
pub type DecideTransition = dyn Fn(&Session) -> SessionTransition + Send + Sync;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Point lookup by surrogate key, optionally restricted on `active_flag`.
    async fn find_by_id(
        &self,
        id: SessionId,
        active_flag: Option<bool>,
    ) -> Result<Option<Session>, StoreError>;

    /// Point lookup by token, optionally restricted on `active_flag`.
    async fn find_by_token(
        &self,
        token: &str,
        active_flag: Option<bool>,
    ) -> Result<Option<Session>, StoreError>;

    /// Active rows of `user_id`, newest first.
    async fn list_active_by_user(&self, user_id: UserId) -> Result<Vec<Session>, StoreError>;

    /// Persists the mutable columns of an existing row.
    async fn save(&self, session: &Session) -> Result<Session, StoreError>;

    /// Persists several rows at once; fails without writing if any row is missing.
    async fn save_all(&self, sessions: &[Session]) -> Result<(), StoreError>;

    /// Revokes every active session of the new session's owner as `SYSTEM`,
    /// then inserts the new row and its role snapshot. Returns the inserted
    /// session and the number of sessions it displaced.
    async fn insert_exclusive(
        &self,
        new: NewSession,
        now: DateTime<Utc>,
    ) -> Result<(Session, u64), StoreError>;

    /// Locks the active row addressed by `lookup`, applies the transition chosen
    /// by `decide`, and persists it. `None` when no active row matches.
    async fn transition_active(
        &self,
        lookup: SessionLookup,
        decide: &DecideTransition,
    ) -> Result<Option<Session>, StoreError>;

    /// Conditional update of every `active_flag = true` row of `user_id`.
    async fn bulk_revoke_by_user(
        &self,
        user_id: UserId,
        revoked_at: DateTime<Utc>,
        revoked_by: &str,
        status: SessionStatus,
    ) -> Result<u64, StoreError>;

    /// Deletes rows that are inactive (or EXPIRED) and expired before `before`.
    async fn bulk_delete_expired(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Filtered listing ordered by `created_date` descending.
    async fn find_filtered(
        &self,
        filter: &SessionFilter,
        page: PageRequest,
    ) -> Result<Page<Session>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Retention predicate shared by every store implementation.
pub fn is_retention_candidate(session: &Session, before: DateTime<Utc>) -> bool {
    session.expires_at < before
        && (!session.active_flag || session.status == SessionStatus::Expired)
}
