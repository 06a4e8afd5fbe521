//! In-process session store.
//!
//! Thread-safe via a single `RwLock`; each trait call holds the write lock for
//! its whole read-decide-write cycle, which gives the same per-call atomicity
//! the Postgres store gets from transactions. State is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::session::{
    is_retention_candidate, DecideTransition, SessionFilter, SessionLookup, SessionStore,
    StoreError,
};
use crate::models::{
    session::{NewSession, Session, SessionStatus, SYSTEM_ACTOR},
    Page, PageRequest,
};
use crate::types::{SessionId, UserId};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    rows: BTreeMap<SessionId, Session>,
    by_token: HashMap<String, SessionId>,
}

impl MemoryState {
    fn lookup(&self, lookup: &SessionLookup) -> Option<SessionId> {
        match lookup {
            SessionLookup::Id(id) => self.rows.contains_key(id).then_some(*id),
            SessionLookup::Token(token) => self.by_token.get(token).copied(),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    state: RwLock<MemoryState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn active_matches(session: &Session, active_flag: Option<bool>) -> bool {
    active_flag.map_or(true, |flag| session.active_flag == flag)
}

fn copy_mutable_columns(target: &mut Session, source: &Session) {
    target.status = source.status;
    target.active_flag = source.active_flag;
    target.last_seen_at = source.last_seen_at;
    target.expires_at = source.expires_at;
    target.revoked_at = source.revoked_at;
    target.revoked_by = source.revoked_by.clone();
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_by_id(
        &self,
        id: SessionId,
        active_flag: Option<bool>,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .read()
            .rows
            .get(&id)
            .filter(|session| active_matches(session, active_flag))
            .cloned())
    }

    async fn find_by_token(
        &self,
        token: &str,
        active_flag: Option<bool>,
    ) -> Result<Option<Session>, StoreError> {
        let state = self.read();
        Ok(state
            .by_token
            .get(token)
            .and_then(|id| state.rows.get(id))
            .filter(|session| active_matches(session, active_flag))
            .cloned())
    }

    async fn list_active_by_user(&self, user_id: UserId) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .read()
            .rows
            .values()
            .filter(|session| session.active_flag && session.user_id == Some(user_id))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(sessions)
    }

    async fn save(&self, session: &Session) -> Result<Session, StoreError> {
        let mut state = self.write();
        let row = state
            .rows
            .get_mut(&session.session_id)
            .ok_or(StoreError::MissingRow(session.session_id))?;
        copy_mutable_columns(row, session);
        Ok(row.clone())
    }

    async fn save_all(&self, sessions: &[Session]) -> Result<(), StoreError> {
        let mut state = self.write();
        if let Some(missing) = sessions
            .iter()
            .find(|session| !state.rows.contains_key(&session.session_id))
        {
            return Err(StoreError::MissingRow(missing.session_id));
        }
        for session in sessions {
            if let Some(row) = state.rows.get_mut(&session.session_id) {
                copy_mutable_columns(row, session);
            }
        }
        Ok(())
    }

    async fn insert_exclusive(
        &self,
        new: NewSession,
        now: DateTime<Utc>,
    ) -> Result<(Session, u64), StoreError> {
        let mut state = self.write();
        if state.by_token.contains_key(&new.session_token) {
            return Err(StoreError::DuplicateToken);
        }

        let mut displaced = 0;
        for session in state.rows.values_mut() {
            if session.active_flag && session.is_owned_by(new.user_id, &new.user_name) {
                session.mark_revoked(now, SYSTEM_ACTOR, SessionStatus::Revoked);
                displaced += 1;
            }
        }

        state.next_id += 1;
        let session_id = SessionId::new(state.next_id);
        let session = new.into_session(session_id);
        state
            .by_token
            .insert(session.session_token.clone(), session_id);
        state.rows.insert(session_id, session.clone());
        Ok((session, displaced))
    }

    async fn transition_active(
        &self,
        lookup: SessionLookup,
        decide: &DecideTransition,
    ) -> Result<Option<Session>, StoreError> {
        let mut state = self.write();
        let Some(id) = state.lookup(&lookup) else {
            return Ok(None);
        };
        let Some(session) = state.rows.get_mut(&id).filter(|s| s.active_flag) else {
            return Ok(None);
        };
        let transition = decide(session);
        session.apply(&transition);
        Ok(Some(session.clone()))
    }

    async fn bulk_revoke_by_user(
        &self,
        user_id: UserId,
        revoked_at: DateTime<Utc>,
        revoked_by: &str,
        status: SessionStatus,
    ) -> Result<u64, StoreError> {
        let mut state = self.write();
        let mut count = 0;
        for session in state.rows.values_mut() {
            if session.active_flag && session.user_id == Some(user_id) {
                session.mark_revoked(revoked_at, revoked_by, status);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn bulk_delete_expired(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.write();
        let doomed: Vec<(SessionId, String)> = state
            .rows
            .values()
            .filter(|session| is_retention_candidate(session, before))
            .map(|session| (session.session_id, session.session_token.clone()))
            .collect();
        for (id, token) in &doomed {
            state.rows.remove(id);
            state.by_token.remove(token);
        }
        Ok(doomed.len() as u64)
    }

    async fn find_filtered(
        &self,
        filter: &SessionFilter,
        page: PageRequest,
    ) -> Result<Page<Session>, StoreError> {
        let mut matching: Vec<Session> = self
            .read()
            .rows
            .values()
            .filter(|session| filter.matches(session))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_date
                .cmp(&a.created_date)
                .then(b.session_id.cmp(&a.session_id))
        });
        let total = matching.len() as i64;
        let content = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.size).unwrap_or(0))
            .collect();
        Ok(Page::new(content, page, total))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
