//! Postgres-backed session store.
//!
//! Sessions live in `sessions`; the role names snapshotted at creation time
//! live in `session_roles` and are folded back into each row as an array.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use super::common::push_clause;
use super::session::{
    DecideTransition, SessionFilter, SessionLookup, SessionStore, StoreError,
};
use super::transaction::{begin_transaction, commit_transaction, rollback_transaction};
use crate::models::{
    session::{NewSession, Session, SessionStatus, SYSTEM_ACTOR},
    Page, PageRequest,
};
use crate::types::{SessionId, UserId};

const SESSION_COLUMNS: &str = "s.session_id, s.session_token, s.user_id, s.user_name, \
     COALESCE((SELECT array_agg(r.role_name ORDER BY r.role_name) \
               FROM session_roles r WHERE r.session_id = s.session_id), ARRAY[]::TEXT[]) AS roles, \
     s.status, s.ip_address, s.user_agent, s.created_by, s.created_date, s.last_seen_at, \
     s.expires_at, s.revoked_at, s.revoked_by, s.meta_data, s.active_flag";

const TOKEN_UNIQUE_CONSTRAINT: &str = "sessions_session_token_key";

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn select_sessions() -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new(format!("SELECT {} FROM sessions s", SESSION_COLUMNS))
}

fn push_lookup(builder: &mut QueryBuilder<'_, Postgres>, lookup: &SessionLookup) {
    match lookup {
        SessionLookup::Id(id) => {
            builder.push("s.session_id = ").push_bind(*id);
        }
        SessionLookup::Token(token) => {
            builder.push("s.session_token = ").push_bind(token.clone());
        }
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    let duplicate_token = err.as_database_error().is_some_and(|db_err| {
        db_err.is_unique_violation() && db_err.constraint() == Some(TOKEN_UNIQUE_CONSTRAINT)
    });
    if duplicate_token {
        StoreError::DuplicateToken
    } else {
        StoreError::Database(err)
    }
}

async fn fetch_one_by_id(
    conn: &mut PgConnection,
    id: SessionId,
) -> Result<Option<Session>, sqlx::Error> {
    let mut builder = select_sessions();
    builder.push(" WHERE s.session_id = ").push_bind(id);
    builder.build_query_as::<Session>().fetch_optional(conn).await
}

async fn update_mutable_columns(
    conn: &mut PgConnection,
    session: &Session,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET status = $1,
            active_flag = $2,
            last_seen_at = $3,
            expires_at = $4,
            revoked_at = $5,
            revoked_by = $6
        WHERE session_id = $7
        "#,
    )
    .bind(session.status)
    .bind(session.active_flag)
    .bind(session.last_seen_at)
    .bind(session.expires_at)
    .bind(session.revoked_at)
    .bind(&session.revoked_by)
    .bind(session.session_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// A row belongs to the owner when its name matches or, if known, its id does.
fn push_owner(builder: &mut QueryBuilder<'_, Postgres>, user_id: Option<UserId>, user_name: &str) {
    builder.push("(user_name = ").push_bind(user_name.to_string());
    if let Some(id) = user_id {
        builder.push(" OR user_id = ").push_bind(id);
    }
    builder.push(")");
}

async fn revoke_active_for_owner(
    conn: &mut PgConnection,
    user_id: Option<UserId>,
    user_name: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE sessions SET active_flag = FALSE, status = ");
    builder
        .push_bind(SessionStatus::Revoked)
        .push(", revoked_at = ")
        .push_bind(now)
        .push(", revoked_by = ")
        .push_bind(SYSTEM_ACTOR)
        .push(" WHERE active_flag = TRUE AND ");
    push_owner(&mut builder, user_id, user_name);
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_by_id(
        &self,
        id: SessionId,
        active_flag: Option<bool>,
    ) -> Result<Option<Session>, StoreError> {
        let mut builder = select_sessions();
        builder.push(" WHERE s.session_id = ").push_bind(id);
        if let Some(flag) = active_flag {
            builder.push(" AND s.active_flag = ").push_bind(flag);
        }
        Ok(builder
            .build_query_as::<Session>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_token(
        &self,
        token: &str,
        active_flag: Option<bool>,
    ) -> Result<Option<Session>, StoreError> {
        let mut builder = select_sessions();
        builder
            .push(" WHERE s.session_token = ")
            .push_bind(token.to_string());
        if let Some(flag) = active_flag {
            builder.push(" AND s.active_flag = ").push_bind(flag);
        }
        Ok(builder
            .build_query_as::<Session>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_active_by_user(&self, user_id: UserId) -> Result<Vec<Session>, StoreError> {
        let mut builder = select_sessions();
        builder
            .push(" WHERE s.active_flag = TRUE AND s.user_id = ")
            .push_bind(user_id)
            .push(" ORDER BY s.created_date DESC, s.session_id DESC");
        Ok(builder
            .build_query_as::<Session>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn save(&self, session: &Session) -> Result<Session, StoreError> {
        let mut conn = self.pool.acquire().await?;
        if update_mutable_columns(&mut conn, session).await? == 0 {
            return Err(StoreError::MissingRow(session.session_id));
        }
        fetch_one_by_id(&mut conn, session.session_id)
            .await?
            .ok_or(StoreError::MissingRow(session.session_id))
    }

    async fn save_all(&self, sessions: &[Session]) -> Result<(), StoreError> {
        let mut tx = begin_transaction(&self.pool).await?;
        for session in sessions {
            if update_mutable_columns(&mut tx, session).await? == 0 {
                rollback_transaction(tx).await?;
                return Err(StoreError::MissingRow(session.session_id));
            }
        }
        commit_transaction(tx).await
    }

    async fn insert_exclusive(
        &self,
        new: NewSession,
        now: DateTime<Utc>,
    ) -> Result<(Session, u64), StoreError> {
        let mut tx = begin_transaction(&self.pool).await?;

        // Serializes creations for one owner so the revoke below sees every
        // row committed by a racing create. Keys are taken in a fixed order.
        for key in new.owner_keys() {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        let displaced = revoke_active_for_owner(&mut tx, new.user_id, &new.user_name, now).await?;

        let session_id: SessionId = sqlx::query_scalar(
            r#"
            INSERT INTO sessions
                (session_token, user_id, user_name, status, ip_address, user_agent, created_by,
                 created_date, last_seen_at, expires_at, meta_data, active_flag)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $10, TRUE)
            RETURNING session_id
            "#,
        )
        .bind(&new.session_token)
        .bind(new.user_id)
        .bind(&new.user_name)
        .bind(SessionStatus::Active)
        .bind(&new.ip_address)
        .bind(&new.user_agent)
        .bind(&new.created_by)
        .bind(new.created_date)
        .bind(new.expires_at)
        .bind(new.meta_data.clone().map(sqlx::types::Json))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        if !new.roles.is_empty() {
            sqlx::query(
                "INSERT INTO session_roles (session_id, role_name) \
                 SELECT $1, role_name FROM UNNEST($2::TEXT[]) AS role_name \
                 ON CONFLICT DO NOTHING",
            )
            .bind(session_id)
            .bind(&new.roles)
            .execute(&mut *tx)
            .await?;
        }

        let session = fetch_one_by_id(&mut tx, session_id)
            .await?
            .ok_or(StoreError::MissingRow(session_id))?;
        commit_transaction(tx).await?;

        tracing::debug!(%session_id, displaced, "Inserted session");
        Ok((session, displaced))
    }

    async fn transition_active(
        &self,
        lookup: SessionLookup,
        decide: &DecideTransition,
    ) -> Result<Option<Session>, StoreError> {
        let mut tx = begin_transaction(&self.pool).await?;

        let mut lock: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT s.session_id FROM sessions s WHERE s.active_flag = TRUE AND ");
        push_lookup(&mut lock, &lookup);
        lock.push(" FOR UPDATE");
        let locked: Option<SessionId> = lock
            .build_query_scalar::<SessionId>()
            .fetch_optional(&mut *tx)
            .await?;

        let Some(session_id) = locked else {
            rollback_transaction(tx).await?;
            return Ok(None);
        };
        let Some(mut session) = fetch_one_by_id(&mut tx, session_id).await? else {
            rollback_transaction(tx).await?;
            return Ok(None);
        };

        let transition = decide(&session);
        session.apply(&transition);
        update_mutable_columns(&mut tx, &session).await?;
        commit_transaction(tx).await?;
        Ok(Some(session))
    }

    async fn bulk_revoke_by_user(
        &self,
        user_id: UserId,
        revoked_at: DateTime<Utc>,
        revoked_by: &str,
        status: SessionStatus,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET active_flag = FALSE,
                status = $1,
                revoked_at = $2,
                revoked_by = $3
            WHERE user_id = $4 AND active_flag = TRUE
            "#,
        )
        .bind(status)
        .bind(revoked_at)
        .bind(revoked_by)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn bulk_delete_expired(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM sessions \
             WHERE expires_at < $1 AND (active_flag = FALSE OR status = $2)",
        )
        .bind(before)
        .bind(SessionStatus::Expired)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_filtered(
        &self,
        filter: &SessionFilter,
        page: PageRequest,
    ) -> Result<Page<Session>, StoreError> {
        let mut builder = select_sessions();
        let mut has_clause = false;
        apply_session_filters(&mut builder, &mut has_clause, filter);
        builder
            .push(" ORDER BY s.created_date DESC, s.session_id DESC")
            .push(" LIMIT ")
            .push_bind(page.size)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = builder
            .build_query_as::<Session>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM sessions s");
        let mut count_has_clause = false;
        apply_session_filters(&mut count_builder, &mut count_has_clause, filter);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(Page::new(items, page, total))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn apply_session_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    has_clause: &mut bool,
    filter: &SessionFilter,
) {
    if let Some(user_id) = filter.user_id {
        push_clause(builder, has_clause);
        builder.push("s.user_id = ").push_bind(user_id);
    }
    if let Some(user_name) = filter.user_name.as_ref() {
        push_clause(builder, has_clause);
        builder.push("s.user_name = ").push_bind(user_name.clone());
    }
    if let Some(status) = filter.status {
        push_clause(builder, has_clause);
        builder.push("s.status = ").push_bind(status);
    }
    if let Some(active_flag) = filter.active_flag {
        push_clause(builder, has_clause);
        builder.push("s.active_flag = ").push_bind(active_flag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_render_in_declaration_order() {
        let mut builder = select_sessions();
        let mut has_clause = false;
        apply_session_filters(
            &mut builder,
            &mut has_clause,
            &SessionFilter {
                user_id: Some(UserId::new(3)),
                user_name: None,
                status: Some(SessionStatus::Revoked),
                active_flag: Some(false),
            },
        );
        let sql = builder.sql();
        assert!(sql.ends_with("WHERE s.user_id = $1 AND s.status = $2 AND s.active_flag = $3"));
    }

    #[test]
    fn empty_filter_adds_no_where_clause() {
        let mut builder = select_sessions();
        let mut has_clause = false;
        apply_session_filters(&mut builder, &mut has_clause, &SessionFilter::default());
        assert!(!has_clause);
        assert!(!builder.sql().contains("WHERE"));
    }

    #[test]
    fn owner_predicate_matches_name_or_id() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM sessions WHERE ");
        push_owner(&mut builder, Some(UserId::new(7)), "alice");
        assert!(builder.sql().ends_with("WHERE (user_name = $1 OR user_id = $2)"));

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM sessions WHERE ");
        push_owner(&mut builder, None, "alice");
        assert!(builder.sql().ends_with("WHERE (user_name = $1)"));
    }

    #[test]
    fn lookup_by_token_binds_parameter() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM sessions s WHERE ");
        push_lookup(&mut builder, &SessionLookup::Token("abc".into()));
        assert_eq!(builder.sql(), "SELECT 1 FROM sessions s WHERE s.session_token = $1");
    }
}
