use chrono::{Duration, DurationRound, Utc};
use std::sync::Arc;

use session_backend::{
    models::{
        session::{NewSession, SessionStatus, SessionTransition},
        PageRequest,
    },
    repositories::{PgSessionStore, SessionFilter, SessionLookup, SessionStore, StoreError},
    services::{
        session::{CreateSession, SessionPolicy, SessionValidation},
        SecureTokenGenerator, SessionService, TokenGenerator,
    },
    types::UserId,
};

mod support;

use support::test_pool;

fn unique_user_id() -> UserId {
    UserId::new(Utc::now().timestamp_micros() + rand_offset())
}

fn rand_offset() -> i64 {
    use rand::{rngs::OsRng, Rng};
    OsRng.gen_range(0..1_000_000)
}

fn new_session(user_id: UserId, name: &str) -> NewSession {
    // Postgres keeps microseconds; truncate so round-tripped values compare equal.
    let now = Utc::now()
        .duration_trunc(Duration::microseconds(1))
        .expect("truncate");
    NewSession {
        session_token: SecureTokenGenerator.generate(),
        user_id: Some(user_id),
        user_name: format!("{}-{}", name, user_id),
        roles: vec!["ADMIN".into(), "USER".into()],
        ip_address: Some("127.0.0.1".into()),
        user_agent: None,
        created_by: Some(name.to_string()),
        created_date: now,
        expires_at: now + Duration::minutes(30),
        meta_data: Some(serde_json::json!({"source": "pg-test"})),
    }
}

#[tokio::test]
async fn insert_exclusive_revokes_previous_rows() {
    let Some(pool) = test_pool().await else { return };
    let store = PgSessionStore::new(pool);
    let user_id = unique_user_id();

    let (first, displaced) = store
        .insert_exclusive(new_session(user_id, "pg-alice"), Utc::now())
        .await
        .unwrap();
    assert_eq!(displaced, 0);
    assert_eq!(first.roles, vec!["ADMIN", "USER"]);
    assert_eq!(first.status, SessionStatus::Active);

    let (second, displaced) = store
        .insert_exclusive(new_session(user_id, "pg-alice"), Utc::now())
        .await
        .unwrap();
    assert_eq!(displaced, 1);

    let active = store.list_active_by_user(user_id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, second.session_id);

    let old = store.find_by_id(first.session_id, None).await.unwrap().unwrap();
    assert_eq!(old.status, SessionStatus::Revoked);
    assert_eq!(old.revoked_by.as_deref(), Some("SYSTEM"));
    assert!(!old.active_flag);
}

#[tokio::test]
async fn duplicate_token_is_reported() {
    let Some(pool) = test_pool().await else { return };
    let store = PgSessionStore::new(pool);
    let user_id = unique_user_id();
    let candidate = new_session(user_id, "pg-bob");

    store
        .insert_exclusive(candidate.clone(), Utc::now())
        .await
        .unwrap();
    let err = store
        .insert_exclusive(
            NewSession {
                user_id: Some(unique_user_id()),
                ..candidate
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateToken));
}

#[tokio::test]
async fn concurrent_creates_leave_exactly_one_active() {
    let Some(pool) = test_pool().await else { return };
    let store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool));
    let service = Arc::new(SessionService::new(
        store.clone(),
        Arc::new(SecureTokenGenerator),
        SessionPolicy::default(),
    ));
    let user_id = unique_user_id();
    let user_name = format!("pg-race-{}", user_id);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let user_name = user_name.clone();
        handles.push(tokio::spawn(async move {
            service
                .create(CreateSession {
                    user_id: Some(user_id),
                    user_name: Some(user_name),
                    ..CreateSession::default()
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let active = store.list_active_by_user(user_id).await.unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn transition_active_applies_decision_once() {
    let Some(pool) = test_pool().await else { return };
    let store = PgSessionStore::new(pool);
    let user_id = unique_user_id();
    let (session, _) = store
        .insert_exclusive(new_session(user_id, "pg-carol"), Utc::now())
        .await
        .unwrap();

    let expire = |_: &session_backend::models::session::Session| SessionTransition::Expire;
    let expired = store
        .transition_active(SessionLookup::Token(session.session_token.clone()), &expire)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(expired.status, SessionStatus::Expired);
    assert!(!expired.active_flag);

    let again = store
        .transition_active(SessionLookup::Id(session.session_id), &expire)
        .await
        .unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn filtered_listing_and_retention() {
    let Some(pool) = test_pool().await else { return };
    let store = PgSessionStore::new(pool);
    let user_id = unique_user_id();

    let mut stale = new_session(user_id, "pg-dave");
    stale.created_date = stale.created_date - Duration::days(41);
    stale.expires_at = stale.created_date + Duration::days(1);
    let (stale, _) = store.insert_exclusive(stale, Utc::now()).await.unwrap();
    let (fresh, _) = store
        .insert_exclusive(new_session(user_id, "pg-dave"), Utc::now())
        .await
        .unwrap();

    let page = store
        .find_filtered(
            &SessionFilter {
                user_id: Some(user_id),
                ..SessionFilter::default()
            },
            PageRequest { page: 0, size: 1 },
        )
        .await
        .unwrap();
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.content[0].session_id, fresh.session_id);

    let revoked = store
        .find_filtered(
            &SessionFilter {
                user_id: Some(user_id),
                status: Some(SessionStatus::Revoked),
                active_flag: Some(false),
                ..SessionFilter::default()
            },
            PageRequest { page: 0, size: 10 },
        )
        .await
        .unwrap();
    assert_eq!(revoked.total_elements, 1);
    assert_eq!(revoked.content[0].session_id, stale.session_id);

    store
        .bulk_delete_expired(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert!(store.find_by_id(stale.session_id, None).await.unwrap().is_none());
    assert!(store.find_by_id(fresh.session_id, None).await.unwrap().is_some());

    let revoked = store
        .bulk_revoke_by_user(user_id, Utc::now(), "admin", SessionStatus::Revoked)
        .await
        .unwrap();
    assert_eq!(revoked, 1);
}

#[tokio::test]
async fn insert_exclusive_displaces_name_only_rows() {
    let Some(pool) = test_pool().await else { return };
    let store = PgSessionStore::new(pool);
    let user_id = unique_user_id();

    let mut name_only = new_session(user_id, "pg-erin");
    name_only.user_id = None;
    let (name_only, _) = store.insert_exclusive(name_only, Utc::now()).await.unwrap();
    assert_eq!(name_only.user_id, None);

    let (with_id, displaced) = store
        .insert_exclusive(new_session(user_id, "pg-erin"), Utc::now())
        .await
        .unwrap();
    assert_eq!(displaced, 1);

    let active = store
        .find_filtered(
            &SessionFilter {
                user_name: Some(with_id.user_name.clone()),
                active_flag: Some(true),
                ..SessionFilter::default()
            },
            PageRequest { page: 0, size: 10 },
        )
        .await
        .unwrap();
    assert_eq!(active.total_elements, 1);
    assert_eq!(active.content[0].session_id, with_id.session_id);

    let old = store.find_by_id(name_only.session_id, None).await.unwrap().unwrap();
    assert_eq!(old.status, SessionStatus::Revoked);
}

#[tokio::test]
async fn concurrent_mixed_identity_creates_leave_one_active() {
    let Some(pool) = test_pool().await else { return };
    let store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool));
    let service = Arc::new(SessionService::new(
        store.clone(),
        Arc::new(SecureTokenGenerator),
        SessionPolicy::default(),
    ));
    let user_id = unique_user_id();
    let user_name = format!("pg-mixed-{}", user_id);

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        let user_name = user_name.clone();
        handles.push(tokio::spawn(async move {
            service
                .create(CreateSession {
                    user_id: (i % 2 == 0).then_some(user_id),
                    user_name: Some(user_name),
                    ..CreateSession::default()
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let active = store
        .find_filtered(
            &SessionFilter {
                user_name: Some(user_name),
                active_flag: Some(true),
                ..SessionFilter::default()
            },
            PageRequest { page: 0, size: 10 },
        )
        .await
        .unwrap();
    assert_eq!(active.total_elements, 1);
}

#[tokio::test]
async fn validate_by_id_expires_lazily() {
    let Some(pool) = test_pool().await else { return };
    let store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool));
    let service = SessionService::new(
        store.clone(),
        Arc::new(SecureTokenGenerator),
        SessionPolicy::default(),
    );
    let user_id = unique_user_id();

    let mut lapsed = new_session(user_id, "pg-frank");
    lapsed.expires_at = lapsed.created_date - Duration::minutes(1);
    let (lapsed, _) = store.insert_exclusive(lapsed, Utc::now()).await.unwrap();

    assert!(matches!(
        service.validate_id(Some(lapsed.session_id)).await.unwrap(),
        SessionValidation::Invalid { expires_at: Some(at), .. } if at == lapsed.expires_at
    ));
    let stored = store.find_by_id(lapsed.session_id, None).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Expired);
    assert!(!stored.active_flag);

    assert!(matches!(
        service.validate_id(Some(lapsed.session_id)).await.unwrap(),
        SessionValidation::Invalid { expires_at: None, .. }
    ));
}
