#![allow(dead_code)]
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, sync::Arc};
use tower::ServiceExt;

use session_backend::{
    app,
    config::Config,
    repositories::{MemorySessionStore, SessionStore},
    services::{SecureTokenGenerator, SessionService},
    state::AppState,
    utils::jwt::create_access_token,
};

pub const TEST_JWT_SECRET: &str = "session-test-secret";

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some(TEST_JWT_SECRET.to_string()),
        _ => None,
    })
    .expect("test config")
}

pub fn app_with_store(store: Arc<dyn SessionStore>) -> Router {
    let config = test_config();
    let sessions = SessionService::new(
        store,
        Arc::new(SecureTokenGenerator),
        config.session_policy(),
    );
    app(AppState::new(sessions, config))
}

pub fn test_app() -> Router {
    app_with_store(Arc::new(MemorySessionStore::new()))
}

pub fn bearer_for(user_id: &str, username: &str, roles: &[&str]) -> String {
    let token = create_access_token(
        user_id.to_string(),
        username.to_string(),
        roles.iter().map(|r| r.to_string()).collect(),
        TEST_JWT_SECRET,
        Duration::hours(1),
    )
    .expect("create access token");
    format!("Bearer {}", token)
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    authorization: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body), None).await
}

/// Connects to `TEST_DATABASE_URL` and applies migrations; `None` skips the caller.
pub async fn test_pool() -> Option<PgPool> {
    let Ok(url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping Postgres test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("connect test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}
