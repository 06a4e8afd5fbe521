use axum::{
    extract::{Extension, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppError,
    models::session::{Session, SessionStatus},
    services::session::{
        CallerIdentity, CreateSession, InvalidReason, ListSessions, RevokeAllSessions,
        RevokeSession, SessionValidation, SessionView,
    },
    state::AppState,
    types::{SessionId, UserId},
};

const LIST_SORT: &str = "createdDate,desc";

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub user_id: Option<UserId>,
    #[validate(length(max = 255))]
    pub user_name: Option<String>,
    #[serde(default, alias = "roleName")]
    pub roles: Vec<String>,
    pub ttl_minutes: Option<i64>,
    #[validate(length(max = 64))]
    pub ip_address: Option<String>,
    #[validate(length(max = 512))]
    pub user_agent: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub meta_data: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub session_token: String,
    pub created_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<UserId>,
    pub user_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenRequest {
    pub session_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdRequest {
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidSessionResponse {
    pub valid: bool,
    pub session_id: SessionId,
    /// Echoed only when validating by id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub user_id: Option<UserId>,
    pub user_name: String,
    pub roles: Vec<String>,
    pub status: SessionStatus,
    pub created_date: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvalidSessionResponse {
    pub valid: bool,
    pub reason: InvalidReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionRequest {
    pub session_token: Option<String>,
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendSessionRequest {
    pub session_token: Option<String>,
    pub additional_minutes: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionExpiryResponse {
    pub session_id: SessionId,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionRequest {
    pub session_token: Option<String>,
    pub session_id: Option<SessionId>,
    #[validate(length(max = 255))]
    pub revoked_by: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionResponse {
    pub success: bool,
    pub session_id: SessionId,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAllSessionsRequest {
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    #[validate(length(max = 255))]
    pub revoked_by: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAllSessionsResponse {
    pub revoked: u64,
    pub revoked_at: DateTime<Utc>,
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionListRequest {
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub status: Option<String>,
    pub active_flag: Option<bool>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub user_name: String,
    pub roles: Vec<String>,
    pub status: SessionStatus,
    pub created_date: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub active_flag: bool,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            user_id: session.user_id,
            user_name: session.user_name,
            roles: session.roles,
            status: session.status,
            created_date: session.created_date,
            last_seen_at: session.last_seen_at,
            expires_at: session.expires_at,
            ip_address: session.ip_address,
            active_flag: session.active_flag,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
    pub sort: String,
    pub content: Vec<SessionSummary>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSessionsRequest {
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSessionsResponse {
    pub deleted: u64,
    pub threshold_date: DateTime<Utc>,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    payload.validate()?;

    let session = state
        .sessions
        .create(CreateSession {
            user_id: payload.user_id,
            user_name: payload.user_name,
            roles: payload.roles,
            ttl_minutes: payload.ttl_minutes,
            ip_address: payload.ip_address.or_else(|| client_ip(&headers)),
            user_agent: payload.user_agent.or_else(|| header_value(&headers, USER_AGENT.as_str())),
            meta_data: payload.meta_data,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.session_id,
            session_token: session.session_token,
            created_date: session.created_date,
            expires_at: session.expires_at,
            user_id: session.user_id,
            user_name: session.user_name,
            roles: session.roles,
        }),
    ))
}

pub async fn validate_session_token(
    State(state): State<AppState>,
    Json(payload): Json<SessionTokenRequest>,
) -> Result<Response, AppError> {
    let validation = state
        .sessions
        .validate_token(payload.session_token.as_deref())
        .await?;
    Ok(validation_response(validation, false))
}

pub async fn validate_session_id(
    State(state): State<AppState>,
    Json(payload): Json<SessionIdRequest>,
) -> Result<Response, AppError> {
    let validation = state.sessions.validate_id(payload.session_id).await?;
    Ok(validation_response(validation, true))
}

fn validation_response(validation: SessionValidation, include_token: bool) -> Response {
    match validation {
        SessionValidation::Valid(session) => Json(ValidSessionResponse {
            valid: true,
            session_id: session.session_id,
            session_token: include_token.then_some(session.session_token),
            user_id: session.user_id,
            user_name: session.user_name,
            roles: session.roles,
            status: session.status,
            created_date: session.created_date,
            last_seen_at: session.last_seen_at,
            expires_at: session.expires_at,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
        })
        .into_response(),
        SessionValidation::Invalid { reason, expires_at } => (
            StatusCode::UNAUTHORIZED,
            Json(InvalidSessionResponse {
                valid: false,
                reason,
                expires_at,
            }),
        )
            .into_response(),
    }
}

pub async fn refresh_session(
    State(state): State<AppState>,
    Json(payload): Json<RefreshSessionRequest>,
) -> Result<Json<SessionExpiryResponse>, AppError> {
    let session = state
        .sessions
        .refresh(payload.session_token.as_deref(), payload.ttl_minutes)
        .await?;
    Ok(Json(expiry_response(session)))
}

pub async fn extend_session(
    State(state): State<AppState>,
    Json(payload): Json<ExtendSessionRequest>,
) -> Result<Json<SessionExpiryResponse>, AppError> {
    let session = state
        .sessions
        .extend(payload.session_token.as_deref(), payload.additional_minutes)
        .await?;
    Ok(Json(expiry_response(session)))
}

fn expiry_response(session: Session) -> SessionExpiryResponse {
    SessionExpiryResponse {
        session_id: session.session_id,
        session_token: session.session_token,
        expires_at: session.expires_at,
    }
}

pub async fn revoke_session(
    State(state): State<AppState>,
    Json(payload): Json<RevokeSessionRequest>,
) -> Result<Json<RevokeSessionResponse>, AppError> {
    payload.validate()?;
    let outcome = state
        .sessions
        .revoke(RevokeSession {
            session_token: payload.session_token,
            session_id: payload.session_id,
            revoked_by: payload.revoked_by,
        })
        .await?;
    Ok(Json(RevokeSessionResponse {
        success: true,
        session_id: outcome.session_id,
        revoked_at: outcome.revoked_at,
    }))
}

pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    Json(payload): Json<RevokeAllSessionsRequest>,
) -> Result<Json<RevokeAllSessionsResponse>, AppError> {
    payload.validate()?;
    let outcome = state
        .sessions
        .revoke_all(RevokeAllSessions {
            user_id: payload.user_id,
            user_name: payload.user_name,
            revoked_by: payload.revoked_by,
        })
        .await?;
    Ok(Json(RevokeAllSessionsResponse {
        revoked: outcome.revoked,
        revoked_at: outcome.revoked_at,
        user_id: outcome.user_id,
        user_name: outcome.user_name,
    }))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Json(payload): Json<SessionListRequest>,
) -> Result<Json<SessionListResponse>, AppError> {
    let page = state
        .sessions
        .list(ListSessions {
            user_id: payload.user_id,
            user_name: payload.user_name,
            status: payload.status,
            active_flag: payload.active_flag,
            page: payload.page,
            size: payload.size,
        })
        .await?
        .map(SessionSummary::from);

    Ok(Json(SessionListResponse {
        page: page.page,
        size: page.size,
        total_elements: page.total_elements,
        total_pages: page.total_pages,
        sort: LIST_SORT.to_string(),
        content: page.content,
    }))
}

pub async fn cleanup_sessions(
    State(state): State<AppState>,
    Json(payload): Json<CleanupSessionsRequest>,
) -> Result<Json<CleanupSessionsResponse>, AppError> {
    let outcome = state.sessions.cleanup(payload.older_than_days).await?;
    Ok(Json(CleanupSessionsResponse {
        deleted: outcome.deleted,
        threshold_date: outcome.threshold,
    }))
}

pub async fn get_session_by_id(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<SessionIdRequest>,
) -> Result<Json<SessionView>, AppError> {
    let view = state
        .sessions
        .get_for_caller(payload.session_id, &caller)
        .await?;
    Ok(Json(view))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of `x-forwarded-for`, then `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn create_request_accepts_role_name_alias() {
        let payload: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "userName": "alice",
            "roleName": ["ADMIN"],
            "ttlMinutes": 60
        }))
        .unwrap();
        assert_eq!(payload.roles, vec!["ADMIN"]);
        assert_eq!(payload.ttl_minutes, Some(60));
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn oversized_revoked_by_fails_validation() {
        let payload = RevokeSessionRequest {
            session_token: None,
            session_id: Some(SessionId::new(1)),
            revoked_by: Some("x".repeat(300)),
        };
        assert!(payload.validate().is_err());
    }
}
