#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::{
        health::HealthResponse,
        sessions::{
            CleanupSessionsRequest, CleanupSessionsResponse, CreateSessionRequest,
            CreateSessionResponse, ExtendSessionRequest, InvalidSessionResponse,
            RefreshSessionRequest, RevokeAllSessionsRequest, RevokeAllSessionsResponse,
            RevokeSessionRequest, RevokeSessionResponse, SessionExpiryResponse, SessionIdRequest,
            SessionListRequest, SessionListResponse, SessionSummary, SessionTokenRequest,
            ValidSessionResponse,
        },
    },
    models::session::SessionStatus,
    services::session::{FullSessionView, InvalidReason, RestrictedSessionView, SessionView},
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_doc,
        validate_session_token_doc,
        validate_session_id_doc,
        refresh_session_doc,
        extend_session_doc,
        revoke_session_doc,
        revoke_all_sessions_doc,
        list_sessions_doc,
        cleanup_sessions_doc,
        get_session_by_id_doc,
        custom_health_doc
    ),
    components(
        schemas(
            CreateSessionRequest,
            CreateSessionResponse,
            SessionTokenRequest,
            SessionIdRequest,
            ValidSessionResponse,
            InvalidSessionResponse,
            InvalidReason,
            RefreshSessionRequest,
            ExtendSessionRequest,
            SessionExpiryResponse,
            RevokeSessionRequest,
            RevokeSessionResponse,
            RevokeAllSessionsRequest,
            RevokeAllSessionsResponse,
            SessionListRequest,
            SessionListResponse,
            SessionSummary,
            SessionStatus,
            CleanupSessionsRequest,
            CleanupSessionsResponse,
            SessionView,
            FullSessionView,
            RestrictedSessionView,
            HealthResponse,
            ErrorResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Sessions", description = "Session lifecycle API"),
        (name = "Health", description = "Liveness of the session store")
    )
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    post,
    path = "/api/session/create-session",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session issued; earlier active sessions of the user are revoked", body = CreateSessionResponse),
        (status = 400, description = "Missing user name", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn create_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/validate-session-token",
    request_body = SessionTokenRequest,
    responses(
        (status = 200, body = ValidSessionResponse),
        (status = 401, description = "EXPIRED or INVALID_OR_REVOKED", body = InvalidSessionResponse)
    ),
    tag = "Sessions"
)]
fn validate_session_token_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/validate-session-id",
    request_body = SessionIdRequest,
    responses(
        (status = 200, body = ValidSessionResponse),
        (status = 400, description = "Missing session id", body = ErrorResponse),
        (status = 401, body = InvalidSessionResponse)
    ),
    tag = "Sessions"
)]
fn validate_session_id_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/refresh-session",
    request_body = RefreshSessionRequest,
    responses(
        (status = 200, body = SessionExpiryResponse),
        (status = 400, description = "INVALID_PAYLOAD or CANNOT_REFRESH", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn refresh_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/extend-session",
    request_body = ExtendSessionRequest,
    responses(
        (status = 200, description = "Expiry reset to now + additionalMinutes", body = SessionExpiryResponse),
        (status = 400, description = "INVALID_PAYLOAD or NOT_ACTIVE", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn extend_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/revoke-session",
    request_body = RevokeSessionRequest,
    responses(
        (status = 200, body = RevokeSessionResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn revoke_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/revoke-all-session",
    request_body = RevokeAllSessionsRequest,
    responses(
        (status = 200, body = RevokeAllSessionsResponse),
        (status = 400, body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn revoke_all_sessions_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/session-list",
    request_body = SessionListRequest,
    responses(
        (status = 200, body = SessionListResponse),
        (status = 400, description = "INVALID_FILTER with validValues", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn list_sessions_doc() {}

#[utoipa::path(
    delete,
    path = "/api/session/cleanup-session",
    request_body = CleanupSessionsRequest,
    responses((status = 200, body = CleanupSessionsResponse)),
    tag = "Sessions"
)]
fn cleanup_sessions_doc() {}

#[utoipa::path(
    post,
    path = "/api/session/get-session-id",
    request_body = SessionIdRequest,
    responses(
        (status = 200, description = "Full view for owner/admin, restricted otherwise", body = SessionView),
        (status = 401, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("BearerAuth" = []))
)]
fn get_session_by_id_doc() {}

#[utoipa::path(
    get,
    path = "/custom-health",
    responses(
        (status = 200, body = HealthResponse),
        (status = 503, body = HealthResponse)
    ),
    tag = "Health"
)]
fn custom_health_doc() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_session_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/session/create-session",
            "/api/session/cleanup-session",
            "/api/session/get-session-id",
            "/custom-health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{} missing", path);
        }
    }
}
