//! Authorization context adapter: turns a bearer JWT into a [`CallerIdentity`].

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    services::session::CallerIdentity,
    state::AppState,
    types::UserId,
    utils::jwt::{verify_access_token, Claims},
};

pub async fn caller(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;
    let claims = verify_access_token(token, &state.config.jwt_secret).map_err(|err| {
        tracing::debug!(error = %err, "Rejected access token");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;

    request.extensions_mut().insert(caller_identity(claims));
    Ok(next.run(request).await)
}

/// A non-numeric `sub` leaves the caller without a user id; ownership then
/// falls back to the user name for sessions that have none either.
pub fn caller_identity(claims: Claims) -> CallerIdentity {
    CallerIdentity {
        user_id: claims.sub.parse::<UserId>().ok(),
        user_name: claims.username,
        roles: claims.roles,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
