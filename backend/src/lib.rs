//! Session lifecycle service: issues, validates, refreshes and revokes opaque
//! session tokens with a single active session per user.

pub mod background;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{docs::ApiDoc, state::AppState};

/// Builds the full HTTP application around `state`.
pub fn app(state: AppState) -> Router {
    let session_routes = Router::new()
        .route(
            "/api/session/create-session",
            post(handlers::sessions::create_session),
        )
        .route(
            "/api/session/validate-session-token",
            post(handlers::sessions::validate_session_token),
        )
        .route(
            "/api/session/validate-session-id",
            post(handlers::sessions::validate_session_id),
        )
        .route(
            "/api/session/refresh-session",
            post(handlers::sessions::refresh_session),
        )
        .route(
            "/api/session/extend-session",
            post(handlers::sessions::extend_session),
        )
        .route(
            "/api/session/revoke-session",
            post(handlers::sessions::revoke_session),
        )
        .route(
            "/api/session/revoke-all-session",
            post(handlers::sessions::revoke_all_sessions),
        )
        .route(
            "/api/session/session-list",
            post(handlers::sessions::list_sessions),
        )
        .route(
            "/api/session/cleanup-session",
            delete(handlers::sessions::cleanup_sessions),
        );

    // Needs a caller identity for the redaction decision.
    let caller_routes = Router::new()
        .route(
            "/api/session/get-session-id",
            post(handlers::sessions::get_session_by_id),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::caller,
        ));

    let cors = cors_layer(&state.config.cors_allow_origins);

    Router::new()
        .route("/custom-health", get(handlers::health::custom_health))
        .merge(session_routes)
        .merge(caller_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::log_error_responses))
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
