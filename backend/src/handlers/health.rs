use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub detail: &'static str,
}

/// Reports whether the session store answers.
pub async fn custom_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.sessions.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "UP",
                detail: "DB is reachable",
            }),
        ),
        Err(err) => {
            tracing::error!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "DOWN",
                    detail: "DB connection failed",
                }),
            )
        }
    }
}
