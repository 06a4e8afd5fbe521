use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::services::session::SessionError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    BadRequest(String),
    InvalidState {
        code: &'static str,
        message: String,
    },
    InvalidFilter {
        message: String,
        valid_values: Vec<&'static str>,
    },
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND", None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED", None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "INVALID_PAYLOAD", None),
            AppError::InvalidState { code, message } => {
                (StatusCode::BAD_REQUEST, message, code, None)
            }
            AppError::InvalidFilter {
                message,
                valid_values,
            } => (
                StatusCode::BAD_REQUEST,
                message,
                "INVALID_FILTER",
                Some(serde_json::json!({ "validValues": valid_values })),
            ),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR",
                    None,
                )
            }
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR",
                Some(serde_json::json!({ "errors": errors })),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::MalformedInput(msg) => AppError::BadRequest(msg),
            SessionError::NotFound => AppError::NotFound("Session not found".to_string()),
            SessionError::InvalidState { code, message } => AppError::InvalidState { code, message },
            SessionError::Unauthorized(msg) => AppError::Unauthorized(msg),
            SessionError::InvalidStatus(parse_err) => AppError::InvalidFilter {
                message: format!(
                    "status must be one of {}",
                    parse_err.valid_values().join(",")
                ),
                valid_values: parse_err.valid_values(),
            },
            err @ SessionError::Store { .. } => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}
