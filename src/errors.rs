use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Error type shared across the turn pipeline and the HTTP surface.
///
/// Only `NotFound` and `BadRequest` messages are safe to show a caller; every
/// other variant is logged with its detail and mapped to a generic body.
#[derive(Debug)]
pub enum AppError {
    /// Store read or write failed.
    DatabaseError(sqlx::Error),
    /// The requested conversation or lead does not exist.
    NotFound(String),
    /// Invalid caller input.
    BadRequest(String),
    /// The semantic adapter call failed or returned garbage.
    ExternalApiError(String),
    /// The model call failed or its output could not be used.
    GenerationError(String),
    /// Anything that does not fit the taxonomy above.
    InternalError(String),
    /// A wrapped error plus where it happened.
    WithContext {
        source: Box<AppError>,
        context: String,
    },
}

impl AppError {
    /// HTTP status and caller-visible message for this error.
    fn status_and_public_message(&self) -> (StatusCode, String) {
        match self {
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ExternalApiError(_) => (
                StatusCode::BAD_GATEWAY,
                "External service error".to_string(),
            ),
            AppError::GenerationError(_) => (
                StatusCode::BAD_GATEWAY,
                "Generation service error".to_string(),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            // Context frames delegate to whatever they wrap
            AppError::WithContext { source, .. } => source.status_and_public_message(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::GenerationError(msg) => write!(f, "Generation error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => write!(f, "{}: {}", context, source),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, public_message) = self.status_and_public_message();

        // 4xx means the caller got it wrong; everything else is our problem
        // and gets the full detail in the log, never in the body.
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        (status, Json(json!({ "error": public_message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

/// Adds a location note to an error, in the manner of `anyhow::Context`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}
