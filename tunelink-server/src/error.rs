//! Error types for tunelink-server
//!
//! One enum covers both surfaces: HTTP handlers turn it into a status code
//! with a JSON body, the realtime router turns it into an error notice on the
//! offending channel.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use tunelink_common::api::ApiAuthError;

/// Service error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    /// Missing, invalid or expired identity token (401 / channel close 1008)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Caller is not a participant of the match (403, channel stays open)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown user or match (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range input (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Persistence failed; the caller may retry (500)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Anything else (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the service Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code shared by HTTP bodies and realtime notices
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation_failed",
            Error::Storage(_) => "storage_failure",
            Error::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail safe to show a client
    ///
    /// Storage errors are logged in full but reported generically.
    pub fn client_message(&self) -> String {
        match self {
            Error::Storage(_) => "storage failure, please retry".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<tunelink_common::Error> for Error {
    fn from(err: tunelink_common::Error) -> Self {
        match err {
            tunelink_common::Error::Database(e) => Error::Storage(e),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<ApiAuthError> for Error {
    fn from(err: ApiAuthError) -> Self {
        Error::Unauthorized(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.client_message(),
            }
        }));

        (status, body).into_response()
    }
}
