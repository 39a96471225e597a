use crate::store::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error: a status and a message safe to show the client.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            // Keys carry the user's root prefix; keep it out of the message.
            StorageError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "resource not found"),
            StorageError::AlreadyExists(_) => {
                Self::new(StatusCode::CONFLICT, "resource already exists")
            }
            StorageError::InvalidArgument(msg) => Self::bad_request(msg),
            StorageError::Connection { .. } => {
                tracing::error!(error = %err, "object store unavailable");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "storage temporarily unavailable")
            }
            StorageError::Configuration(_) | StorageError::StorageFailure { .. } => {
                tracing::error!(error = %err, "storage error");
                Self::internal("internal storage error")
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
