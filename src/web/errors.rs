//! # Web API Error Types
//!
//! Maps orchestrator errors onto HTTP status codes with a JSON body of the
//! form `{"error": {"code": ..., "message": ...}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error::RenderError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Service temporarily unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Internal server error")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            Self::NotFound { message } => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
            Self::BadRequest { message } => (StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
            Self::Conflict { message } => (StatusCode::CONFLICT, "CONFLICT", message),
            Self::ServiceUnavailable { message } => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
            }
            Self::Internal { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(error: RenderError) -> Self {
        let message = error.to_string();
        match error {
            RenderError::InvalidSpec(_) => Self::BadRequest { message },
            RenderError::NotFound(_) => Self::NotFound { message },
            RenderError::InvalidState(_)
            | RenderError::StaleUpdate { .. }
            | RenderError::RevisionInUse { .. } => Self::Conflict { message },
            RenderError::Transient(_) | RenderError::StorageUnavailable(_) => {
                Self::ServiceUnavailable { message }
            }
            _ => Self::Internal { message },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal { message } = &self {
            tracing::error!(error = %message, "Request failed with internal error");
        }
        let (status_code, error_code, message) = self.parts();
        let body = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });
        (status_code, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
