//! HTTP error adapter: maps service errors to status codes and stable
//! `{error, message}` bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use snapact::service::ServiceError;
use snapact::ErrorCode;

/// A client-facing API error.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        let status = match &err {
            ServiceError::MissingUserId
            | ServiceError::MissingImage
            | ServiceError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            ServiceError::LimitReached(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Database(e) => {
                // Unexpected internals are logged, never surfaced.
                tracing::error!("Internal error serving request: {}", e);
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::ServerError,
                    "internal server error",
                );
            }
        };
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}
