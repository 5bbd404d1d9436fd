//! Unified API error type and conversions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::StorageError;

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::BadRequest("invalid path".into()),
            StorageError::NotFound => ApiError::NotFound("not found".into()),
            StorageError::InvalidTarget => {
                ApiError::BadRequest("target is not a directory".into())
            }
            StorageError::TooLarge { size, limit } => ApiError::BadRequest(format!(
                "upload of {size} bytes exceeds limit of {limit} bytes"
            )),
            StorageError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}
