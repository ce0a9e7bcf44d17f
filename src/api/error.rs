//! API error type and the JSON error body every route returns.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::errors::AppError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Unauthorized(_) => "UNAUTHENTICATED",
            Self::Forbidden(_) => "POLICY_DENIED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(message) => Self::BadRequest(message),
            AppError::Unauthenticated(message) => Self::Unauthorized(message),
            AppError::Policy(message) => Self::Forbidden(message),
            AppError::NotFound(message) => Self::NotFound(message),
            AppError::Conflict(message) => Self::Conflict(message),
            AppError::Storage(_) | AppError::Io(_) | AppError::Upstream(_) | AppError::Internal(_) => {
                tracing::error!(error = %err, "request failed");
                Self::Internal("internal error".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use crate::errors::AppError;
    use axum::http::StatusCode;

    #[test]
    fn app_errors_map_to_statuses() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            (AppError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            (AppError::Policy("x".into()), StatusCode::FORBIDDEN, "POLICY_DENIED"),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (AppError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        ];
        for (error, status, code) in cases {
            let api = ApiError::from(error);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let api = ApiError::from(AppError::Storage("no such column: secret_col".into()));
        assert_eq!(api.to_string(), "internal error");
    }
}
