use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::data_formats::ApiResponse;

/// Domain failure reported through the RPC envelope.
///
/// Every variant carries the human-readable message the client sees; the
/// variant itself keeps failures distinguishable in code instead of by
/// string matching.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("you're not logged in")]
    NotAuthenticated,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("system malfunction")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        ApiError::Internal(value.into())
    }
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidArgument(message.into())
    }

    /// Domain failures come back as HTTP 200 with `status: ERROR`,
    /// never as an HTTP error code.
    pub fn to_json_response(&self) -> (StatusCode, Json<ApiResponse>) {
        if let ApiError::Internal(source) = self {
            tracing::error!(error = %source, "api request failed");
        }
        (StatusCode::OK, Json(ApiResponse::error(self.to_string())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        self.to_json_response().into_response()
    }
}
