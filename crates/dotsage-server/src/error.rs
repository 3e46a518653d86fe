// HTTP error type and its JSON response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything a handler can fail with. The `Display` text is what the client
/// sees in `{"error": ...}`, except for `Internal`, which is logged and
/// replaced by a generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid payload")]
    InvalidPayload,

    #[error("{0}")]
    BadRequest(String),

    #[error("Question not found")]
    QuestionNotFound,

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to generate answer")]
    AnswerFailed,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::QuestionNotFound | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AnswerFailed | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                error!("Request failed: {e:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
