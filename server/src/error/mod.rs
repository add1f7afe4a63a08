use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::summary::{ExtractError, FetchError, SummaryError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ExtractError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Internal server error")]
    Internal,
}

impl From<SummaryError> for AppError {
    fn from(e: SummaryError) -> Self {
        match e {
            SummaryError::Fetch(e) => AppError::Fetch(e),
            SummaryError::Extract(e) => AppError::Parse(e),
            SummaryError::Task(e) => {
                tracing::error!(error = ?e, "Summary extraction task did not complete");
                AppError::Internal
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Fetch(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Parse(e) => {
                tracing::error!("Page parse error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Encoding(e) => {
                tracing::error!("Summary encoding error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to encode page summary".into(),
                )
            }
            AppError::Internal => {
                tracing::error!("Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
