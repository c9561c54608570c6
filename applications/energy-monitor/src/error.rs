use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::octopus::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("{0}")]
    Validation(String),
    #[error("DB error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Auth(msg) => AppError::Auth(msg),
            other => AppError::Remote(other.to_string()),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Db(e) => {
                tracing::error!(error = ?e, "Database error");
                "Database error".to_string()
            }
            AppError::Json(e) => {
                tracing::error!(error = ?e, "Serialization error");
                "Serialization error".to_string()
            }
            AppError::Other(e) => {
                tracing::error!(error = ?e, "Internal error");
                "Internal server error".to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            other => {
                tracing::error!(error = %other, "Request failed");
                other.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
