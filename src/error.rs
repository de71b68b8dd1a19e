//! Errors surfaced by the file lifecycle operations and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("invalid id")]
    InvalidId,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("provider credential expired and could not be refreshed")]
    AuthExpired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("summarization failed: {0}")]
    SummarizationFailed(String),
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl FileError {
    pub fn missing_credential() -> Self {
        FileError::Unauthorized("missing provider credential".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FileError::InvalidId | FileError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FileError::Unauthorized(_) | FileError::AuthExpired => StatusCode::UNAUTHORIZED,
            FileError::NotFound(_) => StatusCode::NOT_FOUND,
            FileError::UploadFailed(_)
            | FileError::DownloadFailed(_)
            | FileError::SummarizationFailed(_)
            | FileError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            FileError::InvalidId => "invalid_id",
            FileError::InvalidInput(_) => "invalid_input",
            FileError::Unauthorized(_) => "unauthorized",
            FileError::AuthExpired => "auth_expired",
            FileError::NotFound(_) => "not_found",
            FileError::UploadFailed(_) => "upload_failed",
            FileError::DownloadFailed(_) => "download_failed",
            FileError::SummarizationFailed(_) => "summarization_failed",
            FileError::Store(_) => "internal_error",
        }
    }
}

impl IntoResponse for FileError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // store details stay in the logs
            FileError::Store(e) => {
                tracing::error!("Document store failure: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                message,
                error: self.code().to_string(),
            }),
        )
            .into_response()
    }
}
