use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::infrastructure::encoder::ffmpeg::EncodingError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Every failure a request can end with. The HTTP status is fixed by the
/// variant chosen at the point of failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Video file is required")]
    MissingFile,

    #[error("Unsupported file type")]
    UnsupportedFileType,

    #[error("File too large")]
    FileTooLarge,

    #[error("Too many files")]
    TooManyFiles,

    #[error("Unexpected field")]
    UnexpectedFile,

    #[error("Field value too long")]
    FieldTooLong,

    #[error("{0}")]
    Multipart(String),

    #[error("temporary storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingFile
            | ApiError::TooManyFiles
            | ApiError::UnexpectedFile
            | ApiError::FieldTooLong
            | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) | ApiError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for multipart failures.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::FileTooLarge => Some("LIMIT_FILE_SIZE"),
            ApiError::TooManyFiles => Some("LIMIT_FILE_COUNT"),
            ApiError::UnexpectedFile => Some("LIMIT_UNEXPECTED_FILE"),
            ApiError::FieldTooLong => Some("LIMIT_FIELD_VALUE"),
            ApiError::Multipart(_) => Some("MALFORMED_MULTIPART"),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Storage(_) => "Internal server error".to_string(),
            ApiError::Encoding(_) => "Video optimization failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message(),
            code: self.code().map(str::to_string),
        };
        (self.status(), Json(body)).into_response()
    }
}
