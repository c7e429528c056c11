//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use vntl_core::VntlError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// An error as sent to clients: a status plus `{ "error": code, "message": text }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_params", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

fn status_for(err: &VntlError) -> StatusCode {
    match err {
        VntlError::JobNotFound(_) | VntlError::SourceNotFound(_) | VntlError::NotAFile(_) => {
            StatusCode::NOT_FOUND
        }
        VntlError::PathEscape(_)
        | VntlError::InvalidParams(_)
        | VntlError::EmptySource(_)
        | VntlError::CorruptArchive(_)
        | VntlError::Zip(_) => StatusCode::BAD_REQUEST,
        VntlError::NotUtf8Decodable(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        VntlError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        VntlError::AlreadyExists(_) | VntlError::JobBusy(_) => StatusCode::CONFLICT,
        VntlError::TransformationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VntlError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        VntlError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<VntlError> for ApiError {
    fn from(err: VntlError) -> Self {
        Self::new(status_for(&err), err.code(), err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("worker task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
