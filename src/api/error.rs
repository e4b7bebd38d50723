use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::core::error::{ErrorKind, StorageError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure of a request, answered with a status and the plain error text
#[derive(Debug)]
pub enum ApiError {
    Storage(StorageError),
    /// Body missing, not JSON, or not the expected shape
    Body(JsonRejection),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Storage(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::AlreadyExists => StatusCode::CONFLICT,
                ErrorKind::ReferencedEntityMissing => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::MalformedInput => StatusCode::BAD_REQUEST,
                ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Storage(err) => write!(f, "{}", err),
            ApiError::Body(rejection) => write!(f, "{}", rejection.body_text()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
