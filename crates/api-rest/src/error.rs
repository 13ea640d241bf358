//! Mapping of domain failures onto HTTP responses.

use api_shared::dto::{ErrorBody, FieldErrorDto};
use api_shared::AuthError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use reqtrack_core::{CoreError, FieldError};
use reqtrack_files::FilesError;

#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    Auth(AuthError),
    Files(FilesError),
    Multipart(MultipartError),
    BadRequest(String),
    Unavailable(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => core_status(e),
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Files(e) => files_status(e),
            ApiError::Multipart(e) => e.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Core(CoreError::Validation(_)) => "validation",
            ApiError::Core(CoreError::InvalidInput(_) | CoreError::Id(_) | CoreError::Text(_))
            | ApiError::BadRequest(_) => "bad_request",
            ApiError::Core(CoreError::Unauthenticated(_)) | ApiError::Auth(_) => {
                "unauthenticated"
            }
            ApiError::Core(CoreError::Forbidden(_)) => "forbidden",
            ApiError::Core(CoreError::NotFound { .. }) => "not_found",
            ApiError::Core(CoreError::Conflict(_)) => "conflict",
            ApiError::Core(CoreError::InvalidTransition { .. }) => "invalid_transition",
            ApiError::Core(CoreError::Files(e)) | ApiError::Files(e) => files_kind(e),
            ApiError::Core(_) => "internal",
            ApiError::Multipart(_) => "bad_request",
            ApiError::Unavailable(_) => "unavailable",
        }
    }

    fn fields(&self) -> Vec<FieldErrorDto> {
        match self {
            ApiError::Core(CoreError::Validation(errors)) => {
                errors.iter().map(FieldErrorDto::from).collect()
            }
            _ => Vec::new(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Core(e) => e.to_string(),
            ApiError::Auth(e) => e.to_string(),
            ApiError::Files(e) => e.to_string(),
            ApiError::Multipart(e) => e.body_text(),
            ApiError::BadRequest(m) | ApiError::Unavailable(m) => m.clone(),
        }
    }
}

fn core_status(e: &CoreError) -> StatusCode {
    match e {
        CoreError::InvalidInput(_) | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) | CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CoreError::Id(_) | CoreError::Text(_) => StatusCode::BAD_REQUEST,
        CoreError::Files(e) => files_status(e),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn files_status(e: &FilesError) -> StatusCode {
    match e {
        FilesError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        FilesError::Auth(_) | FilesError::Remote { .. } | FilesError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn files_kind(e: &FilesError) -> &'static str {
    match e {
        FilesError::NotFound(_) => "not_found",
        e if e.is_client_error() => "bad_request",
        FilesError::Auth(_) | FilesError::Remote { .. } | FilesError::Http(_) => "upstream",
        _ => "internal",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("request failed: {:?}", self);
            match status {
                StatusCode::BAD_GATEWAY => "Attachment storage unavailable".to_string(),
                _ => "Internal error".to_string(),
            }
        } else {
            self.message()
        };
        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
            fields: self.fields(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<FilesError> for ApiError {
    fn from(e: FilesError) -> Self {
        ApiError::Files(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Multipart(e)
    }
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        ApiError::Core(CoreError::Validation(errors))
    }
}
