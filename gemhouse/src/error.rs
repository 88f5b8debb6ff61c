//! # Error Handling and Response Types
//!
//! Repository operations distinguish three outcomes:
//!
//! - **Absence** is not an error. Lookups return `Ok(None)`, `delete` returns
//!   `Ok(false)`, `yank` returns `Ok(None)`.
//! - **Conflicts** ([`RepositoryError::Duplicate`]) are raised by `push`/`add`
//!   when a record for the identity already exists, in any state.
//! - **Storage failures** ([`StorageError`]) cover every byte I/O and
//!   transport problem and are propagated unmodified, never retried here.
//!
//! The HTTP front end wraps these in [`AppError`], which renders a JSON body:
//!
//! ```json
//! {
//!   "error": "gem foo-1.0.0 already exists",
//!   "code": "conflict",
//!   "details": null,
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```

use crate::identity::PackageIdentity;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Failure while moving bytes to or from the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("body stream error: {0}")]
    Body(String),

    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the repository API.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("gem {0} already exists")]
    Duplicate(PackageIdentity),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid gem identity: {0}")]
    InvalidIdentity(String),

    #[error("gem exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Storage(StorageError::Io(err))
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<Value>,
    pub timestamp: String,
}

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Conflict,
    NotFound,
    ValidationError,
    PayloadTooLarge,
    StorageError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Conflict => "conflict",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::StorageError => "storage_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    NotFound(String),
}

impl AppError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Repository(RepositoryError::Duplicate(_)) => ErrorCode::Conflict,
            AppError::Repository(RepositoryError::InvalidIdentity(_)) => ErrorCode::ValidationError,
            AppError::Repository(RepositoryError::TooLarge { .. }) => ErrorCode::PayloadTooLarge,
            AppError::Repository(RepositoryError::Storage(_))
            | AppError::Repository(RepositoryError::Config(_)) => ErrorCode::StorageError,
            AppError::NotFound(_) => ErrorCode::NotFound,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Repository(RepositoryError::Duplicate(identity)) => {
                Some(json!({ "name": identity.name(), "version": identity.version() }))
            }
            AppError::Repository(RepositoryError::TooLarge { limit }) => {
                Some(json!({ "limit": limit }))
            }
            _ => None,
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self.to_string(),
            code: self.error_code().as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        if code == ErrorCode::StorageError {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, code = code.as_str(), "Request rejected");
        }

        (code.http_status(), axum::Json(self.to_error_response())).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
