//! Domain error types for the deployment server.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Rejected before any side effect (bad identifier, missing field)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Slug or database name already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Caller does not own the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Archive could not be staged or extracted
    #[error("Archive error: {0}")]
    Archive(String),

    /// Filesystem deployment failed (collision, copy failure)
    #[error("Deployment failed: {0}")]
    Deployment(String),

    /// Rename or delete failed; the original resource is preserved
    #[error("Lifecycle operation failed: {0}")]
    Lifecycle(String),

    /// Upload exceeded the configured size limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Local filesystem operation failed
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Catalog or engine operation failed
    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Archive(_) => "ARCHIVE_ERROR",
            AppError::Deployment(_) => "DEPLOYMENT_ERROR",
            AppError::Lifecycle(_) => "LIFECYCLE_ERROR",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::FileSystem(_) => "FILESYSTEM_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Archive(_)
            | AppError::Deployment(_)
            | AppError::Lifecycle(_)
            | AppError::FileSystem(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Database(err_str) => {
                tracing::error!("Database error: {}", err_str);
                "An internal database error occurred".to_string()
            }
            AppError::FileSystem(err_str) => {
                tracing::error!("File system error: {}", err_str);
                "An internal file system error occurred".to_string()
            }
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error: self.code().to_string(),
            message,
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("Invalid UUID: {}", err))
    }
}
