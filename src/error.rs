//! # Error Handling
//!
//! Custom error types and their conversion to HTTP responses.
//!
//! ## Error Categories:
//! - **Internal**: server-side problems (500 errors)
//! - **BadRequest / ValidationError**: client sent invalid data (400 errors)
//! - **NotFound**: requested resource doesn't exist (404 errors)
//! - **ConfigError**: configuration problems (500 errors)
//! - **ModelLoad**: model weights could not be downloaded or opened (502)
//! - **Transcription**: the external engine failed; its message is passed
//!   through untouched so the caller owns the user-facing wording (500)
//!
//! Deliberately absent: any variant for maintenance-cycle failures. The
//! lifecycle manager degrades per item and always completes, so it never
//! surfaces an error through this type.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (filesystem failures, poisoned locks, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// Model weights could not be fetched or loaded; nothing was cached
    ModelLoad(String),

    /// The external transcription engine reported a failure
    Transcription(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ModelLoad(msg) => write!(f, "Model load error: {}", msg),
            AppError::Transcription(msg) => write!(f, "Transcription error: {}", msg),
        }
    }
}

/// Converts errors into the JSON error body every endpoint shares:
///
/// ```json
/// {
///   "error": {
///     "type": "model_load_error",
///     "message": "failed to download base.bin",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AppError::ModelLoad(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "model_load_error",
                msg.clone(),
            ),
            AppError::Transcription(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "transcription_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>` in handler signatures.
pub type AppResult<T> = Result<T, AppError>;
