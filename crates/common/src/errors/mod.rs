//! Error types for ClipForge services
//!
//! Provides:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes for client handling
//! - Structured error responses for the status surface

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    UnsupportedFormat,
    FileTooLarge,
    DurationExceeded,

    // Quota errors (2xxx)
    QuotaExceeded,

    // Resource errors (3xxx)
    JobNotFound,

    // Conflict errors (4xxx)
    DuplicateActiveJob,
    InvalidTransition,

    // Queue errors (5xxx)
    QueueFull,
    QueueClosed,

    // External service errors (6xxx)
    UpstreamError,
    AllProvidersFailed,

    // Storage errors (7xxx)
    StorageError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::UnsupportedFormat => 1002,
            ErrorCode::FileTooLarge => 1003,
            ErrorCode::DurationExceeded => 1004,

            // Quota (2xxx)
            ErrorCode::QuotaExceeded => 2001,

            // Resources (3xxx)
            ErrorCode::JobNotFound => 3001,

            // Conflicts (4xxx)
            ErrorCode::DuplicateActiveJob => 4001,
            ErrorCode::InvalidTransition => 4002,

            // Queue (5xxx)
            ErrorCode::QueueFull => 5001,
            ErrorCode::QueueClosed => 5002,

            // External (6xxx)
            ErrorCode::UpstreamError => 6001,
            ErrorCode::AllProvidersFailed => 6002,

            // Storage (7xxx)
            ErrorCode::StorageError => 7001,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors, surfaced synchronously at submit
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Unsupported media format: {format}")]
    UnsupportedFormat { format: String },

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Duration {duration_secs:.0}s exceeds maximum of {limit_secs:.0}s")]
    DurationExceeded { duration_secs: f64, limit_secs: f64 },

    // Caller-side quota check failed pre-submit
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    // Resource errors
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    // Conflict errors
    #[error("An active job already exists for this file: {job_id}")]
    DuplicateActiveJob { job_id: String },

    #[error("Illegal status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Queue backpressure
    #[error("Submission queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Submission queue is closed")]
    QueueClosed,

    // External service errors
    #[error("Upstream provider error: {message}")]
    Upstream { message: String },

    #[error("All providers failed for capability {capability}")]
    AllProvidersFailed { capability: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            AppError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            AppError::DurationExceeded { .. } => ErrorCode::DurationExceeded,
            AppError::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            AppError::JobNotFound { .. } => ErrorCode::JobNotFound,
            AppError::DuplicateActiveJob { .. } => ErrorCode::DuplicateActiveJob,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::QueueFull { .. } => ErrorCode::QueueFull,
            AppError::QueueClosed => ErrorCode::QueueClosed,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::AllProvidersFailed { .. } => ErrorCode::AllProvidersFailed,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Validation and quota errors are rejected pre-enqueue and never retried
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::UnsupportedFormat { .. }
                | AppError::FileTooLarge { .. }
                | AppError::DurationExceeded { .. }
                | AppError::QuotaExceeded { .. }
        )
    }
}

/// Structured error payload surfaced to callers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let code = err.code();
        ErrorResponse {
            error: ErrorDetails {
                code,
                numeric_code: code.as_code(),
                message: err.to_string(),
                details: None,
            },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::JobNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::JobNotFound);
        assert_eq!(err.code().as_code(), 3001);
    }

    #[test]
    fn test_validation_is_rejection() {
        let err = AppError::DurationExceeded {
            duration_secs: 9000.0,
            limit_secs: 7200.0,
        };
        assert!(err.is_rejection());
        assert_eq!(err.code().as_code(), 1004);
    }

    #[test]
    fn test_queue_full_not_rejection() {
        let err = AppError::QueueFull { capacity: 64 };
        assert!(!err.is_rejection());
        assert_eq!(err.code(), ErrorCode::QueueFull);
    }

    #[test]
    fn test_error_response_serializes() {
        let err = AppError::QueueFull { capacity: 8 };
        let resp = ErrorResponse::from(&err);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("QUEUE_FULL"));
        assert!(json.contains("5001"));
    }
}
