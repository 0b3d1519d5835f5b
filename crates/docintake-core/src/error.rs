//! Error types module
//!
//! This module provides the core error types used throughout the intake pipeline.
//! Infrastructure and integrity failures are unified under the `AppError` enum.
//! Expected routing outcomes (duplicate upload, unmatched account number, document
//! number conflict) are *not* errors; they are modelled as outcome values by the
//! services that produce them.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues and conflicts
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be treated by callers
/// (retry decisions in the processing queue, log level in batch runs).
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "DATABASE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to compute content hash: {0}")]
    Hashing(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness guard rejected the write (content hash or company/document number).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Processing queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        // Unique violations surface as conflicts so callers can route them as outcomes.
        if let SqlxError::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return AppError::Conflict(db_err.message().to_string());
            }
        }
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (&'static str, bool, LogLevel) {
    match err {
        AppError::Database(_) => ("DATABASE_ERROR", true, LogLevel::Error),
        AppError::Storage(_) => ("STORAGE_ERROR", true, LogLevel::Error),
        AppError::Hashing(_) => ("HASHING_ERROR", false, LogLevel::Error),
        AppError::InvalidInput(_) => ("INVALID_INPUT", false, LogLevel::Debug),
        AppError::NotFound(_) => ("NOT_FOUND", false, LogLevel::Debug),
        AppError::Conflict(_) => ("CONFLICT", false, LogLevel::Warn),
        AppError::QueueUnavailable(_) => ("QUEUE_UNAVAILABLE", true, LogLevel::Error),
        AppError::Internal(_) => ("INTERNAL_ERROR", true, LogLevel::Error),
        AppError::InternalWithSource { .. } => ("INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_not_recoverable() {
        let err = AppError::Conflict("duplicate document number".to_string());
        assert!(err.is_conflict());
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "CONFLICT");
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn storage_errors_are_retried() {
        let err = AppError::Storage("disk unavailable".to_string());
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn hashing_failure_is_fatal() {
        let err = AppError::Hashing("read failed".to_string());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn anyhow_converts_to_internal_with_source() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AppError::InternalWithSource { .. }));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn io_error_converts_to_internal() {
        let err: AppError = io::Error::new(io::ErrorKind::Other, "gone").into();
        assert!(err.to_string().contains("IO error"));
    }
}
