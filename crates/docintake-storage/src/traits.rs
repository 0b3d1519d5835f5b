//! Storage abstraction trait
//!
//! The pipeline only needs path-addressed blobs: write, read, move, delete and an
//! existence check. Keys are relative, `/`-separated and never contain `..`.

use async_trait::async_trait;
use docintake_core::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Move failed: {0}")]
    MoveFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("stored file {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::AlreadyExists(key) => {
                AppError::Conflict(format!("stored file {} already exists", key))
            }
            other => AppError::Storage(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` at `key`, creating intermediate directories. Overwrites.
    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Move a stored file. Fails with `NotFound` when `from` is missing and with
    /// `AlreadyExists` when `to` is taken; an existing file is never overwritten.
    async fn move_file(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Delete a stored file. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;
}
