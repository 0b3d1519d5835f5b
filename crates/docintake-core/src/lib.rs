//! Docintake Core Library
//!
//! Domain models, error types and configuration shared by every crate of the
//! intake pipeline.

pub mod config;
pub mod error;
pub mod models;
pub mod task_error;

pub use config::{Config, QueueConfig, SmtpConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use task_error::JobError;
