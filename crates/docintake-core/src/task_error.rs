//! Job execution error types
//!
//! A processing-queue job either produces an outcome or fails with a [`JobError`].
//! The error carries a recoverable flag: recoverable failures are retried with backoff
//! until the attempt budget runs out, unrecoverable ones fail the job immediately.

use std::fmt;

use crate::error::{AppError, ErrorMetadata};

#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    /// Failure that will not change on retry (missing file row, invalid payload).
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Transient failure (storage hiccup, database timeout, parser timeout).
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Untyped errors default to recoverable.
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

impl From<AppError> for JobError {
    fn from(err: AppError) -> Self {
        let recoverable = err.is_recoverable();
        Self {
            inner: anyhow::Error::new(err),
            recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_keeps_its_recoverability() {
        let err: JobError = AppError::Storage("io".to_string()).into();
        assert!(err.is_recoverable());

        let err: JobError = AppError::NotFound("file".to_string()).into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("file"));
    }

    #[test]
    fn anyhow_defaults_to_recoverable() {
        let err: JobError = anyhow::anyhow!("network").into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn explicit_unrecoverable_is_not_retried() {
        let err = JobError::unrecoverable(anyhow::anyhow!("bad payload"));
        assert!(!err.is_recoverable());
        assert!(err.inner().to_string().contains("bad payload"));
    }
}
