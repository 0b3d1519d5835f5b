//! Job handler trait
//!
//! The service layer implements this for the document allocator. The queue holds a weak
//! reference and calls `handle` for each attempt.

use async_trait::async_trait;
use std::sync::Arc;

use docintake_core::models::ProcessingJob;
use docintake_core::JobError;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one attempt. Expected routing outcomes are `Ok`; only infrastructure failures
    /// are errors, and only recoverable ones are retried.
    async fn handle(self: Arc<Self>, job: &ProcessingJob) -> Result<(), JobError>;

    /// Called once after the final failed attempt.
    async fn on_exhausted(self: Arc<Self>, job: &ProcessingJob, last_error: &str);
}
