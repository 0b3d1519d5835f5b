//! Bulk allocation runner.
//!
//! Processes a session's files one at a time, outside any request. Cancellation is
//! checked between items only; the allocation in progress always completes.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docintake_core::models::{AllocationResult, FileRecord, SessionStatus};
use docintake_core::AppError;
use docintake_db::{AllocationSessionStore, FileRepository};

use crate::allocator::{AllocationOutcome, DocumentAllocator, FieldSource};

#[derive(Clone)]
pub struct BulkAllocationRunner {
    allocator: Arc<DocumentAllocator>,
    files: Arc<dyn FileRepository>,
    sessions: Arc<dyn AllocationSessionStore>,
}

impl BulkAllocationRunner {
    pub fn new(
        allocator: Arc<DocumentAllocator>,
        files: Arc<dyn FileRepository>,
        sessions: Arc<dyn AllocationSessionStore>,
    ) -> Self {
        Self {
            allocator,
            files,
            sessions,
        }
    }

    async fn cancel_observed(&self, allocation_id: Uuid, cancel: &CancellationToken) -> Result<bool, AppError> {
        if cancel.is_cancelled() {
            return Ok(true);
        }
        // a cancel requested through another handle to the store
        Ok(self
            .sessions
            .get(allocation_id)
            .await?
            .map(|session| session.cancel_requested)
            .unwrap_or(true))
    }

    /// Run the session to completion or cancellation and return its final status.
    ///
    /// Per-item failures, including repository errors, become failed results. The session
    /// is always finished, even when progress could not be recorded.
    #[tracing::instrument(skip(self, file_ids, cancel), fields(total = file_ids.len()))]
    pub async fn run(
        &self,
        allocation_id: Uuid,
        file_ids: Vec<Uuid>,
        actor: String,
        cancel: CancellationToken,
    ) -> Result<SessionStatus, AppError> {
        let outcome = self.process(allocation_id, file_ids, &actor, &cancel).await;

        let status = match &outcome {
            Ok(status) => *status,
            Err(e) => {
                tracing::error!(error = %e, "Bulk allocation interrupted");
                if cancel.is_cancelled() {
                    SessionStatus::Cancelled
                } else {
                    SessionStatus::Completed
                }
            }
        };
        self.sessions.finish(allocation_id, status).await?;

        if let Some(session) = self.sessions.get(allocation_id).await? {
            tracing::info!(
                status = %status,
                processed = session.processed_files,
                succeeded = session.succeeded(),
                failed = session.failed(),
                "Bulk allocation finished"
            );
        }
        outcome.map(|_| status)
    }

    async fn process(
        &self,
        allocation_id: Uuid,
        file_ids: Vec<Uuid>,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<SessionStatus, AppError> {
        for file_id in file_ids {
            if self.cancel_observed(allocation_id, cancel).await? {
                return Ok(SessionStatus::Cancelled);
            }

            let result = match self.files.get(file_id).await {
                Ok(Some(file)) => {
                    if let Err(e) = self
                        .sessions
                        .set_current_file(allocation_id, Some(file.file_name.clone()))
                        .await
                    {
                        tracing::warn!(error = %e, "Failed to record current file");
                    }
                    let outcome = self.allocator.allocate(file_id, actor, FieldSource::Stored).await;
                    result_for(&file, outcome)
                }
                Ok(None) => failed_result(file_id, "file not found".to_string()),
                Err(e) => {
                    tracing::warn!(error = %e, file_id = %file_id, "Failed to load bulk item");
                    failed_result(file_id, e.to_string())
                }
            };

            tracing::debug!(file_id = %file_id, success = result.success, "Bulk item processed");
            self.sessions.record_result(allocation_id, result).await?;
        }
        Ok(SessionStatus::Completed)
    }
}

fn failed_result(file_id: Uuid, error: String) -> AllocationResult {
    AllocationResult {
        file_id,
        file_name: String::new(),
        success: false,
        company_id: None,
        document_id: None,
        error: Some(error),
    }
}

fn result_for(file: &FileRecord, outcome: Result<AllocationOutcome, AppError>) -> AllocationResult {
    let mut result = AllocationResult {
        file_id: file.id,
        file_name: file.file_name.clone(),
        success: false,
        company_id: None,
        document_id: None,
        error: None,
    };

    match outcome {
        Ok(AllocationOutcome::Allocated {
            document,
            company_id,
            ..
        }) => {
            result.success = true;
            result.company_id = Some(company_id);
            result.document_id = Some(document.id);
        }
        Ok(AllocationOutcome::Unallocated { reason }) => {
            result.error = Some(reason.to_string());
        }
        Ok(AllocationOutcome::Failed { reason, error }) => {
            result.error = Some(format!("{}: {}", reason, error));
        }
        Ok(AllocationOutcome::Skipped { status }) => {
            result.error = Some(format!("file is {}", status));
        }
        Err(e) => {
            tracing::warn!(error = %e, file_id = %file.id, "Bulk allocation item failed");
            result.error = Some(e.to_string());
        }
    }

    result
}
