//! Staff remediation of unallocated and failed files.
//!
//! Single-file edits are recorded in the file's edit log and resubmitted to the queue at
//! high priority. Bulk allocation runs as a background session that clients poll by id.

mod runner;

pub use runner::BulkAllocationRunner;

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docintake_core::models::{
    AllocationSession, EditLogEntry, FailureReason, FileFailure, FileFilter, FileRecord,
    ParsedFields, ProcessingJob,
};
use docintake_core::AppError;
use docintake_db::{AllocationSessionStore, FileRepository};
use docintake_worker::{ProcessingQueue, SubmitOutcome};

/// Staff changes to a file's extracted data. Explicit fields override `parsed_data`.
#[derive(Debug, Clone, Default)]
pub struct FileEdit {
    /// Full replacement of the extracted fields.
    pub parsed_data: Option<Value>,
    pub account_number: Option<String>,
    /// Allocate to this company without matching.
    pub company_id: Option<Uuid>,
}

impl FileEdit {
    fn apply(&self, current: Option<ParsedFields>) -> ParsedFields {
        let mut fields = match &self.parsed_data {
            Some(value) => ParsedFields::from_value_lossy(value.clone()),
            None => current.unwrap_or_default(),
        };
        if let Some(account_number) = &self.account_number {
            fields.account_number = Some(account_number.trim().to_string());
        }
        if let Some(company_id) = self.company_id {
            fields.company_id = Some(company_id);
        }
        fields
    }
}

/// Which files a bulk session covers.
#[derive(Debug, Clone)]
pub enum BulkSelection {
    Files(Vec<Uuid>),
    /// Every live unallocated or failed file at start time.
    AllRemediable,
}

pub struct BulkStarted {
    pub session: AllocationSession,
    pub handle: JoinHandle<()>,
}

/// Top-level `{key: {"from": old, "to": new}}` for every changed key.
pub fn diff_fields(before: &Value, after: &Value) -> Value {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let keys: std::collections::BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let changes: Map<String, Value> = keys
        .into_iter()
        .filter_map(|key| {
            let old = before.get(key).cloned().unwrap_or(Value::Null);
            let new = after.get(key).cloned().unwrap_or(Value::Null);
            (old != new).then(|| (key.clone(), json!({ "from": old, "to": new })))
        })
        .collect();
    Value::Object(changes)
}

pub struct RemediationService {
    files: Arc<dyn FileRepository>,
    sessions: Arc<dyn AllocationSessionStore>,
    queue: ProcessingQueue,
    runner: BulkAllocationRunner,
    tokens: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    session_ttl: Duration,
}

impl RemediationService {
    pub fn new(
        files: Arc<dyn FileRepository>,
        sessions: Arc<dyn AllocationSessionStore>,
        queue: ProcessingQueue,
        runner: BulkAllocationRunner,
        session_ttl: Duration,
    ) -> Self {
        Self {
            files,
            sessions,
            queue,
            runner,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            session_ttl,
        }
    }

    async fn remediable(&self, file_id: Uuid) -> Result<FileRecord, AppError> {
        let file = self
            .files
            .get(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {}", file_id)))?;
        if file.is_deleted() || !file.status.is_remediable() {
            return Err(AppError::Conflict(format!(
                "file {} is {} and not awaiting remediation",
                file_id, file.status
            )));
        }
        Ok(file)
    }

    pub async fn list(&self, filter: &FileFilter) -> Result<Vec<FileRecord>, AppError> {
        self.files.list(filter).await
    }

    /// Record the edit, reset the file to pending and queue a high-priority reprocess.
    #[tracing::instrument(skip(self, edit))]
    pub async fn submit_edit(
        &self,
        file_id: Uuid,
        edit: FileEdit,
        editor: &str,
    ) -> Result<(FileRecord, SubmitOutcome), AppError> {
        let file = self.remediable(file_id).await?;

        let before = file.parsed_data.clone().unwrap_or_else(|| json!({}));
        let after = edit.apply(file.parsed_fields()).to_value();
        let entry = EditLogEntry {
            editor: editor.to_string(),
            edited_at: Utc::now(),
            diff: diff_fields(&before, &after),
        };

        let file = self
            .files
            .apply_edit(file_id, &after, &entry)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!("file {} changed state during the edit", file_id))
            })?;

        let job = ProcessingJob::reprocess(file.id, &file.storage_path, &file.file_name, editor);
        let submission = match self.queue.submit(job).await {
            Ok(submission) => submission,
            Err(e) => {
                let failure = FileFailure::failed(FailureReason::EnqueueFailed, e.to_string());
                if let Err(mark) = self.files.mark_failure(file.id, &failure).await {
                    tracing::error!(error = %mark, file_id = %file.id, "Failed to mark file failed");
                }
                return Err(e);
            }
        };

        tracing::info!(
            file_id = %file.id,
            editor,
            changed = entry.diff.as_object().map(|d| d.len()).unwrap_or(0),
            submission = ?submission,
            "Remediation edit submitted"
        );
        Ok((file, submission))
    }

    /// Soft-delete a remediable file. Its hash stays so the content is still caught as a
    /// duplicate later.
    #[tracing::instrument(skip(self))]
    pub async fn discard(&self, file_id: Uuid, editor: &str) -> Result<bool, AppError> {
        self.remediable(file_id).await?;
        let deleted = self.files.soft_delete(file_id).await?;
        tracing::info!(file_id = %file_id, editor, deleted, "Remediation file discarded");
        Ok(deleted)
    }

    /// Create a session and start its runner in the background.
    #[tracing::instrument(skip(self, selection))]
    pub async fn start_bulk(
        &self,
        selection: BulkSelection,
        started_by: &str,
    ) -> Result<BulkStarted, AppError> {
        self.evict_expired_sessions().await;

        let file_ids: Vec<Uuid> = match selection {
            BulkSelection::Files(ids) => {
                let mut seen = HashSet::new();
                ids.into_iter().filter(|id| seen.insert(*id)).collect()
            }
            BulkSelection::AllRemediable => self
                .files
                .list(&FileFilter::remediable().all())
                .await?
                .into_iter()
                .map(|file| file.id)
                .collect(),
        };

        let session = AllocationSession::new(file_ids.len(), started_by);
        let allocation_id = session.allocation_id;
        self.sessions.create(session.clone()).await?;

        let cancel = CancellationToken::new();
        self.tokens.lock().await.insert(allocation_id, cancel.clone());

        tracing::info!(allocation_id = %allocation_id, total = file_ids.len(), "Bulk allocation started");

        let runner = self.runner.clone();
        let tokens = self.tokens.clone();
        let actor = started_by.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = runner.run(allocation_id, file_ids, actor, cancel).await {
                tracing::error!(error = %e, allocation_id = %allocation_id, "Bulk allocation aborted");
            }
            tokens.lock().await.remove(&allocation_id);
        });

        Ok(BulkStarted { session, handle })
    }

    pub async fn session(&self, allocation_id: Uuid) -> Result<Option<AllocationSession>, AppError> {
        self.sessions.get(allocation_id).await
    }

    /// Request cancellation; it takes effect before the next item. Returns false for unknown
    /// or already finished sessions.
    pub async fn cancel(&self, allocation_id: Uuid) -> Result<bool, AppError> {
        if let Some(token) = self.tokens.lock().await.get(&allocation_id) {
            token.cancel();
        }
        let requested = self.sessions.request_cancel(allocation_id).await?;
        tracing::info!(allocation_id = %allocation_id, requested, "Bulk allocation cancel requested");
        Ok(requested)
    }

    pub async fn evict_expired_sessions(&self) -> usize {
        match self.sessions.evict_finished(self.session_ttl).await {
            Ok(evicted) => {
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted finished allocation sessions");
                }
                evicted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to evict allocation sessions");
                0
            }
        }
    }
}
