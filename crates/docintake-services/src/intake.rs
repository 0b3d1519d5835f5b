//! Intake gate: first touchpoint for an upload.
//!
//! Hashes the bytes, stores them in the intake area and either records a duplicate
//! (relocated to the duplicates area, never processed) or a pending file with a
//! normal-priority processing job. Every unique upload leaves a file row behind.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use docintake_core::models::{
    FailureReason, FileFailure, FileFilter, FileRecord, FileStatus, NewFile, ProcessingJob,
};
use docintake_core::AppError;
use docintake_db::FileRepository;
use docintake_storage::{keys, Storage};
use docintake_worker::{ProcessingQueue, SubmitOutcome};

use crate::hasher::ContentHasher;

#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    /// Stored as pending and queued.
    Accepted {
        file: FileRecord,
        submission: SubmitOutcome,
    },
    /// Same content seen before; kept for audit only.
    Duplicate { file: FileRecord, original_id: Uuid },
}

impl IntakeOutcome {
    pub fn file(&self) -> &FileRecord {
        match self {
            IntakeOutcome::Accepted { file, .. } | IntakeOutcome::Duplicate { file, .. } => file,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IntakeOutcome::Duplicate { .. })
    }
}

#[derive(Clone)]
pub struct IntakeGate {
    hasher: Arc<dyn ContentHasher>,
    files: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    queue: ProcessingQueue,
}

impl IntakeGate {
    pub fn new(
        hasher: Arc<dyn ContentHasher>,
        files: Arc<dyn FileRepository>,
        storage: Arc<dyn Storage>,
        queue: ProcessingQueue,
    ) -> Self {
        Self {
            hasher,
            files,
            storage,
            queue,
        }
    }

    #[tracing::instrument(skip(self, content), fields(size = content.len()))]
    pub async fn ingest(
        &self,
        content: &[u8],
        file_name: &str,
        uploaded_by: Option<&str>,
    ) -> Result<IntakeOutcome, AppError> {
        // nothing is written before the hash exists
        let content_hash = self.hasher.digest(content)?;

        let upload_id = Uuid::new_v4();
        let intake_path = keys::intake_key(upload_id, file_name);

        if let Some(original) = self.files.find_by_hash(&content_hash).await? {
            self.storage.write(&intake_path, content).await?;
            return self
                .record_duplicate(upload_id, file_name, uploaded_by, content_hash, &intake_path, original.id)
                .await;
        }

        self.storage.write(&intake_path, content).await?;

        let inserted = self
            .files
            .insert(NewFile {
                file_name: file_name.to_string(),
                storage_path: intake_path.clone(),
                content_hash: content_hash.clone(),
                status: FileStatus::Pending,
                duplicate_of: None,
                uploaded_by: uploaded_by.map(str::to_string),
            })
            .await;

        let file = match inserted {
            Ok(file) => file,
            Err(e) if e.is_conflict() => {
                // a concurrent upload of the same bytes won the insert
                let original = self.files.find_by_hash(&content_hash).await?.ok_or_else(|| {
                    AppError::Internal(format!("hash conflict without a holder: {}", content_hash))
                })?;
                return self
                    .record_duplicate(upload_id, file_name, uploaded_by, content_hash, &intake_path, original.id)
                    .await;
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&intake_path).await {
                    tracing::warn!(error = %cleanup, path = %intake_path, "Failed to remove orphaned upload");
                }
                return Err(e);
            }
        };

        let submission = self.enqueue(&file).await?;
        tracing::info!(file_id = %file.id, file_name = %file.file_name, "Upload accepted");

        Ok(IntakeOutcome::Accepted { file, submission })
    }

    async fn record_duplicate(
        &self,
        upload_id: Uuid,
        file_name: &str,
        uploaded_by: Option<&str>,
        content_hash: String,
        intake_path: &str,
        original_id: Uuid,
    ) -> Result<IntakeOutcome, AppError> {
        let duplicate_path = keys::duplicate_key(upload_id, file_name, Utc::now());
        let storage_path = match self.storage.move_file(intake_path, &duplicate_path).await {
            Ok(()) => duplicate_path,
            Err(e) => {
                tracing::warn!(error = %e, path = %intake_path, "Failed to relocate duplicate upload");
                intake_path.to_string()
            }
        };

        let file = self
            .files
            .insert(NewFile {
                file_name: file_name.to_string(),
                storage_path,
                content_hash,
                status: FileStatus::Duplicate,
                duplicate_of: Some(original_id),
                uploaded_by: uploaded_by.map(str::to_string),
            })
            .await?;

        tracing::info!(
            file_id = %file.id,
            original_id = %original_id,
            file_name = %file.file_name,
            "Duplicate upload"
        );

        Ok(IntakeOutcome::Duplicate { file, original_id })
    }

    /// Submit the normal-priority job for a pending file. When the queue refuses the job the
    /// file is marked failed so it shows up for remediation, and the error is returned.
    async fn enqueue(&self, file: &FileRecord) -> Result<SubmitOutcome, AppError> {
        let job = ProcessingJob::intake(file.id, &file.storage_path, &file.file_name);
        match self.queue.submit(job).await {
            Ok(submission) => Ok(submission),
            Err(e) => {
                tracing::error!(error = %e, file_id = %file.id, "Failed to enqueue upload");
                let failure = FileFailure::failed(FailureReason::EnqueueFailed, e.to_string());
                if let Err(mark) = self.files.mark_failure(file.id, &failure).await {
                    tracing::error!(error = %mark, file_id = %file.id, "Failed to mark file failed");
                }
                Err(e)
            }
        }
    }

    /// Re-submit every live file still pending, e.g. after a crash. Returns how many
    /// jobs were submitted.
    #[tracing::instrument(skip(self))]
    pub async fn recover_pending(&self) -> Result<usize, AppError> {
        let pending = self.files.list(&FileFilter::pending().all()).await?;
        let mut submitted = 0;
        for file in &pending {
            // edited files resume as staff reprocessing
            let job = match file.edit_log.last() {
                Some(edit) => ProcessingJob::reprocess(file.id, &file.storage_path, &file.file_name, &edit.editor),
                None => ProcessingJob::intake(file.id, &file.storage_path, &file.file_name),
            };
            match self.queue.submit(job).await? {
                SubmitOutcome::Enqueued | SubmitOutcome::Upgraded | SubmitOutcome::Deferred => {
                    submitted += 1
                }
                SubmitOutcome::AlreadyQueued | SubmitOutcome::InFlight => {}
            }
        }
        tracing::info!(pending = pending.len(), submitted, "Recovered pending files");
        Ok(submitted)
    }
}
