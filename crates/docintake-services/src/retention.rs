//! Retention reaper.
//!
//! Permanently deletes documents past their retention expiry together with everything that
//! depends on them: the physical file, the file rows that produced them and the owning
//! company's copy of the news. File rows are matched on their exact stored path or their
//! document link, never on a bare file name, and are soft-deleted so their content hash
//! keeps catching duplicates. Only `duplicate` rows are removed outright.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docintake_core::models::{Document, DocumentKind, FileStatus};
use docintake_core::AppError;
use docintake_db::{CompanyDirectory, DocumentRepository, FileRepository};
use docintake_storage::{candidate_keys, resolve_existing, Storage, DEFAULT_STRATEGIES};

use crate::notify::{Notifier, DOCUMENT_DELETED};
use crate::outbox::Outbox;
use crate::settings::SettingsCache;

/// Counts for one retention run or purge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionSummary {
    /// Documents selected for deletion.
    pub expired: usize,
    pub deleted: usize,
    pub failed: usize,
    pub files_soft_deleted: usize,
    pub files_hard_deleted: usize,
    pub physical_deleted: usize,
    pub notifications: usize,
    pub orphans_soft_deleted: usize,
}

#[derive(Clone)]
pub struct RetentionReaper {
    documents: Arc<dyn DocumentRepository>,
    files: Arc<dyn FileRepository>,
    directory: Arc<dyn CompanyDirectory>,
    storage: Arc<dyn Storage>,
    settings: Arc<SettingsCache>,
    notifier: Arc<dyn Notifier>,
}

impl RetentionReaper {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        files: Arc<dyn FileRepository>,
        directory: Arc<dyn CompanyDirectory>,
        storage: Arc<dyn Storage>,
        settings: Arc<SettingsCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            documents,
            files,
            directory,
            storage,
            settings,
            notifier,
        }
    }

    /// Run every `period` until `shutdown` fires. The first run starts immediately.
    pub fn start(
        self: Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut retention_interval = interval(period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Retention reaper stopped");
                        break;
                    }
                    _ = retention_interval.tick() => {}
                }

                tracing::info!("Starting scheduled retention run");
                if let Err(e) = self.run_once(Utc::now()).await {
                    tracing::error!(error = %e, "Retention run failed");
                }
            }
        })
    }

    /// One retention pass over every document type whose policy is enabled, followed by the
    /// orphan sweep. A run where every policy is disabled deletes nothing.
    #[tracing::instrument(skip(self), fields(retention.operation = "expire_all"))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RetentionSummary, AppError> {
        let snapshot = self.settings.snapshot().await?;
        let mut summary = RetentionSummary::default();

        let enabled: Vec<DocumentKind> = DocumentKind::ALL
            .into_iter()
            .filter(|kind| snapshot.retention_for(*kind).is_enabled())
            .collect();
        if enabled.is_empty() {
            tracing::info!("Retention disabled for every document type, skipping run");
            return Ok(summary);
        }

        for kind in enabled {
            let expired = match self.documents.find_expired(kind, now).await {
                Ok(expired) => expired,
                Err(e) => {
                    tracing::error!(error = %e, kind = %kind, "Failed to select expired documents");
                    continue;
                }
            };
            summary.expired += expired.len();

            for document in &expired {
                if let Err(e) = self.delete_document(document, &mut summary).await {
                    summary.failed += 1;
                    tracing::error!(
                        error = %e,
                        document_id = %document.id,
                        kind = %kind,
                        "Failed to delete expired document"
                    );
                }
            }
        }

        match self.sweep_orphans().await {
            Ok(swept) => summary.orphans_soft_deleted = swept,
            Err(e) => tracing::error!(error = %e, "Orphan sweep failed"),
        }

        tracing::info!(
            expired = summary.expired,
            deleted = summary.deleted,
            failed = summary.failed,
            files_soft_deleted = summary.files_soft_deleted,
            files_hard_deleted = summary.files_hard_deleted,
            physical_deleted = summary.physical_deleted,
            notifications = summary.notifications,
            orphans = summary.orphans_soft_deleted,
            "Retention run completed"
        );
        Ok(summary)
    }

    /// Administrative purge: the retention cascade for explicitly chosen documents,
    /// regardless of policy. Unknown ids count as failures.
    #[tracing::instrument(skip(self, document_ids), fields(retention.operation = "purge", count = document_ids.len()))]
    pub async fn purge(&self, document_ids: &[Uuid]) -> RetentionSummary {
        let mut summary = RetentionSummary::default();

        for id in document_ids {
            let document = match self.documents.get(*id).await {
                Ok(Some(document)) => document,
                Ok(None) => {
                    summary.failed += 1;
                    tracing::warn!(document_id = %id, "Purge target not found");
                    continue;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(error = %e, document_id = %id, "Failed to load purge target");
                    continue;
                }
            };
            summary.expired += 1;

            if let Err(e) = self.delete_document(&document, &mut summary).await {
                summary.failed += 1;
                tracing::error!(error = %e, document_id = %id, "Failed to purge document");
            }
        }

        tracing::info!(
            requested = document_ids.len(),
            deleted = summary.deleted,
            failed = summary.failed,
            "Purge completed"
        );
        summary
    }

    /// Cascade for a single document. An error leaves the document row in place so the next
    /// run tries again.
    async fn delete_document(
        &self,
        document: &Document,
        summary: &mut RetentionSummary,
    ) -> Result<(), AppError> {
        let company = self.directory.get(document.company_id).await?;

        let candidates = candidate_keys(&document.file_url, DEFAULT_STRATEGIES);
        match resolve_existing(self.storage.as_ref(), &document.file_url, DEFAULT_STRATEGIES).await? {
            Some(key) => {
                self.storage.delete(&key).await?;
                summary.physical_deleted += 1;
            }
            None => {
                tracing::debug!(document_id = %document.id, file_url = %document.file_url, "Physical file already gone");
            }
        }

        // rows holding the document's file keep their hash
        for file in self.files.find_by_storage_paths(&candidates).await? {
            if file.document_id.is_some_and(|id| id != document.id) {
                tracing::warn!(file_id = %file.id, linked_to = ?file.document_id, "Stored path shared with another document, leaving file");
                continue;
            }
            if self.files.soft_delete(file.id).await? {
                summary.files_soft_deleted += 1;
            }
        }

        for file in self.files.find_by_document(document.id).await? {
            if file.status == FileStatus::Duplicate {
                if self.files.hard_delete(file.id).await? {
                    summary.files_hard_deleted += 1;
                }
                continue;
            }

            // linked row whose path no longer matches the document's
            if file.storage_path != document.file_url && self.storage.exists(&file.storage_path).await? {
                self.storage.delete(&file.storage_path).await?;
                summary.physical_deleted += 1;
            }
            if self.files.soft_delete(file.id).await? {
                summary.files_soft_deleted += 1;
            } else if self.files.hard_delete(file.id).await? {
                summary.files_hard_deleted += 1;
            }
        }

        let mut outbox = Outbox::new();
        if let Some(company) = company.as_ref().filter(|c| c.wants_notifications()) {
            outbox.notify(
                DOCUMENT_DELETED,
                company.contact_emails.clone(),
                json!({
                    "document_kind": document.kind.as_str(),
                    "document_number": document.document_number,
                    "company_name": company.name,
                    "deleted_at": Utc::now().to_rfc3339(),
                }),
            );
        }
        outbox.activity(
            "document_deleted",
            document.id,
            json!({
                "kind": document.kind.as_str(),
                "document_number": document.document_number,
                "company_id": document.company_id,
                "expired_at": document.retention_expiry_date,
            }),
        );

        if !self.documents.hard_delete(document.id).await? {
            tracing::warn!(document_id = %document.id, "Document already removed");
        }
        summary.deleted += 1;
        summary.notifications += outbox.notification_count();
        outbox.dispatch(self.notifier.clone());

        tracing::info!(
            document_id = %document.id,
            kind = %document.kind,
            document_number = %document.document_number,
            company_id = %document.company_id,
            "Deleted expired document"
        );
        Ok(())
    }

    /// Soft-delete live parsed files whose document no longer exists. Returns the count.
    #[tracing::instrument(skip(self), fields(retention.operation = "orphan_sweep"))]
    pub async fn sweep_orphans(&self) -> Result<usize, AppError> {
        let parsed = self.files.list_live_parsed().await?;
        let linked: Vec<Uuid> = parsed.iter().filter_map(|file| file.document_id).collect();
        let existing: HashSet<Uuid> = self.documents.existing_ids(&linked).await?;

        let mut swept = 0;
        for file in parsed {
            let orphaned = file
                .document_id
                .map(|id| !existing.contains(&id))
                .unwrap_or(true);
            if !orphaned {
                continue;
            }
            match self.files.soft_delete(file.id).await {
                Ok(true) => {
                    swept += 1;
                    tracing::debug!(file_id = %file.id, "Soft-deleted orphaned file");
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, file_id = %file.id, "Failed to soft-delete orphaned file"),
            }
        }

        if swept > 0 {
            tracing::info!(swept, "Orphan sweep completed");
        }
        Ok(swept)
    }
}
