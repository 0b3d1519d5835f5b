//! Document allocator
//!
//! Turns one file into either a canonical document or a documented failure. Routing
//! outcomes (missing account number, no matching company, number conflict, parser
//! failure) are values of [`AllocationOutcome`] and are written onto the file row. Only
//! infrastructure failures are returned as errors.
//!
//! Every write re-checks its precondition: the document insert relies on the
//! `(company, number)` uniqueness guard and the final transition to `parsed` only applies
//! while the file is still live and allocatable.

pub mod fields;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use docintake_core::models::{
    AllocationMetadata, Company, Document, DocumentKind, DocumentStatus, FailureReason,
    FileFailure, FileRecord, FileStatus, NewDocument, ParsedFields, ProcessingJob,
};
use docintake_core::{AppError, JobError};
use docintake_db::{DocumentRepository, FileRepository};
use docintake_storage::{keys, Storage};
use docintake_worker::JobHandler;

use crate::matching::{MatchOutcome, MatchStrategy, MatchingEngine};
use crate::notify::{Notifier, DOCUMENT_AVAILABLE};
use crate::outbox::Outbox;
use crate::parser::Parser;
use crate::settings::SettingsCache;

/// Actor recorded for allocations nobody requested explicitly.
pub const SYSTEM_ACTOR: &str = "system";

/// Where the allocator takes extracted fields from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Run the parser over the stored artifact.
    Parse,
    /// Use `parsed_data` from the row (staff edits), parsing only when there is none.
    Stored,
}

#[derive(Debug, Clone)]
pub enum AllocationOutcome {
    Allocated {
        document: Document,
        company_id: Uuid,
        strategy: Option<MatchStrategy>,
    },
    Unallocated {
        reason: FailureReason,
    },
    Failed {
        reason: FailureReason,
        error: String,
    },
    /// The file was no longer eligible (already parsed, duplicate or deleted).
    Skipped {
        status: FileStatus,
    },
}

impl AllocationOutcome {
    pub fn is_allocated(&self) -> bool {
        matches!(self, AllocationOutcome::Allocated { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            AllocationOutcome::Unallocated { reason } | AllocationOutcome::Failed { reason, .. } => {
                Some(*reason)
            }
            _ => None,
        }
    }
}

/// Company chosen for a file and how it was found.
struct Resolution {
    company: Company,
    strategy: Option<MatchStrategy>,
}

pub struct DocumentAllocator {
    files: Arc<dyn FileRepository>,
    documents: Arc<dyn DocumentRepository>,
    matcher: MatchingEngine,
    parser: Arc<dyn Parser>,
    storage: Arc<dyn Storage>,
    settings: Arc<SettingsCache>,
    notifier: Arc<dyn Notifier>,
}

impl DocumentAllocator {
    pub fn new(
        files: Arc<dyn FileRepository>,
        documents: Arc<dyn DocumentRepository>,
        matcher: MatchingEngine,
        parser: Arc<dyn Parser>,
        storage: Arc<dyn Storage>,
        settings: Arc<SettingsCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            files,
            documents,
            matcher,
            parser,
            storage,
            settings,
            notifier,
        }
    }

    /// Allocate one file. Safe to re-run: a document already created for this file is
    /// picked up instead of reported as a conflict.
    #[tracing::instrument(skip(self))]
    pub async fn allocate(
        &self,
        file_id: Uuid,
        actor: &str,
        source: FieldSource,
    ) -> Result<AllocationOutcome, AppError> {
        let file = self
            .files
            .get(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {}", file_id)))?;

        if !file.is_eligible_for_allocation() {
            tracing::info!(status = %file.status, deleted = file.is_deleted(), "File no longer eligible, skipping");
            return Ok(AllocationOutcome::Skipped {
                status: file.status,
            });
        }

        let parsed = match self.extract(&file, source).await? {
            Ok(parsed) => parsed,
            Err(error) => {
                return self
                    .fail(&file, FileFailure::failed(FailureReason::ParseFailed, error))
                    .await;
            }
        };

        let resolution = match self.resolve_company(&parsed).await? {
            Ok(resolution) => resolution,
            Err(failure) => return self.fail(&file, failure).await,
        };

        let now = Utc::now();
        let kind = DocumentKind::classify(parsed.document_type.as_deref());
        let document_number = parsed
            .document_number()
            .map(str::to_string)
            .unwrap_or_else(|| fields::synthesize_document_number(file.uploaded_at, &file.content_hash));

        let document = match self
            .documents
            .find_live_by_number(resolution.company.id, &document_number)
            .await?
        {
            Some(existing) if existing.source_file_id == Some(file.id) => {
                tracing::info!(document_id = %existing.id, "Resuming allocation of an existing document");
                existing
            }
            Some(existing) => {
                return self
                    .conflict(&file, &resolution.company, &document_number, Some(existing.id))
                    .await;
            }
            None => {
                let new_document = self
                    .build_document(&file, &parsed, &resolution.company, kind, &document_number, now)
                    .await?;
                match self.documents.insert(new_document).await {
                    Ok(document) => document,
                    Err(e) if e.is_conflict() => {
                        // lost a race against another worker
                        return self
                            .conflict(&file, &resolution.company, &document_number, None)
                            .await;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let document = self.relocate(&file, document, now).await;

        let allocation = AllocationMetadata {
            allocated_by: actor.to_string(),
            allocated_at: now,
            document_id: document.id,
            document_kind: document.kind,
            match_strategy: resolution.strategy.map(|s| s.as_str().to_string()),
        };
        if !self
            .files
            .mark_parsed(file.id, resolution.company.id, &allocation)
            .await?
        {
            tracing::warn!(
                document_id = %document.id,
                "File changed state during allocation; document kept, file not marked parsed"
            );
        }

        let mut outbox = Outbox::new();
        outbox.activity(
            "document_allocated",
            document.id,
            json!({
                "file_id": file.id,
                "company_id": resolution.company.id,
                "actor": actor,
                "strategy": allocation.match_strategy,
            }),
        );
        if resolution.company.wants_notifications() {
            outbox.notify(
                DOCUMENT_AVAILABLE,
                resolution.company.contact_emails.clone(),
                json!({
                    "company_name": resolution.company.name,
                    "document_kind": document.kind.as_str(),
                    "document_number": document.document_number,
                    "issue_date": document.issue_date.to_string(),
                }),
            );
        }
        outbox.dispatch(self.notifier.clone());

        tracing::info!(
            document_id = %document.id,
            company_id = %resolution.company.id,
            kind = %document.kind,
            document_number = %document.document_number,
            "File allocated"
        );

        Ok(AllocationOutcome::Allocated {
            company_id: resolution.company.id,
            strategy: resolution.strategy,
            document,
        })
    }

    /// Extracted fields, or the parser's error text.
    async fn extract(
        &self,
        file: &FileRecord,
        source: FieldSource,
    ) -> Result<Result<ParsedFields, String>, AppError> {
        if source == FieldSource::Stored {
            if let Some(parsed) = file.parsed_fields() {
                return Ok(Ok(parsed));
            }
        }

        let content = self.storage.read(&file.storage_path).await?;
        match self.parser.parse(&file.file_name, &content).await {
            Ok(parsed) => {
                self.files
                    .set_parsed_data(file.id, &parsed.to_value())
                    .await?;
                Ok(Ok(parsed))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Parser failed");
                Ok(Err(e.to_string()))
            }
        }
    }

    /// Company for the file: a staff override, else the matching engine.
    async fn resolve_company(
        &self,
        parsed: &ParsedFields,
    ) -> Result<Result<Resolution, FileFailure>, AppError> {
        if let Some(company_id) = parsed.company_id {
            return Ok(match self.matcher.directory().get(company_id).await? {
                Some(company) if company.is_active => Ok(Resolution {
                    company,
                    strategy: None,
                }),
                _ => Err(FileFailure::unallocated(
                    FailureReason::NoMatchingCompany,
                    Some(json!({ "company_id": company_id, "error": "company not found or inactive" })),
                )),
            });
        }

        let Some(account_number) = parsed.account_number() else {
            return Ok(Err(FileFailure::unallocated(
                FailureReason::MissingAccountNumber,
                None,
            )));
        };

        let outcome = self.matcher.match_account(account_number).await?;
        let diagnostics = outcome.diagnostics(account_number);
        Ok(match outcome {
            MatchOutcome::Matched {
                company, strategy, ..
            } => Ok(Resolution {
                company,
                strategy: Some(strategy),
            }),
            MatchOutcome::NoMatch { .. } => Err(FileFailure::unallocated(
                FailureReason::NoMatchingCompany,
                Some(diagnostics),
            )),
        })
    }

    async fn build_document(
        &self,
        file: &FileRecord,
        parsed: &ParsedFields,
        company: &Company,
        kind: DocumentKind,
        document_number: &str,
        now: DateTime<Utc>,
    ) -> Result<NewDocument, AppError> {
        let issue_date = fields::issue_date_or_today(parsed.date.as_deref(), now);
        let due_date = parsed.due_date.as_deref().and_then(fields::parse_date);
        let amount = fields::parse_amount(parsed.amount.as_ref());
        let vat_amount = fields::parse_amount(parsed.vat_amount.as_ref());
        let total_amount = match parsed.total_amount.as_ref() {
            Some(total) => fields::parse_amount(Some(total)),
            None => amount + vat_amount,
        };

        let retention = self
            .settings
            .snapshot()
            .await?
            .retention_for(kind)
            .compute(now, issue_date);

        Ok(NewDocument {
            kind,
            document_number: document_number.to_string(),
            company_id: company.id,
            issue_date,
            due_date,
            amount,
            vat_amount,
            total_amount,
            // the intake path exists until the move below succeeds
            file_url: file.storage_path.clone(),
            status: DocumentStatus::Ready,
            source_file_id: Some(file.id),
            retention_start_date: retention.start,
            retention_expiry_date: retention.expiry,
            created_at: now,
        })
    }

    /// Best-effort move into the processed area. A failed move is logged and leaves the
    /// document pointing at the intake path, which still exists. The file row is updated
    /// before the document so the row always names the physical file.
    async fn relocate(&self, file: &FileRecord, mut document: Document, now: DateTime<Utc>) -> Document {
        if document.file_url.starts_with(keys::PROCESSED_AREA) {
            return document;
        }
        let source = document.file_url.clone();
        let target = keys::processed_key(
            document.kind,
            document.id,
            &document.document_number,
            &file.file_name,
            now,
        );

        if let Err(e) = self.storage.move_file(&source, &target).await {
            tracing::warn!(
                error = %e,
                from = %source,
                to = %target,
                "Failed to move file to processed area, keeping intake path"
            );
            return document;
        }

        if let Err(e) = self.files.set_storage_path(file.id, &target).await {
            tracing::error!(error = %e, to = %target, "Failed to record moved file path on file row, moving back");
            if let Err(e) = self.storage.move_file(&target, &source).await {
                tracing::error!(error = %e, from = %target, to = %source, "Failed to move file back to intake path");
            }
            return document;
        }

        if let Err(e) = self.documents.set_file_url(document.id, &target).await {
            // the file row still links the document, so retention finds the moved file through it
            tracing::error!(error = %e, document_id = %document.id, to = %target, "Failed to record moved file path on document");
            return document;
        }

        document.file_url = target;
        document
    }

    async fn conflict(
        &self,
        file: &FileRecord,
        company: &Company,
        document_number: &str,
        existing_id: Option<Uuid>,
    ) -> Result<AllocationOutcome, AppError> {
        let message = format!(
            "document {} already exists for company {}",
            document_number, company.id
        );
        tracing::warn!(existing_id = ?existing_id, "{}", message);
        let mut failure = FileFailure::failed(FailureReason::DocumentNumberConflict, message);
        failure.details = Some(json!({
            "company_id": company.id,
            "document_number": document_number,
            "existing_document_id": existing_id,
        }));
        self.fail(file, failure).await
    }

    async fn fail(
        &self,
        file: &FileRecord,
        failure: FileFailure,
    ) -> Result<AllocationOutcome, AppError> {
        let applied = self.files.mark_failure(file.id, &failure).await?;
        if !applied {
            let status = self
                .files
                .get(file.id)
                .await?
                .map(|f| f.status)
                .unwrap_or(file.status);
            return Ok(AllocationOutcome::Skipped { status });
        }

        tracing::info!(
            status = %failure.status,
            reason = %failure.reason,
            "File routed to remediation"
        );
        Ok(match failure.status {
            FileStatus::Unallocated => AllocationOutcome::Unallocated {
                reason: failure.reason,
            },
            _ => AllocationOutcome::Failed {
                reason: failure.reason,
                error: failure.last_error.unwrap_or_default(),
            },
        })
    }
}

#[async_trait]
impl JobHandler for DocumentAllocator {
    async fn handle(self: Arc<Self>, job: &ProcessingJob) -> Result<(), JobError> {
        let actor = job.requested_by.as_deref().unwrap_or(SYSTEM_ACTOR);
        let source = if job.manually_edited {
            FieldSource::Stored
        } else {
            FieldSource::Parse
        };

        match self.allocate(job.file_id, actor, source).await {
            Ok(outcome) => {
                tracing::debug!(outcome = ?outcome.failure_reason(), allocated = outcome.is_allocated(), "Job finished");
                Ok(())
            }
            Err(e @ AppError::NotFound(_)) => Err(JobError::unrecoverable(e)),
            Err(e) => Err(e.into()),
        }
    }

    async fn on_exhausted(self: Arc<Self>, job: &ProcessingJob, last_error: &str) {
        let failure = FileFailure::failed(FailureReason::ProcessingError, last_error);
        match self.files.mark_failure(job.file_id, &failure).await {
            Ok(true) => tracing::info!(file_id = %job.file_id, "File marked failed after exhausting retries"),
            Ok(false) => tracing::debug!(file_id = %job.file_id, "File no longer allocatable, leaving as is"),
            Err(e) => tracing::error!(error = %e, file_id = %job.file_id, "Failed to mark file failed"),
        }
    }
}
