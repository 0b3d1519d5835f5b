//! Repository traits
//!
//! Every write that depends on a precondition re-checks it in the same statement
//! (conditional update) and reports whether the transition happened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docintake_core::models::{
    AllocationMetadata, AllocationResult, AllocationSession, Company, Document, DocumentKind,
    DocumentQuery, EditLogEntry, FileFailure, FileFilter, FileRecord, NewDocument, NewFile,
    RetentionPolicy, SessionStatus, SettingsSnapshot,
};
use docintake_core::AppError;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Insert a file row. A second non-duplicate row with the same hash is a `Conflict`.
    async fn insert(&self, new_file: NewFile) -> Result<FileRecord, AppError>;

    /// Fetch by id, including soft-deleted rows.
    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    /// Earliest non-duplicate row carrying `content_hash`, soft-deleted rows included.
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>, AppError>;

    async fn list(&self, filter: &FileFilter) -> Result<Vec<FileRecord>, AppError>;

    async fn set_storage_path(&self, id: Uuid, storage_path: &str) -> Result<(), AppError>;

    /// Store parser output so staff can see and edit it later.
    async fn set_parsed_data(&self, id: Uuid, parsed_data: &Value) -> Result<(), AppError>;

    /// Route a live, allocatable file to `failure.status`. Returns false when the file
    /// was already parsed, marked duplicate or deleted.
    async fn mark_failure(&self, id: Uuid, failure: &FileFailure) -> Result<bool, AppError>;

    /// Mark a live, allocatable file parsed and attach it to its document.
    async fn mark_parsed(
        &self,
        id: Uuid,
        company_id: Uuid,
        allocation: &AllocationMetadata,
    ) -> Result<bool, AppError>;

    /// Replace `parsed_data`, append to the edit log and reset to pending. Only applies to
    /// live remediable files; returns the updated row, or `None` when the precondition failed.
    async fn apply_edit(
        &self,
        id: Uuid,
        parsed_data: &Value,
        entry: &EditLogEntry,
    ) -> Result<Option<FileRecord>, AppError>;

    /// Soft delete, keeping the content hash. Also detaches the document link.
    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError>;

    async fn hard_delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Rows linked to `document_id` by foreign key.
    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<FileRecord>, AppError>;

    /// Rows whose storage path is exactly one of `storage_paths`.
    async fn find_by_storage_paths(
        &self,
        storage_paths: &[String],
    ) -> Result<Vec<FileRecord>, AppError>;

    /// Live parsed rows, for the orphan sweep.
    async fn list_live_parsed(&self) -> Result<Vec<FileRecord>, AppError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a document. A live document with the same company and number is a `Conflict`.
    async fn insert(&self, new_document: NewDocument) -> Result<Document, AppError>;

    /// Fetch by id, including soft-deleted rows.
    async fn get(&self, id: Uuid) -> Result<Option<Document>, AppError>;

    async fn find_live_by_number(
        &self,
        company_id: Uuid,
        document_number: &str,
    ) -> Result<Option<Document>, AppError>;

    async fn set_file_url(&self, id: Uuid, file_url: &str) -> Result<(), AppError>;

    async fn list(&self, query: &DocumentQuery) -> Result<Vec<Document>, AppError>;

    /// Documents of `kind` whose expiry is at or before `now`, soft-deleted ones included.
    async fn find_expired(
        &self,
        kind: DocumentKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Document>, AppError>;

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError>;

    async fn hard_delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Subset of `ids` that still exist.
    async fn existing_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError>;

    /// Rewrite retention dates of every document of `kind` under `policy`. This is the
    /// only path that changes an expiry after creation. Returns the number of rows updated.
    async fn recompute_retention(
        &self,
        kind: DocumentKind,
        policy: RetentionPolicy,
    ) -> Result<u64, AppError>;
}

/// Read-only company lookup used by matching and access resolution.
#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, AppError>;

    /// Active companies with this integer reference number.
    async fn find_by_reference_no(&self, reference_no: i64) -> Result<Vec<Company>, AppError>;

    /// Active companies with this short code (exact, case-sensitive).
    async fn find_by_code(&self, code: &str) -> Result<Vec<Company>, AppError>;

    /// Active companies whose text reference, or rendered reference number, equals `text`.
    async fn find_by_reference_text(&self, text: &str) -> Result<Vec<Company>, AppError>;

    /// Direct children of any of `parent_ids`.
    async fn children_of(&self, parent_ids: &[Uuid]) -> Result<Vec<Company>, AppError>;
}

/// Ephemeral bulk-allocation session state.
#[async_trait]
pub trait AllocationSessionStore: Send + Sync {
    async fn create(&self, session: AllocationSession) -> Result<(), AppError>;

    async fn get(&self, allocation_id: Uuid) -> Result<Option<AllocationSession>, AppError>;

    async fn set_current_file(
        &self,
        allocation_id: Uuid,
        file_name: Option<String>,
    ) -> Result<(), AppError>;

    /// Append a result and advance the processed counter.
    async fn record_result(
        &self,
        allocation_id: Uuid,
        result: AllocationResult,
    ) -> Result<(), AppError>;

    /// Flag a running session for cancellation. Returns false for unknown or finished sessions.
    async fn request_cancel(&self, allocation_id: Uuid) -> Result<bool, AppError>;

    async fn finish(&self, allocation_id: Uuid, status: SessionStatus) -> Result<(), AppError>;

    /// Drop finished sessions older than `ttl`. Returns the number evicted.
    async fn evict_finished(&self, ttl: Duration) -> Result<usize, AppError>;
}

/// Persistence for the settings snapshot.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Option<SettingsSnapshot>, AppError>;

    async fn save(&self, snapshot: &SettingsSnapshot) -> Result<(), AppError>;
}
