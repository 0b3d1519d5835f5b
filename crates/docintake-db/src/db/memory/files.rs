use async_trait::async_trait;
use chrono::Utc;
use docintake_core::models::{
    AllocationMetadata, EditLogEntry, FileFailure, FileFilter, FileRecord, FileStatus, NewFile,
};
use docintake_core::AppError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::page;
use crate::db::traits::FileRepository;

/// File rows kept in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryFileRepository {
    files: Arc<RwLock<Vec<FileRecord>>>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row, soft-deleted ones included.
    pub async fn snapshot(&self) -> Vec<FileRecord> {
        self.files.read().await.clone()
    }
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn insert(&self, new_file: NewFile) -> Result<FileRecord, AppError> {
        let mut files = self.files.write().await;

        if new_file.status != FileStatus::Duplicate
            && files
                .iter()
                .any(|f| f.content_hash == new_file.content_hash && f.status != FileStatus::Duplicate)
        {
            return Err(AppError::Conflict(format!(
                "content hash {} already recorded",
                new_file.content_hash
            )));
        }

        let now = Utc::now();
        let record = FileRecord {
            id: Uuid::new_v4(),
            file_name: new_file.file_name,
            storage_path: new_file.storage_path,
            content_hash: new_file.content_hash,
            status: new_file.status,
            failure_reason: None,
            failure_details: None,
            last_error: None,
            parsed_data: None,
            company_id: None,
            document_id: None,
            duplicate_of: new_file.duplicate_of,
            edit_log: Vec::new(),
            allocation: None,
            uploaded_by: new_file.uploaded_by,
            uploaded_at: now,
            updated_at: now,
            deleted_at: None,
        };
        files.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        Ok(self.files.read().await.iter().find(|f| f.id == id).cloned())
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>, AppError> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|f| f.content_hash == content_hash && f.status != FileStatus::Duplicate)
            .min_by_key(|f| f.uploaded_at)
            .cloned())
    }

    async fn list(&self, filter: &FileFilter) -> Result<Vec<FileRecord>, AppError> {
        let files = self.files.read().await;
        let matching = files
            .iter()
            .filter(|f| filter.statuses.contains(&f.status))
            .filter(|f| filter.include_deleted || !f.is_deleted())
            .cloned();
        Ok(page(matching, filter.limit, filter.offset))
    }

    async fn set_storage_path(&self, id: Uuid, storage_path: &str) -> Result<(), AppError> {
        let mut files = self.files.write().await;
        let file = files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| AppError::NotFound(format!("file {}", id)))?;
        file.storage_path = storage_path.to_string();
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn set_parsed_data(&self, id: Uuid, parsed_data: &Value) -> Result<(), AppError> {
        let mut files = self.files.write().await;
        let file = files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| AppError::NotFound(format!("file {}", id)))?;
        file.parsed_data = Some(parsed_data.clone());
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failure(&self, id: Uuid, failure: &FileFailure) -> Result<bool, AppError> {
        let mut files = self.files.write().await;
        match files
            .iter_mut()
            .find(|f| f.id == id && f.is_eligible_for_allocation())
        {
            Some(file) => {
                file.status = failure.status;
                file.failure_reason = Some(failure.reason);
                file.failure_details = failure.details.clone();
                file.last_error = failure.last_error.clone();
                file.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_parsed(
        &self,
        id: Uuid,
        company_id: Uuid,
        allocation: &AllocationMetadata,
    ) -> Result<bool, AppError> {
        let mut files = self.files.write().await;
        match files
            .iter_mut()
            .find(|f| f.id == id && f.is_eligible_for_allocation())
        {
            Some(file) => {
                file.status = FileStatus::Parsed;
                file.failure_reason = None;
                file.failure_details = None;
                file.last_error = None;
                file.company_id = Some(company_id);
                file.document_id = Some(allocation.document_id);
                file.allocation = Some(allocation.clone());
                file.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn apply_edit(
        &self,
        id: Uuid,
        parsed_data: &Value,
        entry: &EditLogEntry,
    ) -> Result<Option<FileRecord>, AppError> {
        let mut files = self.files.write().await;
        match files
            .iter_mut()
            .find(|f| f.id == id && !f.is_deleted() && f.status.is_remediable())
        {
            Some(file) => {
                file.parsed_data = Some(parsed_data.clone());
                file.edit_log.push(entry.clone());
                file.status = FileStatus::Pending;
                file.failure_reason = None;
                file.failure_details = None;
                file.last_error = None;
                file.updated_at = Utc::now();
                Ok(Some(file.clone()))
            }
            None => Ok(None),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut files = self.files.write().await;
        match files.iter_mut().find(|f| f.id == id && !f.is_deleted()) {
            Some(file) => {
                let now = Utc::now();
                file.deleted_at = Some(now);
                file.document_id = None;
                file.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hard_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut files = self.files.write().await;
        let before = files.len();
        files.retain(|f| f.id != id);
        // duplicates pointing at the removed row lose their reference, as with ON DELETE SET NULL
        for file in files.iter_mut().filter(|f| f.duplicate_of == Some(id)) {
            file.duplicate_of = None;
        }
        Ok(files.len() < before)
    }

    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<FileRecord>, AppError> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|f| f.document_id == Some(document_id))
            .cloned()
            .collect())
    }

    async fn find_by_storage_paths(
        &self,
        storage_paths: &[String],
    ) -> Result<Vec<FileRecord>, AppError> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|f| storage_paths.contains(&f.storage_path))
            .cloned()
            .collect())
    }

    async fn list_live_parsed(&self) -> Result<Vec<FileRecord>, AppError> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|f| f.status == FileStatus::Parsed && !f.is_deleted())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docintake_core::models::FailureReason;

    fn new_file(hash: &str, status: FileStatus) -> NewFile {
        NewFile {
            file_name: "a.pdf".to_string(),
            storage_path: "unprocessed/a.pdf".to_string(),
            content_hash: hash.to_string(),
            status,
            duplicate_of: None,
            uploaded_by: None,
        }
    }

    #[tokio::test]
    async fn second_live_hash_conflicts_but_duplicates_are_allowed() {
        let repo = InMemoryFileRepository::new();
        let first = repo.insert(new_file("h1", FileStatus::Pending)).await.unwrap();

        let err = repo
            .insert(new_file("h1", FileStatus::Pending))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        repo.insert(new_file("h1", FileStatus::Duplicate)).await.unwrap();
        let found = repo.find_by_hash("h1").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn soft_deleted_rows_keep_their_hash() {
        let repo = InMemoryFileRepository::new();
        let file = repo.insert(new_file("h2", FileStatus::Pending)).await.unwrap();
        assert!(repo.soft_delete(file.id).await.unwrap());

        let found = repo.find_by_hash("h2").await.unwrap().unwrap();
        assert!(found.is_deleted());
        assert_eq!(found.content_hash, "h2");
    }

    #[tokio::test]
    async fn failure_does_not_overwrite_parsed_file() {
        let repo = InMemoryFileRepository::new();
        let file = repo.insert(new_file("h3", FileStatus::Pending)).await.unwrap();
        let allocation = AllocationMetadata {
            allocated_by: "system".to_string(),
            allocated_at: Utc::now(),
            document_id: Uuid::new_v4(),
            document_kind: docintake_core::models::DocumentKind::Invoice,
            match_strategy: None,
        };
        assert!(repo
            .mark_parsed(file.id, Uuid::new_v4(), &allocation)
            .await
            .unwrap());

        let failure = FileFailure::failed(FailureReason::ProcessingError, "late");
        assert!(!repo.mark_failure(file.id, &failure).await.unwrap());
        let stored = repo.get(file.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FileStatus::Parsed);
    }

    #[tokio::test]
    async fn edits_only_apply_to_remediable_files() {
        let repo = InMemoryFileRepository::new();
        let file = repo.insert(new_file("h4", FileStatus::Pending)).await.unwrap();
        let entry = EditLogEntry {
            editor: "staff".to_string(),
            edited_at: Utc::now(),
            diff: serde_json::json!({}),
        };
        let data = serde_json::json!({"account_number": "45"});
        assert!(repo.apply_edit(file.id, &data, &entry).await.unwrap().is_none());

        repo.mark_failure(
            file.id,
            &FileFailure::unallocated(FailureReason::NoMatchingCompany, None),
        )
        .await
        .unwrap();
        let edited = repo.apply_edit(file.id, &data, &entry).await.unwrap().unwrap();
        assert_eq!(edited.status, FileStatus::Pending);
        assert_eq!(edited.edit_log.len(), 1);
        assert!(edited.failure_reason.is_none());
    }
}
