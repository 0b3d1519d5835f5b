use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docintake_core::models::{
    AllocationMetadata, EditLogEntry, FileFailure, FileFilter, FileRecord, FileStatus, NewFile,
};
use docintake_core::AppError;
use serde_json::Value;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::decode_error;
use crate::db::traits::FileRepository;

const FILE_COLUMNS: &str = "id, file_name, storage_path, content_hash, status, failure_reason, \
     failure_details, last_error, parsed_data, company_id, document_id, duplicate_of, edit_log, \
     allocation, uploaded_by, uploaded_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    file_name: String,
    storage_path: String,
    content_hash: String,
    status: String,
    failure_reason: Option<String>,
    failure_details: Option<Value>,
    last_error: Option<String>,
    parsed_data: Option<Value>,
    company_id: Option<Uuid>,
    document_id: Option<Uuid>,
    duplicate_of: Option<Uuid>,
    edit_log: Value,
    allocation: Option<Value>,
    uploaded_by: Option<String>,
    uploaded_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = AppError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| decode_error("files.status", e))?;
        let failure_reason = row
            .failure_reason
            .map(|reason| reason.parse())
            .transpose()
            .map_err(|e| decode_error("files.failure_reason", e))?;
        let edit_log = serde_json::from_value(row.edit_log)?;
        let allocation = row.allocation.map(serde_json::from_value).transpose()?;

        Ok(FileRecord {
            id: row.id,
            file_name: row.file_name,
            storage_path: row.storage_path,
            content_hash: row.content_hash,
            status,
            failure_reason,
            failure_details: row.failure_details,
            last_error: row.last_error,
            parsed_data: row.parsed_data,
            company_id: row.company_id,
            document_id: row.document_id,
            duplicate_of: row.duplicate_of,
            edit_log,
            allocation,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn into_records(rows: Vec<FileRow>) -> Result<Vec<FileRecord>, AppError> {
    rows.into_iter().map(FileRecord::try_from).collect()
}

fn allocatable_statuses() -> Vec<String> {
    [
        FileStatus::Pending,
        FileStatus::Parsed,
        FileStatus::Unallocated,
        FileStatus::Failed,
        FileStatus::Duplicate,
    ]
    .into_iter()
    .filter(|s| s.is_allocatable())
    .map(|s| s.as_str().to_string())
    .collect()
}

#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, bind: &str) -> Result<Vec<FileRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files WHERE {} ORDER BY uploaded_at ASC",
            FILE_COLUMNS, clause
        ))
        .bind(bind)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(skip(self, new_file), fields(db.table = "files", db.operation = "insert"))]
    async fn insert(&self, new_file: NewFile) -> Result<FileRecord, AppError> {
        let row = sqlx::query_as::<Postgres, FileRow>(&format!(
            r#"
            INSERT INTO files (id, file_name, storage_path, content_hash, status, duplicate_of, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_file.file_name)
        .bind(&new_file.storage_path)
        .bind(&new_file.content_hash)
        .bind(new_file.status.as_str())
        .bind(new_file.duplicate_of)
        .bind(&new_file.uploaded_by)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files WHERE id = $1",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files WHERE content_hash = $1 AND status <> 'duplicate' \
             ORDER BY uploaded_at ASC LIMIT 1",
            FILE_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn list(&self, filter: &FileFilter) -> Result<Vec<FileRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, FileRow>(&format!(
            r#"
            SELECT {} FROM files
            WHERE status = ANY($1) AND ($2 OR deleted_at IS NULL)
            ORDER BY uploaded_at ASC, id ASC
            LIMIT $3 OFFSET $4
            "#,
            FILE_COLUMNS
        ))
        .bind(filter.status_strings())
        .bind(filter.include_deleted)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn set_storage_path(&self, id: Uuid, storage_path: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE files SET storage_path = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(storage_path)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("file {}", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, parsed_data), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn set_parsed_data(&self, id: Uuid, parsed_data: &Value) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE files SET parsed_data = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(parsed_data)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("file {}", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, failure), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn mark_failure(&self, id: Uuid, failure: &FileFailure) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET status = $2, failure_reason = $3, failure_details = $4, last_error = $5,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND status = ANY($6)
            "#,
        )
        .bind(id)
        .bind(failure.status.as_str())
        .bind(failure.reason.as_str())
        .bind(&failure.details)
        .bind(&failure.last_error)
        .bind(allocatable_statuses())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, allocation), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn mark_parsed(
        &self,
        id: Uuid,
        company_id: Uuid,
        allocation: &AllocationMetadata,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET status = 'parsed', failure_reason = NULL, failure_details = NULL,
                last_error = NULL, company_id = $2, document_id = $3, allocation = $4,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND status = ANY($5)
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(allocation.document_id)
        .bind(serde_json::to_value(allocation)?)
        .bind(allocatable_statuses())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, parsed_data, entry), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn apply_edit(
        &self,
        id: Uuid,
        parsed_data: &Value,
        entry: &EditLogEntry,
    ) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRow>(&format!(
            r#"
            UPDATE files
            SET parsed_data = $2, edit_log = edit_log || jsonb_build_array($3::jsonb),
                status = 'pending', failure_reason = NULL, failure_details = NULL,
                last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND status IN ('unallocated', 'failed')
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(id)
        .bind(parsed_data)
        .bind(serde_json::to_value(entry)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE files SET deleted_at = NOW(), document_id = NULL, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "delete", db.record_id = %id))]
    async fn hard_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<FileRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files WHERE document_id = $1",
            FILE_COLUMNS
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn find_by_storage_paths(
        &self,
        storage_paths: &[String],
    ) -> Result<Vec<FileRecord>, AppError> {
        if storage_paths.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files WHERE storage_path = ANY($1) ORDER BY uploaded_at ASC",
            FILE_COLUMNS
        ))
        .bind(storage_paths)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn list_live_parsed(&self) -> Result<Vec<FileRecord>, AppError> {
        self.fetch_where(
            "status = $1 AND deleted_at IS NULL",
            FileStatus::Parsed.as_str(),
        )
        .await
    }
}
