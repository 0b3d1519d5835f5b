use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use docintake_core::models::{
    Document, DocumentKind, DocumentQuery, NewDocument, RetentionPolicy, RetentionTrigger,
};
use docintake_core::AppError;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use std::collections::HashSet;
use uuid::Uuid;

use super::decode_error;
use crate::db::traits::DocumentRepository;

const DOCUMENT_COLUMNS: &str = "id, kind, document_number, company_id, issue_date, due_date, \
     amount, vat_amount, total_amount, file_url, status, source_file_id, retention_start_date, \
     retention_expiry_date, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    kind: String,
    document_number: String,
    company_id: Uuid,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    amount: Decimal,
    vat_amount: Decimal,
    total_amount: Decimal,
    file_url: String,
    status: String,
    source_file_id: Option<Uuid>,
    retention_start_date: Option<DateTime<Utc>>,
    retention_expiry_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: row.id,
            kind: row
                .kind
                .parse()
                .map_err(|e| decode_error("documents.kind", e))?,
            document_number: row.document_number,
            company_id: row.company_id,
            issue_date: row.issue_date,
            due_date: row.due_date,
            amount: row.amount,
            vat_amount: row.vat_amount,
            total_amount: row.total_amount,
            file_url: row.file_url,
            status: row
                .status
                .parse()
                .map_err(|e| decode_error("documents.status", e))?,
            source_file_id: row.source_file_id,
            retention_start_date: row.retention_start_date,
            retention_expiry_date: row.retention_expiry_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn into_documents(rows: Vec<DocumentRow>) -> Result<Vec<Document>, AppError> {
    rows.into_iter().map(Document::try_from).collect()
}

#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    #[tracing::instrument(skip(self, new_document), fields(db.table = "documents", db.operation = "insert"))]
    async fn insert(&self, new_document: NewDocument) -> Result<Document, AppError> {
        // uq_documents_company_number turns a racing duplicate into a Conflict
        let row = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            r#"
            INSERT INTO documents (
                id, kind, document_number, company_id, issue_date, due_date, amount, vat_amount,
                total_amount, file_url, status, source_file_id, retention_start_date,
                retention_expiry_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new_document.kind.as_str())
        .bind(&new_document.document_number)
        .bind(new_document.company_id)
        .bind(new_document.issue_date)
        .bind(new_document.due_date)
        .bind(new_document.amount)
        .bind(new_document.vat_amount)
        .bind(new_document.total_amount)
        .bind(&new_document.file_url)
        .bind(new_document.status.as_str())
        .bind(new_document.source_file_id)
        .bind(new_document.retention_start_date)
        .bind(new_document.retention_expiry_date)
        .bind(new_document.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        let row = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "select"))]
    async fn find_live_by_number(
        &self,
        company_id: Uuid,
        document_number: &str,
    ) -> Result<Option<Document>, AppError> {
        let row = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            "SELECT {} FROM documents \
             WHERE company_id = $1 AND document_number = $2 AND deleted_at IS NULL",
            DOCUMENT_COLUMNS
        ))
        .bind(company_id)
        .bind(document_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "update", db.record_id = %id))]
    async fn set_file_url(&self, id: Uuid, file_url: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE documents SET file_url = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(file_url)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("document {}", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "documents", db.operation = "select"))]
    async fn list(&self, query: &DocumentQuery) -> Result<Vec<Document>, AppError> {
        // an empty scope must not fall through to "no predicate"
        if query.scope.matches_nothing() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            r#"
            SELECT {} FROM documents
            WHERE ($1::uuid[] IS NULL OR company_id = ANY($1))
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::uuid IS NULL OR company_id = $3)
              AND ($4 OR deleted_at IS NULL)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(query.scope.company_ids())
        .bind(query.kind.map(|kind| kind.as_str()))
        .bind(query.company_id)
        .bind(query.include_deleted)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        into_documents(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "select"))]
    async fn find_expired(
        &self,
        kind: DocumentKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Document>, AppError> {
        let rows = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            "SELECT {} FROM documents \
             WHERE kind = $1 AND retention_expiry_date IS NOT NULL AND retention_expiry_date <= $2 \
             ORDER BY retention_expiry_date ASC",
            DOCUMENT_COLUMNS
        ))
        .bind(kind.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        into_documents(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "update", db.record_id = %id))]
    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE documents SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "delete", db.record_id = %id))]
    async fn hard_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "documents", db.operation = "select"))]
    async fn existing_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError> {
        let found = sqlx::query_scalar::<Postgres, Uuid>(
            "SELECT id FROM documents WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(found.into_iter().collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "update"))]
    async fn recompute_retention(
        &self,
        kind: DocumentKind,
        policy: RetentionPolicy,
    ) -> Result<u64, AppError> {
        let from_issue_date = policy.trigger == RetentionTrigger::InvoiceDate;
        let period_days = policy.period_days.map(i64::from);

        let result = sqlx::query(
            r#"
            WITH base AS (
                SELECT id,
                       CASE WHEN $2 THEN (issue_date::timestamp AT TIME ZONE 'UTC')
                            ELSE created_at END AS start_at
                FROM documents
                WHERE kind = $1
            )
            UPDATE documents d
            SET retention_start_date = base.start_at,
                retention_expiry_date = CASE WHEN $3::bigint IS NULL THEN NULL
                                             ELSE base.start_at + make_interval(days => $3::int) END,
                updated_at = NOW()
            FROM base
            WHERE d.id = base.id
            "#,
        )
        .bind(kind.as_str())
        .bind(from_issue_date)
        .bind(period_days)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            kind = %kind,
            period_days = ?policy.period_days,
            trigger = %policy.trigger,
            rows = result.rows_affected(),
            "Recomputed retention dates"
        );

        Ok(result.rows_affected())
    }
}
