use async_trait::async_trait;
use docintake_core::models::Company;
use docintake_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::traits::CompanyDirectory;

const COMPANY_COLUMNS: &str = "id, name, reference_no, code, reference_text, parent_id, \
     is_active, machine_integrated, contact_emails";

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    reference_no: Option<i64>,
    code: Option<String>,
    reference_text: Option<String>,
    parent_id: Option<Uuid>,
    is_active: bool,
    machine_integrated: bool,
    contact_emails: Vec<String>,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        Company {
            id: row.id,
            name: row.name,
            reference_no: row.reference_no,
            code: row.code,
            reference_text: row.reference_text,
            parent_id: row.parent_id,
            is_active: row.is_active,
            machine_integrated: row.machine_integrated,
            contact_emails: row.contact_emails,
        }
    }
}

/// Read-only view over the `companies` table.
#[derive(Clone)]
pub struct PgCompanyDirectory {
    pool: PgPool,
}

impl PgCompanyDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn active_where<T>(&self, clause: &str, value: T) -> Result<Vec<Company>, AppError>
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    {
        let rows = sqlx::query_as::<Postgres, CompanyRow>(&format!(
            "SELECT {} FROM companies WHERE is_active AND ({}) ORDER BY name ASC, id ASC",
            COMPANY_COLUMNS, clause
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Company::from).collect())
    }
}

#[async_trait]
impl CompanyDirectory for PgCompanyDirectory {
    #[tracing::instrument(skip(self), fields(db.table = "companies", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<Company>, AppError> {
        let row = sqlx::query_as::<Postgres, CompanyRow>(&format!(
            "SELECT {} FROM companies WHERE id = $1",
            COMPANY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Company::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "companies", db.operation = "select"))]
    async fn find_by_reference_no(&self, reference_no: i64) -> Result<Vec<Company>, AppError> {
        self.active_where("reference_no = $1", reference_no).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "companies", db.operation = "select"))]
    async fn find_by_code(&self, code: &str) -> Result<Vec<Company>, AppError> {
        self.active_where("code = $1", code.to_string()).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "companies", db.operation = "select"))]
    async fn find_by_reference_text(&self, text: &str) -> Result<Vec<Company>, AppError> {
        self.active_where(
            "reference_text = $1 OR reference_no::text = $1",
            text.to_string(),
        )
        .await
    }

    #[tracing::instrument(skip(self, parent_ids), fields(db.table = "companies", db.operation = "select"))]
    async fn children_of(&self, parent_ids: &[Uuid]) -> Result<Vec<Company>, AppError> {
        let rows = sqlx::query_as::<Postgres, CompanyRow>(&format!(
            "SELECT {} FROM companies WHERE parent_id = ANY($1)",
            COMPANY_COLUMNS
        ))
        .bind(parent_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Company::from).collect())
    }
}
