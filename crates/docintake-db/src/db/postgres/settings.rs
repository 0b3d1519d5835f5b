use async_trait::async_trait;
use docintake_core::models::SettingsSnapshot;
use docintake_core::AppError;
use serde_json::Value;
use sqlx::{PgPool, Postgres};

use crate::db::traits::SettingsStore;

/// Single-row settings table.
#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    #[tracing::instrument(skip(self), fields(db.table = "settings", db.operation = "select"))]
    async fn load(&self) -> Result<Option<SettingsSnapshot>, AppError> {
        let value =
            sqlx::query_scalar::<Postgres, Value>("SELECT snapshot FROM settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.map(serde_json::from_value).transpose()?)
    }

    #[tracing::instrument(skip(self, snapshot), fields(db.table = "settings", db.operation = "upsert"))]
    async fn save(&self, snapshot: &SettingsSnapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO settings (id, snapshot, updated_at)
            VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = NOW()
            "#,
        )
        .bind(serde_json::to_value(snapshot)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
