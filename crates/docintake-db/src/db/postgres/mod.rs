//! PostgreSQL repositories
//!
//! Runtime-checked `sqlx` queries; rows are decoded into private row structs and then
//! converted into the domain models.

mod companies;
mod documents;
mod files;
mod settings;

pub use companies::PgCompanyDirectory;
pub use documents::PgDocumentRepository;
pub use files::PgFileRepository;
pub use settings::PgSettingsStore;

use anyhow::{Context, Result};
use docintake_core::AppError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

const ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(max_connections, "Database connected successfully");
    Ok(pool)
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// A stored enum string that no longer parses is a data-integrity problem.
fn decode_error(column: &str, err: anyhow::Error) -> AppError {
    AppError::Internal(format!("Invalid value in column {}: {}", column, err))
}
