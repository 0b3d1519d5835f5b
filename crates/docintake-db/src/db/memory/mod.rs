//! In-process repository implementations.
//!
//! Same contracts as the PostgreSQL repositories, including the uniqueness guards,
//! which are enforced under a single write lock.

mod companies;
mod documents;
mod files;
mod sessions;

pub use companies::InMemoryCompanyDirectory;
pub use documents::InMemoryDocumentRepository;
pub use files::InMemoryFileRepository;
pub use sessions::InMemorySessionStore;

use async_trait::async_trait;
use docintake_core::models::SettingsSnapshot;
use docintake_core::AppError;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::traits::SettingsStore;

fn page<T>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.skip(offset).take(limit).collect()
}

#[derive(Clone, Default)]
pub struct InMemorySettingsStore {
    snapshot: Arc<RwLock<Option<SettingsSnapshot>>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn load(&self) -> Result<Option<SettingsSnapshot>, AppError> {
        Ok(*self.snapshot.read().await)
    }

    async fn save(&self, snapshot: &SettingsSnapshot) -> Result<(), AppError> {
        *self.snapshot.write().await = Some(*snapshot);
        Ok(())
    }
}
