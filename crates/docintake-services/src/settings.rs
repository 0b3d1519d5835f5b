//! Settings snapshot cache.
//!
//! Jobs and retention runs take an explicit [`SettingsSnapshot`] at their start. Writes go
//! through [`SettingsCache::update`], which persists, refreshes the cached snapshot and
//! recomputes retention dates for every document type whose policy changed.

use docintake_core::models::{DocumentKind, SettingsSnapshot, MAX_RETENTION_DAYS};
use docintake_core::AppError;
use docintake_db::{DocumentRepository, SettingsStore};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct SettingsCache {
    store: Arc<dyn SettingsStore>,
    documents: Arc<dyn DocumentRepository>,
    /// Used until a snapshot has been saved.
    defaults: SettingsSnapshot,
    current: RwLock<Option<SettingsSnapshot>>,
}

impl SettingsCache {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        documents: Arc<dyn DocumentRepository>,
        defaults: SettingsSnapshot,
    ) -> Self {
        Self {
            store,
            documents,
            defaults,
            current: RwLock::new(None),
        }
    }

    pub async fn snapshot(&self) -> Result<SettingsSnapshot, AppError> {
        if let Some(snapshot) = *self.current.read().await {
            return Ok(snapshot);
        }

        let mut current = self.current.write().await;
        if let Some(snapshot) = *current {
            return Ok(snapshot);
        }
        let loaded = self.store.load().await?.unwrap_or(self.defaults);
        *current = Some(loaded);
        Ok(loaded)
    }

    /// Drop the cached snapshot; the next read reloads from the store.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    /// Persist `next` and recompute retention for the kinds it changes. Returns the
    /// recomputed kinds with the number of documents updated.
    #[tracing::instrument(skip(self, next))]
    pub async fn update(
        &self,
        next: SettingsSnapshot,
    ) -> Result<Vec<(DocumentKind, u64)>, AppError> {
        for kind in DocumentKind::ALL {
            if let Some(days) = next.retention_for(kind).period_days {
                if days > MAX_RETENTION_DAYS {
                    return Err(AppError::InvalidInput(format!(
                        "{} retention of {} days exceeds the {} day limit",
                        kind, days, MAX_RETENTION_DAYS
                    )));
                }
            }
        }

        let previous = self.snapshot().await?;
        self.store.save(&next).await?;
        *self.current.write().await = Some(next);

        let mut recomputed = Vec::new();
        for kind in previous.changed_kinds(&next) {
            let rows = self
                .documents
                .recompute_retention(kind, next.retention_for(kind))
                .await?;
            recomputed.push((kind, rows));
        }

        tracing::info!(changed = recomputed.len(), "Settings updated");
        Ok(recomputed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docintake_core::models::{RetentionPolicy, RetentionTrigger};
    use docintake_db::{InMemoryDocumentRepository, InMemorySettingsStore};

    fn cache(defaults: SettingsSnapshot) -> (SettingsCache, InMemorySettingsStore) {
        let store = InMemorySettingsStore::new();
        let cache = SettingsCache::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryDocumentRepository::new()),
            defaults,
        );
        (cache, store)
    }

    #[tokio::test]
    async fn falls_back_to_defaults() {
        let defaults =
            SettingsSnapshot::uniform(RetentionPolicy::days(30, RetentionTrigger::UploadDate));
        let (cache, _) = cache(defaults);
        assert_eq!(cache.snapshot().await.unwrap(), defaults);
    }

    #[tokio::test]
    async fn invalidate_picks_up_external_writes() {
        let (cache, store) = cache(SettingsSnapshot::default());
        assert_eq!(cache.snapshot().await.unwrap(), SettingsSnapshot::default());

        let written =
            SettingsSnapshot::uniform(RetentionPolicy::days(7, RetentionTrigger::InvoiceDate));
        store.save(&written).await.unwrap();
        assert_eq!(cache.snapshot().await.unwrap(), SettingsSnapshot::default());

        cache.invalidate().await;
        assert_eq!(cache.snapshot().await.unwrap(), written);
    }

    #[tokio::test]
    async fn update_recomputes_only_changed_kinds() {
        let (cache, store) = cache(SettingsSnapshot::default());
        let next = SettingsSnapshot::default().with_retention(
            DocumentKind::CreditNote,
            RetentionPolicy::days(90, RetentionTrigger::UploadDate),
        );

        let recomputed = cache.update(next).await.unwrap();
        assert_eq!(recomputed, vec![(DocumentKind::CreditNote, 0)]);
        assert_eq!(store.load().await.unwrap(), Some(next));
        assert_eq!(cache.snapshot().await.unwrap(), next);
    }

    #[tokio::test]
    async fn update_rejects_oversized_period() {
        let (cache, store) = cache(SettingsSnapshot::default());
        let next = SettingsSnapshot::default().with_retention(
            DocumentKind::Invoice,
            RetentionPolicy::days(MAX_RETENTION_DAYS + 1, RetentionTrigger::UploadDate),
        );

        let err = cache.update(next).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(store.load().await.unwrap(), None);
    }
}
