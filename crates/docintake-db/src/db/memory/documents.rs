use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docintake_core::models::{
    Document, DocumentKind, DocumentQuery, NewDocument, RetentionPolicy,
};
use docintake_core::AppError;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::page;
use crate::db::traits::DocumentRepository;

#[derive(Clone, Default)]
pub struct InMemoryDocumentRepository {
    documents: Arc<RwLock<Vec<Document>>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    /// Overwrite a stored document, for tests that need to age a row.
    pub async fn replace(&self, document: Document) {
        let mut documents = self.documents.write().await;
        if let Some(slot) = documents.iter_mut().find(|d| d.id == document.id) {
            *slot = document;
        }
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(&self, new_document: NewDocument) -> Result<Document, AppError> {
        let mut documents = self.documents.write().await;

        // check and insert under one lock, like the partial unique index
        if documents.iter().any(|d| {
            !d.is_deleted()
                && d.company_id == new_document.company_id
                && d.document_number == new_document.document_number
        }) {
            return Err(AppError::Conflict(format!(
                "document number {} already exists for company {}",
                new_document.document_number, new_document.company_id
            )));
        }

        let document = Document {
            id: Uuid::new_v4(),
            kind: new_document.kind,
            document_number: new_document.document_number,
            company_id: new_document.company_id,
            issue_date: new_document.issue_date,
            due_date: new_document.due_date,
            amount: new_document.amount,
            vat_amount: new_document.vat_amount,
            total_amount: new_document.total_amount,
            file_url: new_document.file_url,
            status: new_document.status,
            source_file_id: new_document.source_file_id,
            retention_start_date: new_document.retention_start_date,
            retention_expiry_date: new_document.retention_expiry_date,
            created_at: new_document.created_at,
            updated_at: new_document.created_at,
            deleted_at: None,
        };
        documents.push(document.clone());
        Ok(document)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn find_live_by_number(
        &self,
        company_id: Uuid,
        document_number: &str,
    ) -> Result<Option<Document>, AppError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .find(|d| {
                !d.is_deleted()
                    && d.company_id == company_id
                    && d.document_number == document_number
            })
            .cloned())
    }

    async fn set_file_url(&self, id: Uuid, file_url: &str) -> Result<(), AppError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::NotFound(format!("document {}", id)))?;
        document.file_url = file_url.to_string();
        document.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self, query: &DocumentQuery) -> Result<Vec<Document>, AppError> {
        if query.scope.matches_nothing() {
            return Ok(Vec::new());
        }
        let documents = self.documents.read().await;
        let mut matching: Vec<Document> = documents
            .iter()
            .filter(|d| query.scope.allows(d.company_id))
            .filter(|d| query.kind.map_or(true, |kind| d.kind == kind))
            .filter(|d| query.company_id.map_or(true, |id| d.company_id == id))
            .filter(|d| query.include_deleted || !d.is_deleted())
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matching.into_iter(), query.limit, query.offset))
    }

    async fn find_expired(
        &self,
        kind: DocumentKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Document>, AppError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|d| d.kind == kind && d.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut documents = self.documents.write().await;
        match documents.iter_mut().find(|d| d.id == id && !d.is_deleted()) {
            Some(document) => {
                document.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hard_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| d.id != id);
        Ok(documents.len() < before)
    }

    async fn existing_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .map(|d| d.id)
            .filter(|id| ids.contains(id))
            .collect())
    }

    async fn recompute_retention(
        &self,
        kind: DocumentKind,
        policy: RetentionPolicy,
    ) -> Result<u64, AppError> {
        let mut documents = self.documents.write().await;
        let mut updated = 0;
        for document in documents.iter_mut().filter(|d| d.kind == kind) {
            let dates = policy.compute(document.created_at, document.issue_date);
            document.retention_start_date = dates.start;
            document.retention_expiry_date = dates.expiry;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use docintake_core::models::{AccessScope, DocumentStatus, RetentionTrigger};
    use rust_decimal::Decimal;

    fn new_document(company_id: Uuid, number: &str) -> NewDocument {
        NewDocument {
            kind: DocumentKind::Invoice,
            document_number: number.to_string(),
            company_id,
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            due_date: None,
            amount: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            file_url: format!("processed/invoices/{}.pdf", number),
            status: DocumentStatus::Ready,
            source_file_id: None,
            retention_start_date: None,
            retention_expiry_date: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn number_is_unique_per_company_among_live_rows() {
        let repo = InMemoryDocumentRepository::new();
        let company = Uuid::new_v4();
        let first = repo.insert(new_document(company, "INV-1")).await.unwrap();
        assert!(repo
            .insert(new_document(company, "INV-1"))
            .await
            .unwrap_err()
            .is_conflict());

        // another company may reuse the number
        repo.insert(new_document(Uuid::new_v4(), "INV-1"))
            .await
            .unwrap();

        repo.soft_delete(first.id).await.unwrap();
        repo.insert(new_document(company, "INV-1")).await.unwrap();
    }

    #[tokio::test]
    async fn empty_scope_lists_nothing() {
        let repo = InMemoryDocumentRepository::new();
        repo.insert(new_document(Uuid::new_v4(), "INV-2"))
            .await
            .unwrap();
        let query = DocumentQuery::scoped(AccessScope::none());
        assert!(repo.list(&query).await.unwrap().is_empty());
        let query = DocumentQuery::scoped(AccessScope::Unrestricted);
        assert_eq!(repo.list(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recompute_rewrites_expiry_and_find_expired_sees_deleted_rows() {
        let repo = InMemoryDocumentRepository::new();
        let doc = repo
            .insert(new_document(Uuid::new_v4(), "INV-3"))
            .await
            .unwrap();
        repo.soft_delete(doc.id).await.unwrap();

        let policy = RetentionPolicy::days(0, RetentionTrigger::UploadDate);
        assert_eq!(
            repo.recompute_retention(DocumentKind::Invoice, policy)
                .await
                .unwrap(),
            1
        );
        let expired = repo
            .find_expired(DocumentKind::Invoice, Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert!(expired[0].is_deleted());
    }
}
