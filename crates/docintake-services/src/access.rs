//! Per-user document visibility over the company hierarchy.

use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use docintake_core::models::{AccessScope, Document, DocumentQuery, UserAccess};
use docintake_core::AppError;
use docintake_db::{CompanyDirectory, DocumentRepository};

/// Resolves a user's assignments into an [`AccessScope`] and gates document reads with it.
#[derive(Clone)]
pub struct AccessFilter {
    directory: Arc<dyn CompanyDirectory>,
    documents: Arc<dyn DocumentRepository>,
}

impl AccessFilter {
    pub fn new(directory: Arc<dyn CompanyDirectory>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self {
            directory,
            documents,
        }
    }

    /// Privileged roles and the all-companies override are unrestricted. Otherwise every
    /// assigned company plus all of its descendants; no assignments means nothing.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn scope_for(&self, user: &UserAccess) -> Result<AccessScope, AppError> {
        if user.role.is_privileged() || user.all_companies {
            return Ok(AccessScope::Unrestricted);
        }

        let mut visible: BTreeSet<Uuid> = user.assigned_company_ids.iter().copied().collect();
        let mut frontier: Vec<Uuid> = visible.iter().copied().collect();

        while !frontier.is_empty() {
            let children = self.directory.children_of(&frontier).await?;
            frontier = children
                .into_iter()
                .map(|child| child.id)
                .filter(|id| visible.insert(*id))
                .collect();
        }

        tracing::debug!(
            assigned = user.assigned_company_ids.len(),
            visible = visible.len(),
            "Resolved access scope"
        );
        Ok(AccessScope::Companies(visible))
    }

    /// List documents with the user's scope replacing whatever scope `query` carried.
    pub async fn list_documents(
        &self,
        user: &UserAccess,
        query: DocumentQuery,
    ) -> Result<Vec<Document>, AppError> {
        let scope = self.scope_for(user).await?;
        if scope.matches_nothing() {
            return Ok(Vec::new());
        }
        self.documents
            .list(&DocumentQuery { scope, ..query })
            .await
    }

    /// Fetch one live document, hiding it when the user may not see it.
    pub async fn get_document(
        &self,
        user: &UserAccess,
        document_id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        let Some(document) = self.documents.get(document_id).await? else {
            return Ok(None);
        };
        if document.is_deleted() {
            return Ok(None);
        }
        let scope = self.scope_for(user).await?;
        Ok(scope.allows(document.company_id).then_some(document))
    }
}
