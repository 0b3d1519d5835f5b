use async_trait::async_trait;
use docintake_core::models::Company;
use docintake_core::AppError;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::traits::CompanyDirectory;

#[derive(Clone, Default)]
pub struct InMemoryCompanyDirectory {
    companies: Arc<RwLock<Vec<Company>>>,
}

impl InMemoryCompanyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_companies(companies: Vec<Company>) -> Self {
        Self {
            companies: Arc::new(RwLock::new(companies)),
        }
    }

    pub async fn insert(&self, company: Company) {
        self.companies.write().await.push(company);
    }

    /// Same ordering as the SQL directory: name, then id.
    async fn active_where(&self, predicate: impl Fn(&Company) -> bool) -> Vec<Company> {
        let mut found: Vec<Company> = self
            .companies
            .read()
            .await
            .iter()
            .filter(|c| c.is_active && predicate(c))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        found
    }
}

#[async_trait]
impl CompanyDirectory for InMemoryCompanyDirectory {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, AppError> {
        Ok(self
            .companies
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_by_reference_no(&self, reference_no: i64) -> Result<Vec<Company>, AppError> {
        Ok(self
            .active_where(|c| c.reference_no == Some(reference_no))
            .await)
    }

    async fn find_by_code(&self, code: &str) -> Result<Vec<Company>, AppError> {
        Ok(self.active_where(|c| c.code.as_deref() == Some(code)).await)
    }

    async fn find_by_reference_text(&self, text: &str) -> Result<Vec<Company>, AppError> {
        Ok(self
            .active_where(|c| {
                c.reference_text.as_deref() == Some(text)
                    || c.reference_no.map(|n| n.to_string()).as_deref() == Some(text)
            })
            .await)
    }

    async fn children_of(&self, parent_ids: &[Uuid]) -> Result<Vec<Company>, AppError> {
        Ok(self
            .companies
            .read()
            .await
            .iter()
            .filter(|c| c.parent_id.map_or(false, |p| parent_ids.contains(&p)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inactive_companies_never_match() {
        let mut dormant = Company::new("Dormant").with_reference_no(7);
        dormant.is_active = false;
        let directory = InMemoryCompanyDirectory::with_companies(vec![dormant]);
        assert!(directory.find_by_reference_no(7).await.unwrap().is_empty());
        assert!(directory.find_by_reference_text("7").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reference_text_matches_rendered_number() {
        let company = Company::new("Acme").with_reference_no(120);
        let directory = InMemoryCompanyDirectory::with_companies(vec![company.clone()]);
        let found = directory.find_by_reference_text("120").await.unwrap();
        assert_eq!(found[0].id, company.id);
        assert!(directory.find_by_reference_text("0120").await.unwrap().is_empty());
    }
}
