//! Typed listing filters. Each use case gets an explicit constructor instead of ad hoc
//! predicate composition.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::AccessScope;
use super::document::DocumentKind;
use super::file::FileStatus;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileFilter {
    pub statuses: Vec<FileStatus>,
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

impl FileFilter {
    fn with_statuses(statuses: Vec<FileStatus>) -> Self {
        Self {
            statuses,
            include_deleted: false,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn unallocated() -> Self {
        Self::with_statuses(vec![FileStatus::Unallocated])
    }

    pub fn failed() -> Self {
        Self::with_statuses(vec![FileStatus::Failed])
    }

    pub fn duplicates() -> Self {
        Self::with_statuses(vec![FileStatus::Duplicate])
    }

    pub fn pending() -> Self {
        Self::with_statuses(vec![FileStatus::Pending])
    }

    /// Everything staff can resubmit.
    pub fn remediable() -> Self {
        Self::with_statuses(vec![FileStatus::Unallocated, FileStatus::Failed])
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self.offset = offset.max(0);
        self
    }

    /// Unbounded page, for batch jobs that walk every match.
    pub fn all(mut self) -> Self {
        self.limit = i64::MAX;
        self.offset = 0;
        self
    }

    pub fn status_strings(&self) -> Vec<String> {
        self.statuses.iter().map(|s| s.as_str().to_string()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentQuery {
    pub scope: AccessScope,
    pub kind: Option<DocumentKind>,
    pub company_id: Option<Uuid>,
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

impl DocumentQuery {
    pub fn scoped(scope: AccessScope) -> Self {
        Self {
            scope,
            kind: None,
            company_id: None,
            include_deleted: false,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn kind(mut self, kind: DocumentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn company(mut self, company_id: Uuid) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self.offset = offset.max(0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediable_covers_unallocated_and_failed() {
        let filter = FileFilter::remediable();
        assert_eq!(filter.status_strings(), vec!["unallocated", "failed"]);
        assert!(!filter.include_deleted);
    }

    #[test]
    fn page_is_clamped() {
        let filter = FileFilter::failed().page(5000, -3);
        assert_eq!(filter.limit, 1000);
        assert_eq!(filter.offset, 0);
    }
}
