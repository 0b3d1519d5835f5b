use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Staff,
    Client,
}

impl UserRole {
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Staff)
    }
}

/// The inputs access resolution needs about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccess {
    pub user_id: Uuid,
    pub role: UserRole,
    /// Explicit "all companies" override for non-privileged users.
    pub all_companies: bool,
    pub assigned_company_ids: Vec<Uuid>,
}

/// Effective visibility over documents.
///
/// `Unrestricted` means no predicate at all; `Companies` with an empty set means the
/// user sees nothing. The two are deliberately distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessScope {
    Unrestricted,
    Companies(BTreeSet<Uuid>),
}

impl AccessScope {
    pub fn none() -> Self {
        AccessScope::Companies(BTreeSet::new())
    }

    pub fn allows(&self, company_id: Uuid) -> bool {
        match self {
            AccessScope::Unrestricted => true,
            AccessScope::Companies(ids) => ids.contains(&company_id),
        }
    }

    /// Company ids for a SQL `= ANY($1)` predicate; `None` means unrestricted.
    pub fn company_ids(&self) -> Option<Vec<Uuid>> {
        match self {
            AccessScope::Unrestricted => None,
            AccessScope::Companies(ids) => Some(ids.iter().copied().collect()),
        }
    }

    /// True when no document can match.
    pub fn matches_nothing(&self) -> bool {
        matches!(self, AccessScope::Companies(ids) if ids.is_empty())
    }
}
