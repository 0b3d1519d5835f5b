use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::document::DocumentKind;
use super::parsed::ParsedFields;

/// Lifecycle state of an ingested file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Parsed,
    Unallocated,
    Failed,
    Duplicate,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Parsed => "parsed",
            FileStatus::Unallocated => "unallocated",
            FileStatus::Failed => "failed",
            FileStatus::Duplicate => "duplicate",
        }
    }

    /// Statuses staff can edit and resubmit.
    pub fn is_remediable(&self) -> bool {
        matches!(self, FileStatus::Unallocated | FileStatus::Failed)
    }

    /// Statuses the allocator accepts as input.
    pub fn is_allocatable(&self) -> bool {
        matches!(
            self,
            FileStatus::Pending | FileStatus::Unallocated | FileStatus::Failed
        )
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "parsed" => Ok(FileStatus::Parsed),
            "unallocated" => Ok(FileStatus::Unallocated),
            "failed" => Ok(FileStatus::Failed),
            "duplicate" => Ok(FileStatus::Duplicate),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

/// Why a file did not become a document. Stored as a stable snake_case string so
/// staff tooling and automation can branch on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MissingAccountNumber,
    NoMatchingCompany,
    DocumentNumberConflict,
    ParseFailed,
    ProcessingError,
    EnqueueFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::MissingAccountNumber => "missing_account_number",
            FailureReason::NoMatchingCompany => "no_matching_company",
            FailureReason::DocumentNumberConflict => "document_number_conflict",
            FailureReason::ParseFailed => "parse_failed",
            FailureReason::ProcessingError => "processing_error",
            FailureReason::EnqueueFailed => "enqueue_failed",
        }
    }
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_account_number" => Ok(FailureReason::MissingAccountNumber),
            "no_matching_company" => Ok(FailureReason::NoMatchingCompany),
            "document_number_conflict" => Ok(FailureReason::DocumentNumberConflict),
            "parse_failed" => Ok(FailureReason::ParseFailed),
            "processing_error" => Ok(FailureReason::ProcessingError),
            "enqueue_failed" => Ok(FailureReason::EnqueueFailed),
            _ => Err(anyhow::anyhow!("Invalid failure reason: {}", s)),
        }
    }
}

/// One staff edit of a file's extracted data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditLogEntry {
    pub editor: String,
    pub edited_at: DateTime<Utc>,
    /// `{ field: { "old": .., "new": .. } }`
    pub diff: serde_json::Value,
}

/// Who allocated a file, when, and into which document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationMetadata {
    pub allocated_by: String,
    pub allocated_at: DateTime<Utc>,
    pub document_id: Uuid,
    pub document_kind: DocumentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_strategy: Option<String>,
}

/// An ingested artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    /// Never cleared, including after soft deletion.
    pub content_hash: String,
    pub status: FileStatus,
    pub failure_reason: Option<FailureReason>,
    /// Diagnostics for the failure (e.g. matching candidates tried).
    pub failure_details: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub parsed_data: Option<serde_json::Value>,
    pub company_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub duplicate_of: Option<Uuid>,
    pub edit_log: Vec<EditLogEntry>,
    pub allocation: Option<AllocationMetadata>,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// A file can be (re)allocated only while it is live and not yet parsed or duplicate.
    pub fn is_eligible_for_allocation(&self) -> bool {
        !self.is_deleted() && self.status.is_allocatable()
    }

    /// Typed view over `parsed_data`. Returns `None` when nothing was extracted yet.
    pub fn parsed_fields(&self) -> Option<ParsedFields> {
        self.parsed_data
            .as_ref()
            .map(|value| ParsedFields::from_value_lossy(value.clone()))
    }
}

/// Values required to insert a file row.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub file_name: String,
    pub storage_path: String,
    pub content_hash: String,
    pub status: FileStatus,
    pub duplicate_of: Option<Uuid>,
    pub uploaded_by: Option<String>,
}

/// Outcome fields written when a file is routed away from allocation.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub status: FileStatus,
    pub reason: FailureReason,
    pub details: Option<serde_json::Value>,
    pub last_error: Option<String>,
}

impl FileFailure {
    pub fn unallocated(reason: FailureReason, details: Option<serde_json::Value>) -> Self {
        Self {
            status: FileStatus::Unallocated,
            reason,
            details,
            last_error: None,
        }
    }

    pub fn failed(reason: FailureReason, last_error: impl Into<String>) -> Self {
        Self {
            status: FileStatus::Failed,
            reason,
            details: None,
            last_error: Some(last_error.into()),
        }
    }
}
