use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// Queue tier. Staff reprocessing runs ahead of fresh intake.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Payload of an intake or reprocessing job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingJob {
    pub file_id: Uuid,
    /// Storage key of the artifact to process.
    pub file_path: String,
    pub file_name: String,
    /// Set when staff edited the extracted data; the allocator then trusts
    /// `parsed_data` instead of re-running the parser.
    pub manually_edited: bool,
    pub priority: Priority,
    /// Retrieved by the allocator for the edit log; defaults to the system actor.
    pub requested_by: Option<String>,
}

impl ProcessingJob {
    pub fn intake(file_id: Uuid, file_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            file_id,
            file_path: file_path.into(),
            file_name: file_name.into(),
            manually_edited: false,
            priority: Priority::Normal,
            requested_by: None,
        }
    }

    pub fn reprocess(
        file_id: Uuid,
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            file_id,
            file_path: file_path.into(),
            file_name: file_name.into(),
            manually_edited: true,
            priority: Priority::High,
            requested_by: Some(requested_by.into()),
        }
    }

    /// Keyed by file, not by job, so the same artifact is never processed twice at once.
    pub fn idempotency_key(&self) -> String {
        format!("file:{}", self.file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_priority_orders_above_normal() {
        assert!(Priority::High > Priority::Normal);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn key_is_stable_per_file() {
        let id = Uuid::new_v4();
        let a = ProcessingJob::intake(id, "unprocessed/a.pdf", "a.pdf");
        let b = ProcessingJob::reprocess(id, "unprocessed/a.pdf", "a.pdf", "staff");
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_eq!(b.priority, Priority::High);
        assert!(b.manually_edited);
    }
}
