//! Bulk remediation session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One processed file inside a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationResult {
    pub file_id: Uuid,
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSession {
    pub allocation_id: Uuid,
    pub total_files: usize,
    pub processed_files: usize,
    /// Display only.
    pub current_file: Option<String>,
    pub results: Vec<AllocationResult>,
    pub status: SessionStatus,
    pub cancel_requested: bool,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AllocationSession {
    pub fn new(total_files: usize, started_by: impl Into<String>) -> Self {
        Self {
            allocation_id: Uuid::new_v4(),
            total_files,
            processed_files: 0,
            current_file: None,
            results: Vec::new(),
            status: SessionStatus::Running,
            cancel_requested: false,
            started_by: started_by.into(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    pub fn progress_percent(&self) -> u8 {
        if self.total_files == 0 {
            return 100;
        }
        ((self.processed_files * 100) / self.total_files).min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_and_counts() {
        let mut session = AllocationSession::new(4, "staff@example.com");
        assert_eq!(session.progress_percent(), 0);
        session.results.push(AllocationResult {
            file_id: Uuid::new_v4(),
            file_name: "a.pdf".to_string(),
            success: true,
            company_id: None,
            document_id: None,
            error: None,
        });
        session.processed_files = 1;
        assert_eq!(session.progress_percent(), 25);
        assert_eq!(session.succeeded(), 1);
        assert_eq!(session.failed(), 0);
        assert!(!session.status.is_terminal());
    }

    #[test]
    fn empty_session_reports_complete_progress() {
        assert_eq!(AllocationSession::new(0, "x").progress_percent(), 100);
    }
}
