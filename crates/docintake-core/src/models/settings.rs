//! Retention policy snapshot.
//!
//! Settings are captured once per job or run and passed in explicitly; nothing reads
//! a process-wide cache mid-operation.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::document::DocumentKind;

/// Longest accepted retention period, about a century.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Which date the retention period counts from.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTrigger {
    #[default]
    UploadDate,
    InvoiceDate,
}

impl Display for RetentionTrigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RetentionTrigger::UploadDate => f.write_str("upload_date"),
            RetentionTrigger::InvoiceDate => f.write_str("invoice_date"),
        }
    }
}

impl FromStr for RetentionTrigger {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "upload_date" => Ok(RetentionTrigger::UploadDate),
            "invoice_date" => Ok(RetentionTrigger::InvoiceDate),
            _ => Err(anyhow::anyhow!("Invalid retention trigger: {}", s)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// `None` disables retention deletion for the document type.
    pub period_days: Option<u32>,
    pub trigger: RetentionTrigger,
}

/// Start and expiry dates computed for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDates {
    pub start: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
}

impl RetentionPolicy {
    pub fn days(period_days: u32, trigger: RetentionTrigger) -> Self {
        Self {
            period_days: Some(period_days),
            trigger,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.period_days.is_some()
    }

    /// Start is the upload (creation) instant or midnight UTC of the issue date.
    pub fn compute(&self, created_at: DateTime<Utc>, issue_date: NaiveDate) -> RetentionDates {
        let start = match self.trigger {
            RetentionTrigger::UploadDate => created_at,
            RetentionTrigger::InvoiceDate => issue_date.and_time(chrono::NaiveTime::MIN).and_utc(),
        };
        RetentionDates {
            start: Some(start),
            // an expiry past the representable range never comes
            expiry: self
                .period_days
                .and_then(|days| Duration::try_days(i64::from(days)))
                .and_then(|period| start.checked_add_signed(period)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub invoice_retention: RetentionPolicy,
    pub credit_note_retention: RetentionPolicy,
    pub statement_retention: RetentionPolicy,
}

impl SettingsSnapshot {
    /// Same policy for every document type.
    pub fn uniform(policy: RetentionPolicy) -> Self {
        Self {
            invoice_retention: policy,
            credit_note_retention: policy,
            statement_retention: policy,
        }
    }

    pub fn retention_for(&self, kind: DocumentKind) -> RetentionPolicy {
        match kind {
            DocumentKind::Invoice => self.invoice_retention,
            DocumentKind::CreditNote => self.credit_note_retention,
            DocumentKind::Statement => self.statement_retention,
        }
    }

    pub fn with_retention(mut self, kind: DocumentKind, policy: RetentionPolicy) -> Self {
        match kind {
            DocumentKind::Invoice => self.invoice_retention = policy,
            DocumentKind::CreditNote => self.credit_note_retention = policy,
            DocumentKind::Statement => self.statement_retention = policy,
        }
        self
    }

    /// Document types whose policy differs between `self` and `other`.
    pub fn changed_kinds(&self, other: &SettingsSnapshot) -> Vec<DocumentKind> {
        DocumentKind::ALL
            .into_iter()
            .filter(|kind| self.retention_for(*kind) != other.retention_for(*kind))
            .collect()
    }
}
