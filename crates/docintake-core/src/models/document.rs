use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// The canonical document variants. All three share one lifecycle contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
    Statement,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Invoice,
        DocumentKind::CreditNote,
        DocumentKind::Statement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::CreditNote => "credit_note",
            DocumentKind::Statement => "statement",
        }
    }

    /// Directory segment used in the processed-area layout.
    pub fn storage_dir(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoices",
            DocumentKind::CreditNote => "credit_notes",
            DocumentKind::Statement => "statements",
        }
    }

    /// Classify from a parser-declared type. Any mention of "credit" wins, then
    /// "statement"; everything else is an invoice.
    pub fn classify(declared_type: Option<&str>) -> Self {
        let declared = declared_type.unwrap_or_default().to_lowercase();
        if declared.contains("credit") {
            DocumentKind::CreditNote
        } else if declared.contains("statement") {
            DocumentKind::Statement
        } else {
            DocumentKind::Invoice
        }
    }
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(DocumentKind::Invoice),
            "credit_note" => Ok(DocumentKind::CreditNote),
            "statement" => Ok(DocumentKind::Statement),
            _ => Err(anyhow::anyhow!("Invalid document kind: {}", s)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Ready,
    Review,
    Viewed,
    Downloaded,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Ready => "ready",
            DocumentStatus::Review => "review",
            DocumentStatus::Viewed => "viewed",
            DocumentStatus::Downloaded => "downloaded",
        }
    }
}

impl Display for DocumentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(DocumentStatus::Ready),
            "review" => Ok(DocumentStatus::Review),
            "viewed" => Ok(DocumentStatus::Viewed),
            "downloaded" => Ok(DocumentStatus::Downloaded),
            _ => Err(anyhow::anyhow!("Invalid document status: {}", s)),
        }
    }
}

/// An invoice, credit note or statement owned by exactly one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub kind: DocumentKind,
    /// Unique per company among live documents.
    pub document_number: String,
    pub company_id: Uuid,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    /// Storage key of the processed physical file.
    pub file_url: String,
    pub status: DocumentStatus,
    pub source_file_id: Option<Uuid>,
    pub retention_start_date: Option<DateTime<Utc>>,
    pub retention_expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.retention_expiry_date
            .map(|expiry| expiry <= now)
            .unwrap_or(false)
    }
}

/// Values required to insert a document row.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub document_number: String,
    pub company_id: Uuid,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub file_url: String,
    pub status: DocumentStatus,
    pub source_file_id: Option<Uuid>,
    pub retention_start_date: Option<DateTime<Utc>>,
    pub retention_expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_keyword_anywhere_routes_to_credit_note() {
        assert_eq!(
            DocumentKind::classify(Some("Tax Credit Memo")),
            DocumentKind::CreditNote
        );
        assert_eq!(
            DocumentKind::classify(Some("CREDIT")),
            DocumentKind::CreditNote
        );
        assert_eq!(
            DocumentKind::classify(Some("Monthly statement")),
            DocumentKind::Statement
        );
        assert_eq!(DocumentKind::classify(Some("Tax invoice")), DocumentKind::Invoice);
        assert_eq!(DocumentKind::classify(None), DocumentKind::Invoice);
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4(),
            kind: DocumentKind::Invoice,
            document_number: "INV-1".to_string(),
            company_id: Uuid::new_v4(),
            issue_date: now.date_naive(),
            due_date: None,
            amount: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            file_url: "processed/invoices/2026/10/18/INV-1_scan.pdf".to_string(),
            status: DocumentStatus::Ready,
            source_file_id: None,
            retention_start_date: None,
            retention_expiry_date: Some(now),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(doc.is_expired_at(now));
        assert!(!doc.is_expired_at(now - chrono::Duration::seconds(1)));
    }
}
