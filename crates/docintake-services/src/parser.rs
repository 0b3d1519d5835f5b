//! Field extraction from uploaded documents.
//!
//! The allocator only depends on [`Parser`]. [`PdfTextParser`] is a basic implementation
//! that pulls labelled fields out of the PDF text layer.

use async_trait::async_trait;
use docintake_core::models::ParsedFields;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
    #[error("Text extraction failed: {0}")]
    Extraction(String),
    #[error("No extractable text")]
    Empty,
}

#[async_trait]
pub trait Parser: Send + Sync {
    async fn parse(&self, file_name: &str, content: &[u8]) -> Result<ParsedFields, ParseError>;
}

static ACCOUNT_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:account|acct|customer)\s*(?:no\.?|number|#|ref(?:erence)?)?\s*[:#]?\s*([A-Z0-9][A-Z0-9\-/]*)")
        .expect("valid account regex")
});
static DOCUMENT_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:invoice|credit\s*note|statement|document)\s*(?:no\.?|number|#)\s*[:#]?\s*([A-Z0-9][A-Z0-9\-/]*)")
        .expect("valid document number regex")
});
static DOCUMENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(tax invoice|invoice|credit note|statement)\b")
        .expect("valid document type regex")
});
static ISSUE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:invoice\s*|issue\s*|statement\s*)?date\s*[:#]?\s*([0-9]{1,4}[./\-][0-9]{1,2}[./\-][0-9]{1,4})")
        .expect("valid date regex")
});
static DUE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:due\s*date|payment\s*due)\s*[:#]?\s*([0-9]{1,4}[./\-][0-9]{1,2}[./\-][0-9]{1,4})")
        .expect("valid due date regex")
});
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(sub\s*total|net|vat|tax|total)\b[^0-9\-\n]*(-?[0-9][0-9,]*(?:\.[0-9]+)?)")
        .expect("valid amount regex")
});

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Labelled fields from plain text. Unknown labels are ignored.
pub fn extract_fields(text: &str) -> ParsedFields {
    let mut fields = ParsedFields {
        document_type: capture(&DOCUMENT_TYPE, text),
        account_number: capture(&ACCOUNT_NUMBER, text),
        document_number: capture(&DOCUMENT_NUMBER, text),
        date: capture(&ISSUE_DATE, text),
        due_date: capture(&DUE_DATE, text),
        ..Default::default()
    };

    for caps in AMOUNT.captures_iter(text) {
        let label = caps[1].to_lowercase().replace(char::is_whitespace, "");
        let value = Value::String(caps[2].replace(',', ""));
        let slot = match label.as_str() {
            "subtotal" | "net" => &mut fields.amount,
            "vat" | "tax" => &mut fields.vat_amount,
            "total" => &mut fields.total_amount,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fields
}

fn looks_like_pdf(file_name: &str, content: &[u8]) -> bool {
    content.starts_with(b"%PDF") || file_name.to_lowercase().ends_with(".pdf")
}

/// Parser over the PDF text layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextParser;

#[async_trait]
impl Parser for PdfTextParser {
    async fn parse(&self, file_name: &str, content: &[u8]) -> Result<ParsedFields, ParseError> {
        if !looks_like_pdf(file_name, content) {
            return Err(ParseError::Unsupported(file_name.to_string()));
        }

        let bytes = content.to_vec();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ParseError::Extraction(e.to_string()))?
            .map_err(|e| ParseError::Extraction(e.to_string()))?;

        let text = text.trim();
        if text.is_empty() {
            tracing::warn!(file_name = %file_name, "PDF text extraction returned empty");
            return Err(ParseError::Empty);
        }
        tracing::debug!(file_name = %file_name, text_len = text.len(), "PDF text extracted");

        Ok(extract_fields(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "ACME SUPPLIES\n\
        Tax Invoice\n\
        Invoice No: INV-2026-0042\n\
        Account Number: 00045\n\
        Invoice Date: 14/03/2026\n\
        Due Date: 13/04/2026\n\
        Subtotal 1,200.00\n\
        VAT 240.00\n\
        Total 1,440.00\n";

    #[test]
    fn extracts_labelled_fields() {
        let fields = extract_fields(SAMPLE);
        assert_eq!(fields.document_type.as_deref(), Some("Tax Invoice"));
        assert_eq!(fields.document_number.as_deref(), Some("INV-2026-0042"));
        assert_eq!(fields.account_number.as_deref(), Some("00045"));
        assert_eq!(fields.date.as_deref(), Some("14/03/2026"));
        assert_eq!(fields.due_date.as_deref(), Some("13/04/2026"));
        assert_eq!(fields.amount, Some(json!("1200.00")));
        assert_eq!(fields.vat_amount, Some(json!("240.00")));
        assert_eq!(fields.total_amount, Some(json!("1440.00")));
    }

    #[test]
    fn credit_note_type_is_detected() {
        let fields = extract_fields("Credit Note\nCredit Note No: CN-9\n");
        assert_eq!(fields.document_type.as_deref(), Some("Credit Note"));
        assert_eq!(fields.document_number.as_deref(), Some("CN-9"));
        assert!(fields.account_number.is_none());
    }

    #[tokio::test]
    async fn rejects_non_pdf_upload() {
        let err = PdfTextParser
            .parse("remittance.xlsx", b"PK\x03\x04")
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Unsupported(_)));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_an_extraction_error() {
        let err = PdfTextParser
            .parse("broken.pdf", b"%PDF-1.4 truncated")
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Extraction(_)));
    }
}
