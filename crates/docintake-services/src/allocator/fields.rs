//! Defensive conversion of extracted values.
//!
//! Dates and amounts come from OCR-grade text. A bad value is replaced with a default
//! rather than failing an otherwise valid allocation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Accepted date layouts, tried in order. Day-first wins over month-first.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d", "%m/%d/%Y", "%d %b %Y",
    "%d %B %Y", "%b %d, %Y", "%B %d, %Y", "%d/%m/%y",
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Issue date, or today when absent or unparseable.
pub fn issue_date_or_today(raw: Option<&str>, now: DateTime<Utc>) -> NaiveDate {
    match raw.map(|r| (r, parse_date(r))) {
        Some((_, Some(date))) => date,
        Some((raw, None)) => {
            tracing::warn!(raw = %raw, "Unparseable issue date, using today");
            now.date_naive()
        }
        None => now.date_naive(),
    }
}

/// Amount from a JSON number or a numeric string with currency noise, else zero.
pub fn parse_amount(value: Option<&Value>) -> Decimal {
    let parsed = match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
                .collect();
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    };

    match (parsed, value) {
        (Some(amount), _) => amount,
        (None, Some(Value::Null) | None) => Decimal::ZERO,
        (None, Some(other)) => {
            tracing::warn!(raw = %other, "Non-numeric amount, using 0");
            Decimal::ZERO
        }
    }
}

/// Document number used when the parser found none: `AUTO-{upload time}-{hash prefix}`.
/// Derived from the file so retries produce the same number.
pub fn synthesize_document_number(uploaded_at: DateTime<Utc>, content_hash: &str) -> String {
    let fragment: String = content_hash.chars().take(8).collect();
    format!(
        "AUTO-{}-{}",
        uploaded_at.format("%Y%m%d%H%M%S"),
        fragment.to_uppercase()
    )
}
