//! Storage key layout.
//!
//! - intake: `unprocessed/{file_id}_{name}`
//! - duplicates: `duplicates/{yyyy}/{mm}/{dd}/{file_id}_{name}`
//! - processed: `processed/{kind}/{yyyy}/{mm}/{dd}/{document_id}_{document_number}_{name}`
//!
//! Date partitions keep directory sizes bounded. Document numbers are only unique per
//! company, so the processed key carries the document id.

use chrono::{DateTime, Utc};
use docintake_core::models::DocumentKind;
use uuid::Uuid;

pub const INTAKE_AREA: &str = "unprocessed";
pub const DUPLICATES_AREA: &str = "duplicates";
pub const PROCESSED_AREA: &str = "processed";

/// Reduce an uploaded or extracted name to a single safe path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').replace("..", "_");
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn date_partition(at: DateTime<Utc>) -> String {
    at.format("%Y/%m/%d").to_string()
}

pub fn intake_key(file_id: Uuid, file_name: &str) -> String {
    format!("{}/{}_{}", INTAKE_AREA, file_id, sanitize_component(file_name))
}

pub fn duplicate_key(file_id: Uuid, file_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}_{}",
        DUPLICATES_AREA,
        date_partition(at),
        file_id,
        sanitize_component(file_name)
    )
}

pub fn processed_key(
    kind: DocumentKind,
    document_id: Uuid,
    document_number: &str,
    file_name: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}/{}/{}/{}_{}_{}",
        PROCESSED_AREA,
        kind.storage_dir(),
        date_partition(at),
        document_id,
        sanitize_component(document_number),
        sanitize_component(file_name)
    )
}

/// Last path component of a key or URL.
pub fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
