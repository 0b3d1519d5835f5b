mod helpers;

use chrono::{Duration, TimeZone, Utc};
use docintake_core::models::{
    DocumentKind, FileStatus, RetentionPolicy, RetentionTrigger, SettingsSnapshot,
};
use docintake_db::{DocumentRepository, FileRepository};
use docintake_services::notify::DOCUMENT_DELETED;
use helpers::fixtures::{acme, credit_note, integrated, invoice};
use helpers::{setup_pipeline, TestPipeline};
use serde_json::json;
use uuid::Uuid;

fn thirty_days() -> SettingsSnapshot {
    SettingsSnapshot::uniform(RetentionPolicy::days(30, RetentionTrigger::UploadDate))
}

async fn allocated(pipeline: &TestPipeline, bytes: &[u8], name: &str) -> (Uuid, Uuid) {
    let file = pipeline.upload(bytes, name).await;
    assert_eq!(file.status, FileStatus::Parsed);
    (file.id, file.document_id.expect("file linked to its document"))
}

/// Expiry is creation time plus the period under the upload-date trigger
#[tokio::test]
async fn test_expiry_computed_from_upload_date() {
    let pipeline = setup_pipeline(thirty_days()).await;
    pipeline.companies.insert(acme()).await;

    let (_, document_id) = allocated(&pipeline, &invoice("1001", "R-1"), "r1.pdf").await;
    let document = pipeline.documents.get(document_id).await.unwrap().unwrap();

    assert_eq!(document.retention_start_date, Some(document.created_at));
    assert_eq!(
        document.retention_expiry_date,
        Some(document.created_at + Duration::days(30))
    );
}

/// Invoice-date trigger counts from midnight UTC of the issue date
#[tokio::test]
async fn test_expiry_computed_from_invoice_date() {
    let pipeline = setup_pipeline(SettingsSnapshot::uniform(RetentionPolicy::days(
        30,
        RetentionTrigger::InvoiceDate,
    )))
    .await;
    pipeline.companies.insert(acme()).await;

    let (_, document_id) = allocated(&pipeline, &invoice("1001", "R-2"), "r2.pdf").await;
    let document = pipeline.documents.get(document_id).await.unwrap().unwrap();

    assert_eq!(
        document.retention_expiry_date,
        Some(Utc.with_ymd_and_hms(2026, 2, 14, 0, 0, 0).unwrap())
    );
}

/// Expired invoice: row, physical file and file links are gone; the hash survives
#[tokio::test]
async fn test_retention_cascade_is_complete() {
    let pipeline = setup_pipeline(thirty_days()).await;
    pipeline.companies.insert(acme()).await;
    let bytes = invoice("1001", "R-3");

    let (file_id, document_id) = allocated(&pipeline, &bytes, "r3.pdf").await;
    let document = pipeline.documents.get(document_id).await.unwrap().unwrap();
    assert!(pipeline.physical_exists(&document.file_url).await);

    // not yet expired
    let early = pipeline
        .reaper
        .run_once(Utc::now() + Duration::days(10))
        .await
        .unwrap();
    assert_eq!(early.deleted, 0);

    let summary = pipeline
        .reaper
        .run_once(Utc::now() + Duration::days(31))
        .await
        .unwrap();
    assert_eq!(summary.expired, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.physical_deleted, 1);
    assert_eq!(summary.files_soft_deleted, 1);
    assert_eq!(summary.notifications, 1);

    assert!(pipeline.documents.get(document_id).await.unwrap().is_none());
    assert!(!pipeline.physical_exists(&document.file_url).await);

    let file = pipeline.file(file_id).await;
    assert!(file.is_deleted());
    assert!(!file.content_hash.is_empty());
    assert!(pipeline
        .files
        .list_live_parsed()
        .await
        .unwrap()
        .iter()
        .all(|f| f.document_id != Some(document_id)));
    assert!(pipeline
        .files
        .find_by_document(document_id)
        .await
        .unwrap()
        .is_empty());

    pipeline.wait_for_notifications(2).await;
    let deleted = pipeline.notifier.sent_with(DOCUMENT_DELETED);
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].context["document_number"], json!("R-3"));

    // the same bytes are still recognised after the cascade
    let again = pipeline.intake.ingest(&bytes, "r3.pdf", None).await.unwrap();
    assert!(again.is_duplicate());
}

/// Documents soft-deleted earlier are still hard-deleted when they expire
#[tokio::test]
async fn test_soft_deleted_documents_are_reaped() {
    let pipeline = setup_pipeline(thirty_days()).await;
    pipeline.companies.insert(integrated()).await;

    let (_, document_id) = allocated(&pipeline, &invoice("2002", "R-4"), "r4.pdf").await;
    assert!(pipeline.documents.soft_delete(document_id).await.unwrap());

    let summary = pipeline
        .reaper
        .run_once(Utc::now() + Duration::days(31))
        .await
        .unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.notifications, 0);
    assert!(pipeline.documents.get(document_id).await.unwrap().is_none());
}

/// A null period disables deletion; only the enabled document type is reaped
#[tokio::test]
async fn test_disabled_policy_deletes_nothing() {
    let pipeline = setup_pipeline(thirty_days()).await;
    pipeline.companies.insert(acme()).await;

    let (_, invoice_id) = allocated(&pipeline, &invoice("1001", "R-5"), "r5.pdf").await;
    let (_, credit_id) = allocated(&pipeline, &credit_note("1001", "CN-5"), "cn5.pdf").await;

    let recomputed = pipeline
        .settings
        .update(thirty_days().with_retention(DocumentKind::Invoice, RetentionPolicy::disabled()))
        .await
        .unwrap();
    assert_eq!(recomputed, vec![(DocumentKind::Invoice, 1)]);

    let invoice_doc = pipeline.documents.get(invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice_doc.retention_expiry_date, None);

    let summary = pipeline
        .reaper
        .run_once(Utc::now() + Duration::days(365))
        .await
        .unwrap();
    assert_eq!(summary.deleted, 1);
    assert!(pipeline.documents.get(invoice_id).await.unwrap().is_some());
    assert!(pipeline.documents.get(credit_id).await.unwrap().is_none());

    pipeline
        .settings
        .update(SettingsSnapshot::uniform(RetentionPolicy::disabled()))
        .await
        .unwrap();
    let disabled = pipeline
        .reaper
        .run_once(Utc::now() + Duration::days(3650))
        .await
        .unwrap();
    assert_eq!(disabled, Default::default());
}

/// Purge runs the cascade for chosen ids and counts unknown ones as failures
#[tokio::test]
async fn test_purge_reports_counts() {
    let pipeline = setup_pipeline(SettingsSnapshot::uniform(RetentionPolicy::disabled())).await;
    pipeline.companies.insert(acme()).await;

    let (file_id, document_id) = allocated(&pipeline, &invoice("1001", "P-1"), "p1.pdf").await;

    let summary = pipeline.reaper.purge(&[document_id, Uuid::new_v4()]).await;

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 1);
    assert!(pipeline.documents.get(document_id).await.unwrap().is_none());
    assert!(pipeline.file(file_id).await.is_deleted());
}

/// Parsed files whose document vanished are soft-deleted by the sweep
#[tokio::test]
async fn test_orphan_sweep() {
    let pipeline = setup_pipeline(SettingsSnapshot::uniform(RetentionPolicy::disabled())).await;
    pipeline.companies.insert(acme()).await;

    let (orphan_id, orphan_doc) = allocated(&pipeline, &invoice("1001", "O-1"), "o1.pdf").await;
    let (kept_id, _) = allocated(&pipeline, &invoice("1001", "O-2"), "o2.pdf").await;
    assert!(pipeline.documents.hard_delete(orphan_doc).await.unwrap());

    assert_eq!(pipeline.reaper.sweep_orphans().await.unwrap(), 1);

    let orphan = pipeline.file(orphan_id).await;
    assert!(orphan.is_deleted());
    assert!(!orphan.content_hash.is_empty());
    assert!(!pipeline.file(kept_id).await.is_deleted());

    assert_eq!(pipeline.reaper.sweep_orphans().await.unwrap(), 0);
}

/// Two companies with the same invoice number and upload name keep separate files, and
/// purging one leaves the other's row and bytes alone
#[tokio::test]
async fn test_purge_leaves_other_company_with_same_number_untouched() {
    use docintake_storage::Storage;

    let pipeline = setup_pipeline(SettingsSnapshot::uniform(RetentionPolicy::disabled())).await;
    pipeline.companies.insert(acme()).await;
    pipeline.companies.insert(integrated()).await;

    let acme_bytes = invoice("1001", "INV-1");
    let bolt_bytes = invoice("2002", "INV-1");
    let (_, acme_doc) = allocated(&pipeline, &acme_bytes, "scan.pdf").await;
    let (bolt_file, bolt_doc) = allocated(&pipeline, &bolt_bytes, "scan.pdf").await;

    let acme_url = pipeline.documents.get(acme_doc).await.unwrap().unwrap().file_url;
    let bolt_url = pipeline.documents.get(bolt_doc).await.unwrap().unwrap().file_url;
    assert_ne!(acme_url, bolt_url);
    assert_eq!(pipeline.storage.read(&acme_url).await.unwrap(), acme_bytes);
    assert_eq!(pipeline.storage.read(&bolt_url).await.unwrap(), bolt_bytes);

    let summary = pipeline.reaper.purge(&[acme_doc]).await;
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.files_soft_deleted, 1);
    assert_eq!(summary.physical_deleted, 1);

    let bolt = pipeline.file(bolt_file).await;
    assert!(!bolt.is_deleted());
    assert_eq!(bolt.status, FileStatus::Parsed);
    assert_eq!(bolt.document_id, Some(bolt_doc));
    assert!(!pipeline.physical_exists(&acme_url).await);
    assert_eq!(pipeline.storage.read(&bolt_url).await.unwrap(), bolt_bytes);
}

/// A linked file whose path drifted from the document's is still cleaned up, keeping its hash
#[tokio::test]
async fn test_cascade_follows_link_when_paths_disagree() {
    let pipeline = setup_pipeline(SettingsSnapshot::uniform(RetentionPolicy::disabled())).await;
    pipeline.companies.insert(acme()).await;
    let bytes = invoice("1001", "D-1");

    let (file_id, document_id) = allocated(&pipeline, &bytes, "d1.pdf").await;
    let moved_to = pipeline.file(file_id).await.storage_path;
    pipeline
        .documents
        .set_file_url(document_id, "unprocessed/stale_d1.pdf")
        .await
        .unwrap();

    let summary = pipeline.reaper.purge(&[document_id]).await;
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.physical_deleted, 1);
    assert_eq!(summary.files_soft_deleted, 1);
    assert_eq!(summary.files_hard_deleted, 0);

    let file = pipeline.file(file_id).await;
    assert!(file.is_deleted());
    assert!(!file.content_hash.is_empty());
    assert!(!pipeline.physical_exists(&moved_to).await);

    let again = pipeline.intake.ingest(&bytes, "d1.pdf", None).await.unwrap();
    assert!(again.is_duplicate());
}
