//! Test helpers: wire the full pipeline over in-memory repositories and local storage.
//!
//! Run from workspace root: `cargo test -p docintake-services`.

#![allow(dead_code)]

pub mod fixtures;

use async_trait::async_trait;
use docintake_core::models::{FileRecord, ParsedFields, SettingsSnapshot};
use docintake_core::QueueConfig;
use docintake_db::{
    InMemoryCompanyDirectory, InMemoryDocumentRepository, InMemoryFileRepository,
    InMemorySessionStore, InMemorySettingsStore,
};
use docintake_services::{
    AccessFilter, BulkAllocationRunner, DocumentAllocator, IntakeGate, MatchingEngine,
    Notifier, NotifyError, ParseError, Parser, RemediationService, RetentionReaper,
    SettingsCache, Sha256Hasher,
};
use docintake_storage::LocalStorage;
use docintake_worker::{JobHandler, ProcessingQueue};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Parser that reads uploads as JSON field maps.
///
/// `set_broken(true)` makes every parse fail; `gate()` blocks parses until the test adds
/// permits to the returned semaphore.
#[derive(Default)]
pub struct MockParser {
    calls: AtomicUsize,
    broken: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockParser {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl Parser for MockParser {
    async fn parse(&self, _file_name: &str, content: &[u8]) -> Result<ParsedFields, ParseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.broken.load(Ordering::SeqCst) {
            return Err(ParseError::Extraction("unreadable text layer".to_string()));
        }
        let value: Value = serde_json::from_slice(content)
            .map_err(|e| ParseError::Extraction(e.to_string()))?;
        Ok(ParsedFields::from_value_lossy(value))
    }
}

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub template: String,
    pub recipients: Vec<String>,
    pub context: Value,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_with(&self, template: &str) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.template == template)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        template: &str,
        recipients: &[String],
        context: &Value,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentNotification {
            template: template.to_string(),
            recipients: recipients.to_vec(),
            context: context.clone(),
        });
        Ok(())
    }
}

/// The whole pipeline plus handles to its in-memory state.
pub struct TestPipeline {
    pub files: InMemoryFileRepository,
    pub documents: InMemoryDocumentRepository,
    pub companies: InMemoryCompanyDirectory,
    pub sessions: InMemorySessionStore,
    pub storage: Arc<LocalStorage>,
    pub parser: Arc<MockParser>,
    pub notifier: Arc<RecordingNotifier>,
    pub settings: Arc<SettingsCache>,
    pub allocator: Arc<DocumentAllocator>,
    pub queue: ProcessingQueue,
    pub intake: IntakeGate,
    pub remediation: RemediationService,
    pub reaper: RetentionReaper,
    pub access: AccessFilter,
    pub _temp_dir: TempDir,
}

pub fn test_queue_config() -> QueueConfig {
    QueueConfig {
        max_workers: 2,
        max_attempts: 3,
        backoff_base_secs: 0,
        poll_interval_ms: 10,
        job_timeout_secs: 5,
    }
}

pub async fn setup_pipeline(retention: SettingsSnapshot) -> TestPipeline {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = Arc::new(
        LocalStorage::new(temp_dir.path())
            .await
            .expect("Failed to create local storage"),
    );

    let files = InMemoryFileRepository::new();
    let documents = InMemoryDocumentRepository::new();
    let companies = InMemoryCompanyDirectory::new();
    let sessions = InMemorySessionStore::new();
    let parser = Arc::new(MockParser::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let settings = Arc::new(SettingsCache::new(
        Arc::new(InMemorySettingsStore::new()),
        Arc::new(documents.clone()),
        retention,
    ));

    let allocator = Arc::new(DocumentAllocator::new(
        Arc::new(files.clone()),
        Arc::new(documents.clone()),
        MatchingEngine::new(Arc::new(companies.clone())),
        parser.clone(),
        storage.clone(),
        settings.clone(),
        notifier.clone(),
    ));

    let handler: Arc<dyn JobHandler> = allocator.clone();
    let queue = ProcessingQueue::new(test_queue_config(), Arc::downgrade(&handler));

    let intake = IntakeGate::new(
        Arc::new(Sha256Hasher),
        Arc::new(files.clone()),
        storage.clone(),
        queue.clone(),
    );

    let runner = BulkAllocationRunner::new(
        allocator.clone(),
        Arc::new(files.clone()),
        Arc::new(sessions.clone()),
    );
    let remediation = RemediationService::new(
        Arc::new(files.clone()),
        Arc::new(sessions.clone()),
        queue.clone(),
        runner,
        Duration::from_secs(3600),
    );

    let reaper = RetentionReaper::new(
        Arc::new(documents.clone()),
        Arc::new(files.clone()),
        Arc::new(companies.clone()),
        storage.clone(),
        settings.clone(),
        notifier.clone(),
    );

    let access = AccessFilter::new(Arc::new(companies.clone()), Arc::new(documents.clone()));

    TestPipeline {
        files,
        documents,
        companies,
        sessions,
        storage,
        parser,
        notifier,
        settings,
        allocator,
        queue,
        intake,
        remediation,
        reaper,
        access,
        _temp_dir: temp_dir,
    }
}

impl TestPipeline {
    /// Ingest and wait for the queue to drain. Returns the intake file row.
    pub async fn upload(&self, content: &[u8], file_name: &str) -> FileRecord {
        let outcome = self
            .intake
            .ingest(content, file_name, Some("uploader@example.com"))
            .await
            .expect("Failed to ingest upload");
        self.queue.wait_until_idle().await;
        self.file(outcome.file().id).await
    }

    pub async fn file(&self, id: Uuid) -> FileRecord {
        use docintake_db::FileRepository;
        self.files
            .get(id)
            .await
            .expect("Failed to load file")
            .expect("File row missing")
    }

    pub async fn physical_exists(&self, key: &str) -> bool {
        use docintake_storage::Storage;
        self.storage.exists(key).await.expect("Failed to check storage")
    }

    /// Wait for detached notification tasks.
    pub async fn wait_for_notifications(&self, count: usize) {
        let notifier = self.notifier.clone();
        eventually(move || {
            let notifier = notifier.clone();
            async move { notifier.sent().len() >= count }
        })
        .await;
    }
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not met within 5 seconds"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
