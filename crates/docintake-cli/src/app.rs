//! Service wiring shared by every subcommand.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use docintake_core::Config;
use docintake_db::{
    connect, run_migrations, AllocationSessionStore, CompanyDirectory, DocumentRepository,
    FileRepository, InMemoryCompanyDirectory, InMemoryDocumentRepository, InMemoryFileRepository,
    InMemorySessionStore, InMemorySettingsStore, PgCompanyDirectory, PgDocumentRepository,
    PgFileRepository, PgSettingsStore, SettingsStore,
};
use docintake_services::{
    notifier_from_config, BulkAllocationRunner, DocumentAllocator, IntakeGate, MatchingEngine,
    PdfTextParser, RemediationService, RetentionReaper, SettingsCache, Sha256Hasher,
};
use docintake_storage::LocalStorage;
use docintake_worker::{JobHandler, ProcessingQueue};

struct Repositories {
    files: Arc<dyn FileRepository>,
    documents: Arc<dyn DocumentRepository>,
    companies: Arc<dyn CompanyDirectory>,
    settings: Arc<dyn SettingsStore>,
}

async fn repositories(config: &Config) -> anyhow::Result<Repositories> {
    match &config.database_url {
        Some(url) => {
            let pool = connect(url, config.db_max_connections).await?;
            run_migrations(&pool).await?;
            Ok(Repositories {
                files: Arc::new(PgFileRepository::new(pool.clone())),
                documents: Arc::new(PgDocumentRepository::new(pool.clone())),
                companies: Arc::new(PgCompanyDirectory::new(pool.clone())),
                settings: Arc::new(PgSettingsStore::new(pool)),
            })
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory repositories; state is lost on exit");
            Ok(Repositories {
                files: Arc::new(InMemoryFileRepository::new()),
                documents: Arc::new(InMemoryDocumentRepository::new()),
                companies: Arc::new(InMemoryCompanyDirectory::new()),
                settings: Arc::new(InMemorySettingsStore::new()),
            })
        }
    }
}

pub struct App {
    pub config: Config,
    pub files: Arc<dyn FileRepository>,
    pub queue: ProcessingQueue,
    pub intake: IntakeGate,
    pub remediation: RemediationService,
    pub reaper: Arc<RetentionReaper>,
    // keeps the queue's job handler alive
    _allocator: Arc<DocumentAllocator>,
}

impl App {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let repos = repositories(&config).await?;

        let storage = Arc::new(
            LocalStorage::new(&config.storage_path)
                .await
                .with_context(|| format!("Failed to open storage at {}", config.storage_path))?,
        );
        let notifier = notifier_from_config(&config.smtp);
        let settings = Arc::new(SettingsCache::new(
            repos.settings.clone(),
            repos.documents.clone(),
            config.retention_snapshot(),
        ));

        let allocator = Arc::new(DocumentAllocator::new(
            repos.files.clone(),
            repos.documents.clone(),
            MatchingEngine::new(repos.companies.clone()),
            Arc::new(PdfTextParser),
            storage.clone(),
            settings.clone(),
            notifier.clone(),
        ));
        let handler: Arc<dyn JobHandler> = allocator.clone();
        let queue = ProcessingQueue::new(config.queue.clone(), Arc::downgrade(&handler));

        let intake = IntakeGate::new(
            Arc::new(Sha256Hasher),
            repos.files.clone(),
            storage.clone(),
            queue.clone(),
        );

        // bulk sessions are ephemeral and live in process memory
        let sessions: Arc<dyn AllocationSessionStore> = Arc::new(InMemorySessionStore::new());
        let remediation = RemediationService::new(
            repos.files.clone(),
            sessions.clone(),
            queue.clone(),
            BulkAllocationRunner::new(allocator.clone(), repos.files.clone(), sessions),
            Duration::from_secs(config.allocation_session_ttl_secs),
        );

        let reaper = Arc::new(RetentionReaper::new(
            repos.documents.clone(),
            repos.files.clone(),
            repos.companies.clone(),
            storage,
            settings,
            notifier,
        ));

        Ok(Self {
            config,
            files: repos.files,
            queue,
            intake,
            remediation,
            reaper,
            _allocator: allocator,
        })
    }
}
