//! Docintake CLI: operator entry point for the intake pipeline.
//!
//! Configuration comes from the environment, with `.env` loaded if present. Without DATABASE_URL every
//! command runs against in-memory repositories, which is only useful for `ingest` trials.

mod app;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docintake_core::models::FileFilter;
use docintake_core::Config;
use docintake_db::FileRepository;
use docintake_infra::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use docintake_services::{BulkSelection, IntakeOutcome};

use app::App;

#[derive(Parser)]
#[command(name = "docintake", about = "Financial document intake pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files and process them
    Ingest {
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Recorded as the uploader
        #[arg(long)]
        uploaded_by: Option<String>,
    },
    /// Run queue workers and the scheduled retention reaper until Ctrl-C
    Work,
    /// Run one retention pass now
    Reap,
    /// Permanently delete documents and everything that depends on them
    Purge {
        /// Document UUIDs
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Re-run allocation for remediable files; all of them when no --file is given
    BulkAllocate {
        /// File UUID (repeatable)
        #[arg(long = "file")]
        files: Vec<Uuid>,
        /// Recorded as the allocating actor
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// List files awaiting attention
    List {
        #[arg(value_enum)]
        queue: ListQueue,
        #[arg(long, default_value = "50")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListQueue {
    Unallocated,
    Failed,
    Duplicates,
}

impl ListQueue {
    fn filter(self) -> FileFilter {
        match self {
            ListQueue::Unallocated => FileFilter::unallocated(),
            ListQueue::Failed => FileFilter::failed(),
            ListQueue::Duplicates => FileFilter::duplicates(),
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    init_telemetry(&TelemetryConfig::from_env("docintake"))
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let app = App::build(config).await?;
    let result = run(cli.command, &app).await;

    if let Err(e) = app.queue.shutdown().await {
        tracing::debug!(error = %e, "Queue already stopped");
    }
    shutdown_telemetry().await;
    result
}

async fn run(command: Commands, app: &App) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { paths, uploaded_by } => ingest(app, paths, uploaded_by).await,
        Commands::Work => work(app).await,
        Commands::Reap => {
            let summary = app.reaper.run_once(Utc::now()).await?;
            print_json(&summary)
        }
        Commands::Purge { ids } => {
            let summary = app.reaper.purge(&ids).await;
            print_json(&summary)
        }
        Commands::BulkAllocate { files, actor } => bulk_allocate(app, files, &actor).await,
        Commands::List {
            queue,
            limit,
            offset,
        } => {
            let files = app
                .remediation
                .list(&queue.filter().page(limit, offset))
                .await?;
            print_json(&files)
        }
    }
}

async fn ingest(app: &App, paths: Vec<PathBuf>, uploaded_by: Option<String>) -> anyhow::Result<()> {
    let mut accepted = Vec::new();

    for path in &paths {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        match app
            .intake
            .ingest(&content, &file_name, uploaded_by.as_deref())
            .await?
        {
            IntakeOutcome::Accepted { file, .. } => {
                println!("accepted  {}  {}", file.id, file_name);
                accepted.push(file.id);
            }
            IntakeOutcome::Duplicate { file, original_id } => {
                println!("duplicate {}  {}  (of {})", file.id, file_name, original_id);
            }
        }
    }

    app.queue.wait_until_idle().await;

    for id in accepted {
        if let Some(file) = app.files.get(id).await? {
            let reason = file
                .failure_reason
                .map(|r| r.to_string())
                .unwrap_or_default();
            println!("{}  {}  {}", file.id, file.status, reason);
        }
    }
    Ok(())
}

async fn work(app: &App) -> anyhow::Result<()> {
    let recovered = app.intake.recover_pending().await?;
    tracing::info!(recovered, "Worker started");

    let shutdown = CancellationToken::new();
    let reaper = app.reaper.clone().start(
        Duration::from_secs(app.config.retention_interval_secs),
        shutdown.clone(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    shutdown.cancel();
    app.queue.shutdown().await?;
    reaper.await.context("Retention task panicked")?;
    Ok(())
}

async fn bulk_allocate(app: &App, files: Vec<Uuid>, actor: &str) -> anyhow::Result<()> {
    let selection = if files.is_empty() {
        BulkSelection::AllRemediable
    } else {
        BulkSelection::Files(files)
    };
    let started = app.remediation.start_bulk(selection, actor).await?;
    let allocation_id = started.session.allocation_id;
    println!("session {} ({} files)", allocation_id, started.session.total_files);

    let mut handle = started.handle;
    let mut progress = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            joined = &mut handle => {
                joined.context("Bulk allocation task panicked")?;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                app.remediation.cancel(allocation_id).await?;
                println!("cancel requested, finishing current file");
            }
            _ = progress.tick() => {
                if let Some(session) = app.remediation.session(allocation_id).await? {
                    println!(
                        "{:>3}%  {}/{}  {}",
                        session.progress_percent(),
                        session.processed_files,
                        session.total_files,
                        session.current_file.unwrap_or_default()
                    );
                }
            }
        }
    }

    if let Some(session) = app.remediation.session(allocation_id).await? {
        print_json(&session)?;
    }
    Ok(())
}
