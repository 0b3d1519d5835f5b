//! Processing queue: submission, worker pool, retry with backoff.
//!
//! Jobs live in memory only. Files left `pending` by a crash are re-submitted at startup
//! by the intake service, so the queue itself keeps no durable state.
//!
//! Shutdown: [`ProcessingQueue::shutdown`] stops the pool and rejects new submissions; it
//! does not wait for running jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tokio::time::{sleep, timeout, Instant};

use docintake_core::models::ProcessingJob;
use docintake_core::{AppError, QueueConfig};

use crate::context::JobHandler;
use crate::pending::{Admission, PendingJobs, QueuedJob};

/// Upper bound on the delay before a retry.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt - 1)`, capped.
#[inline]
pub(crate) fn compute_retry_backoff_seconds(base_secs: u64, attempt: u32) -> u64 {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    base_secs.saturating_mul(factor).min(MAX_RETRY_BACKOFF_SECS)
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued,
    /// Same key already waiting at the same or a higher tier.
    AlreadyQueued,
    /// Same key was waiting at a lower tier; it now carries the new payload and tier.
    Upgraded,
    /// Same key is being processed right now.
    InFlight,
    /// Same key is being processed right now; this high-tier job runs once that attempt ends.
    Deferred,
}

impl From<Admission> for SubmitOutcome {
    fn from(admission: Admission) -> Self {
        match admission {
            Admission::Enqueued => SubmitOutcome::Enqueued,
            Admission::AlreadyQueued => SubmitOutcome::AlreadyQueued,
            Admission::Upgraded => SubmitOutcome::Upgraded,
            Admission::InFlight => SubmitOutcome::InFlight,
            Admission::Deferred => SubmitOutcome::Deferred,
        }
    }
}

struct Shared {
    pending: Mutex<PendingJobs>,
    wake: Notify,
    accepting: AtomicBool,
}

#[derive(Clone)]
pub struct ProcessingQueue {
    shared: Arc<Shared>,
    config: QueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl ProcessingQueue {
    /// Create the queue and start its worker pool on the current runtime.
    pub fn new(config: QueueConfig, handler: Weak<dyn JobHandler>) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingJobs::new()),
            wake: Notify::new(),
            accepting: AtomicBool::new(true),
        });

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        tokio::spawn(worker_pool(
            shared.clone(),
            config.clone(),
            semaphore,
            handler,
            shutdown_rx,
        ));

        tracing::info!(
            max_workers = config.max_workers,
            max_attempts = config.max_attempts,
            "Processing queue started"
        );

        Self {
            shared,
            config,
            shutdown_tx,
        }
    }

    #[tracing::instrument(skip(self, job), fields(file_id = %job.file_id, priority = %job.priority))]
    pub async fn submit(&self, job: ProcessingJob) -> Result<SubmitOutcome, AppError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(AppError::QueueUnavailable(
                "processing queue is shut down".to_string(),
            ));
        }

        let outcome: SubmitOutcome = self
            .shared
            .pending
            .lock()
            .await
            .admit(job, Instant::now())
            .into();

        match outcome {
            SubmitOutcome::Enqueued | SubmitOutcome::Upgraded => {
                tracing::debug!(outcome = ?outcome, "Job admitted");
                self.shared.wake.notify_one();
            }
            SubmitOutcome::Deferred => {
                tracing::debug!(outcome = ?outcome, "Job parked behind the running attempt");
            }
            SubmitOutcome::AlreadyQueued | SubmitOutcome::InFlight => {
                tracing::debug!(outcome = ?outcome, "Job coalesced with existing work");
            }
        }

        Ok(outcome)
    }

    pub async fn waiting_len(&self) -> usize {
        self.shared.pending.lock().await.waiting_len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.shared.pending.lock().await.in_flight_len()
    }

    pub async fn is_idle(&self) -> bool {
        let pending = self.shared.pending.lock().await;
        pending.waiting_len() == 0 && pending.in_flight_len() == 0
    }

    /// Resolve once nothing is waiting or running, including scheduled retries.
    pub async fn wait_until_idle(&self) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        while !self.is_idle().await {
            sleep(poll_interval).await;
        }
    }

    /// Stop the worker pool and reject further submissions.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| AppError::QueueUnavailable("worker pool already stopped".to_string()))?;
        Ok(())
    }
}

async fn worker_pool(
    shared: Arc<Shared>,
    config: QueueConfig,
    semaphore: Arc<Semaphore>,
    handler: Weak<dyn JobHandler>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Processing queue shutting down");
                break;
            }
            _ = shared.wake.notified() => {
                dispatch_ready(&shared, &config, &semaphore, &handler).await;
            }
            _ = sleep(poll_interval) => {
                // picks up retries whose backoff elapsed
                dispatch_ready(&shared, &config, &semaphore, &handler).await;
            }
        }
    }
}

/// Hand ready jobs to workers until either runs out.
async fn dispatch_ready(
    shared: &Arc<Shared>,
    config: &QueueConfig,
    semaphore: &Arc<Semaphore>,
    handler: &Weak<dyn JobHandler>,
) {
    loop {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let Some(queued) = shared.pending.lock().await.take_ready(Instant::now()) else {
            return;
        };

        let shared = shared.clone();
        let config = config.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let _permit = permit;
            run_attempt(&shared, &config, handler, queued).await;
            // a slot just freed up
            shared.wake.notify_one();
        });
    }
}

async fn run_attempt(
    shared: &Shared,
    config: &QueueConfig,
    handler: Weak<dyn JobHandler>,
    queued: QueuedJob,
) {
    let key = queued.job.idempotency_key();
    let job = &queued.job;

    let Some(handler) = handler.upgrade() else {
        tracing::error!(file_id = %job.file_id, "Job handler dropped, discarding job");
        shared.pending.lock().await.finish(&key, None, Instant::now());
        return;
    };

    tracing::info!(
        file_id = %job.file_id,
        attempt = queued.attempt,
        priority = %job.priority,
        manually_edited = job.manually_edited,
        "Processing job"
    );

    let started = std::time::Instant::now();
    let timeout_duration = Duration::from_secs(config.job_timeout_secs);
    // the handler runs in its own task so a panic surfaces as a join error here
    let mut attempt = {
        let handler = handler.clone();
        let job = queued.job.clone();
        tokio::spawn(async move { handler.handle(&job).await })
    };
    let failure = match timeout(timeout_duration, &mut attempt).await {
        Ok(Ok(Ok(()))) => {
            tracing::info!(
                file_id = %job.file_id,
                attempt = queued.attempt,
                duration_ms = started.elapsed().as_millis() as u64,
                "Job completed"
            );
            None
        }
        Ok(Ok(Err(e))) => Some((format!("{:#}", e.inner()), e.is_recoverable())),
        Ok(Err(join_error)) => Some((format!("job panicked: {}", join_error), true)),
        Err(_) => {
            attempt.abort();
            Some((
                format!("job timed out after {} seconds", config.job_timeout_secs),
                true,
            ))
        }
    };

    let retry = match failure {
        None => None,
        Some((error, true)) if queued.attempt < config.max_attempts => {
            let backoff = compute_retry_backoff_seconds(config.backoff_base_secs, queued.attempt);
            tracing::warn!(
                file_id = %job.file_id,
                attempt = queued.attempt,
                max_attempts = config.max_attempts,
                backoff_secs = backoff,
                error = %error,
                "Job failed, scheduling retry"
            );
            Some(QueuedJob {
                job: queued.job.clone(),
                attempt: queued.attempt + 1,
                ready_at: Instant::now() + Duration::from_secs(backoff),
            })
        }
        Some((error, recoverable)) => {
            tracing::error!(
                file_id = %job.file_id,
                attempt = queued.attempt,
                recoverable,
                error = %error,
                "Job failed permanently"
            );
            let exhausted = {
                let handler = handler.clone();
                let job = queued.job.clone();
                let error = error.clone();
                tokio::spawn(async move { handler.on_exhausted(&job, &error).await })
            };
            if let Err(e) = exhausted.await {
                tracing::error!(file_id = %job.file_id, error = %e, "Exhaustion hook panicked");
            }
            None
        }
    };

    shared.pending.lock().await.finish(&key, retry, Instant::now());
}
