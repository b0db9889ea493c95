use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::models::fields::{validate_fields, FieldError};
use crate::models::job::{DocumentProcessJob, JobRef, JobStatus, Outcome};
use crate::models::reason::ApplicationFailedReason;
use crate::services::dispatcher::NotificationDispatcher;
use crate::services::extraction::{ExtractionFailure, Extractor};
use crate::services::queue::{QueueError, TaskQueue};
use crate::services::retry::{retry, Backoff};
use crate::services::storage::{ObjectStore, StorageError};
use crate::services::shutdown::Shutdown;
use crate::services::store::{cutoff, Claim, Finish, JobStore, StoreError};

const SWEEP_BATCH: i64 = 100;

/// Tuning for the extraction worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Parallel processing loops in this process.
    pub concurrency: usize,
    /// Retry policy for transient object store and extraction failures.
    pub backoff: Backoff,
    /// How long a claim protects a `processing` job from being re-claimed.
    pub claim_lease: Duration,
    /// Age after which a `pending` job is assumed to have lost its queue message.
    pub stall_after: Duration,
    pub sweep_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            backoff: Backoff::new(3, Duration::from_millis(500), Duration::from_secs(10)),
            claim_lease: Duration::from_secs(600),
            stall_after: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// What happened to one queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// This attempt moved the job into `status`.
    Finished { status: JobStatus, notified: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The job does not exist; the message is dropped.
    Missing,
    /// Redelivery of a finished job.
    AlreadyTerminal,
    /// Another attempt holds a live claim.
    Busy,
    /// The claim expired and another attempt finished the job first.
    LostRace,
}

/// Drives jobs from `pending` to a terminal state.
pub struct ExtractionWorker {
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<dyn Extractor>,
    queue: Arc<dyn TaskQueue<JobRef>>,
    dispatcher: NotificationDispatcher,
    settings: WorkerSettings,
}

impl ExtractionWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn Extractor>,
        queue: Arc<dyn TaskQueue<JobRef>>,
        dispatcher: NotificationDispatcher,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            objects,
            extractor,
            queue,
            dispatcher,
            settings,
        }
    }

    /// Processes the next queued job. `Ok(None)` when the queue is empty.
    ///
    /// The message is acked once the job is handled and released back to the
    /// queue if the job store or queue failed mid-way.
    pub async fn process_next(&self) -> Result<Option<ProcessOutcome>, WorkerError> {
        let Some(delivery) = self.queue.dequeue().await? else {
            return Ok(None);
        };

        match self.process(&delivery.payload).await {
            Ok(outcome) => {
                self.queue.ack(&delivery).await?;
                Ok(Some(outcome))
            }
            Err(e) => {
                if let Err(release_err) = self.queue.release(&delivery).await {
                    tracing::error!(
                        job_id = %delivery.payload.job_id,
                        error = %release_err,
                        "Failed to release message; it will be recovered on restart"
                    );
                }
                Err(e)
            }
        }
    }

    /// Runs one job reference through the state machine.
    pub async fn process(&self, job_ref: &JobRef) -> Result<ProcessOutcome, WorkerError> {
        let job = match self.store.claim_job(job_ref.job_id, self.settings.claim_lease).await? {
            Claim::Claimed(job) => job,
            Claim::Missing => {
                tracing::warn!(job_id = %job_ref.job_id, "Dropping message for unknown job");
                return Ok(ProcessOutcome::Skipped(SkipReason::Missing));
            }
            Claim::AlreadyTerminal(job) => {
                tracing::debug!(job_id = %job.id, status = %job.status, "Redelivered finished job, ignoring");
                return Ok(ProcessOutcome::Skipped(SkipReason::AlreadyTerminal));
            }
            Claim::Busy(job) => {
                tracing::debug!(job_id = %job.id, "Job claimed by another attempt, ignoring");
                return Ok(ProcessOutcome::Skipped(SkipReason::Busy));
            }
        };

        tracing::info!(
            job_id = %job.id,
            document_type = %job.document_type,
            attempt = job.attempts,
            "Processing document job"
        );

        let started = Instant::now();
        let outcome = self.extract(&job).await?;
        self.finish(&job, outcome, started).await
    }

    async fn extract(&self, job: &DocumentProcessJob) -> Result<Outcome, WorkerError> {
        if let Some(halt) = job.halt_requested {
            return Ok(Outcome::Halted(halt));
        }

        let fetched = retry(
            &self.settings.backoff,
            "object_fetch",
            StorageError::is_transient,
            || self.objects.get_object(&job.file_id),
        )
        .await;

        let document = match fetched {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(key)) => {
                tracing::warn!(job_id = %job.id, file_id = %key, "Document missing from object store");
                return Ok(Outcome::Failed(ApplicationFailedReason::DocumentNotFound));
            }
            Err(StorageError::Cipher(e)) => {
                tracing::warn!(job_id = %job.id, error = %e, "Stored document is unreadable");
                return Ok(Outcome::Failed(
                    ApplicationFailedReason::DocumentProcessingFailedInvalidData,
                ));
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Object fetch failed");
                return Ok(Outcome::Failed(ApplicationFailedReason::DocumentProcessingFailed));
            }
        };

        if let Some(halt) = self.store.halt_requested(job.id).await? {
            return Ok(Outcome::Halted(halt));
        }

        let started = Instant::now();
        let extracted = retry(
            &self.settings.backoff,
            "extraction",
            |e: &ExtractionFailure| e.kind.is_transient(),
            || self.extractor.extract(&document, job.document_type),
        )
        .await;
        metrics::histogram!("document_extraction_seconds").record(started.elapsed().as_secs_f64());

        // A halt that arrived during the call wins over its result.
        if let Some(halt) = self.store.halt_requested(job.id).await? {
            return Ok(Outcome::Halted(halt));
        }

        let raw = match extracted {
            Ok(raw) => raw,
            Err(failure) => {
                tracing::warn!(
                    job_id = %job.id,
                    kind = ?failure.kind,
                    detail = %failure.detail,
                    "Extraction failed"
                );
                return Ok(Outcome::Failed(failure.kind.reason()));
            }
        };

        Ok(match validate_fields(job.document_type, raw) {
            Ok(fields) => Outcome::Completed(fields),
            Err(FieldError::Missing(missing)) => {
                tracing::info!(job_id = %job.id, ?missing, "Required fields missing");
                Outcome::Failed(ApplicationFailedReason::InformationMissing)
            }
            Err(FieldError::Invalid(detail)) => {
                tracing::info!(job_id = %job.id, %detail, "Extracted fields invalid");
                Outcome::Failed(ApplicationFailedReason::DocumentProcessingFailedInvalidData)
            }
        })
    }

    async fn finish(
        &self,
        job: &DocumentProcessJob,
        outcome: Outcome,
        started: Instant,
    ) -> Result<ProcessOutcome, WorkerError> {
        match self.store.finish_job(job.id, outcome).await? {
            Finish::Transitioned { job, extracted } => {
                metrics::counter!("document_jobs_finished_total", "status" => job.status.to_string())
                    .increment(1);
                metrics::histogram!("document_job_processing_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    job_id = %job.id,
                    status = %job.status,
                    reason = ?job.error,
                    extracted_id = ?extracted.as_ref().map(|e| e.id),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Document job finished"
                );

                let notified = self.dispatcher.dispatch(&job).await;
                Ok(ProcessOutcome::Finished {
                    status: job.status,
                    notified,
                })
            }
            Finish::AlreadyTerminal(current) | Finish::NotClaimed(current) => {
                tracing::warn!(
                    job_id = %current.id,
                    status = %current.status,
                    "Job changed under this attempt, result discarded"
                );
                Ok(ProcessOutcome::Skipped(SkipReason::LostRace))
            }
            Finish::Missing => Ok(ProcessOutcome::Skipped(SkipReason::Missing)),
        }
    }

    /// Re-enqueues jobs whose queue message was lost or whose worker died.
    pub async fn sweep(&self) -> Result<usize, WorkerError> {
        let now = Utc::now();
        let pending_before = cutoff(now, self.settings.stall_after);
        let claimed_before = cutoff(now, self.settings.claim_lease);

        let stalled = self
            .store
            .stalled_jobs(pending_before, claimed_before, SWEEP_BATCH)
            .await?;
        for job_id in &stalled {
            self.queue.enqueue(&JobRef { job_id: *job_id }).await?;
            tracing::info!(job_id = %job_id, "Re-enqueued stalled job");
        }

        let depth = self.queue.depth().await?;
        metrics::gauge!("document_queue_depth").set(depth as f64);
        Ok(stalled.len())
    }

    /// Runs the processing loops and the sweep until `shutdown` fires.
    ///
    /// Loops only observe the signal between messages, so a claimed job is
    /// always finished and acked before this returns.
    pub async fn run(self: Arc<Self>, shutdown: Shutdown) {
        match self.queue.recover_in_flight().await {
            Ok(0) => {}
            Ok(moved) => tracing::info!(moved, "Requeued job references left in flight"),
            Err(e) => tracing::error!(error = %e, "Failed to recover in-flight job references"),
        }

        let mut tasks = JoinSet::new();
        for slot in 0..self.settings.concurrency.max(1) {
            let worker = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tasks.spawn(async move { worker.processing_loop(slot, shutdown).await });
        }
        let worker = Arc::clone(&self);
        tasks.spawn(async move { worker.sweep_loop(shutdown).await });

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task ended unexpectedly");
            }
        }
        tracing::info!("Extraction worker stopped");
    }

    async fn processing_loop(&self, slot: usize, mut shutdown: Shutdown) {
        tracing::info!(slot, "Extraction loop started");
        while !shutdown.is_triggered() {
            match self.process_next().await {
                Ok(Some(outcome)) => tracing::debug!(slot, ?outcome, "Message handled"),
                Ok(None) => {
                    shutdown.sleep(self.settings.poll_interval).await;
                }
                Err(e) => {
                    tracing::error!(slot, error = %e, "Error processing job, will retry");
                    shutdown.sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    async fn sweep_loop(&self, mut shutdown: Shutdown) {
        while !shutdown.sleep(self.settings.sweep_interval).await {
            match self.sweep().await {
                Ok(0) => {}
                Ok(requeued) => tracing::info!(requeued, "Recovery sweep re-enqueued jobs"),
                Err(e) => tracing::error!(error = %e, "Recovery sweep failed"),
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
