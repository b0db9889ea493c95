use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::models::extracted::{ExtractedData, VerificationDecision};
use crate::models::job::{DocumentProcessJob, HaltReason, NewJob, Outcome};

/// The instant `age` before `now`. Ages past the Unix epoch saturate there,
/// so an oversized lease or stall window never matches any job.
pub fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |t| t.max(DateTime::<Utc>::UNIX_EPOCH))
}

/// Result of trying to claim a job for processing.
#[derive(Debug, Clone)]
pub enum Claim {
    /// The job now belongs to this attempt and is `processing`.
    Claimed(DocumentProcessJob),
    /// Another attempt holds a live claim.
    Busy(DocumentProcessJob),
    /// Nothing left to do.
    AlreadyTerminal(DocumentProcessJob),
    Missing,
}

/// Result of recording a terminal outcome.
#[derive(Debug, Clone)]
pub enum Finish {
    /// This call performed the transition.
    Transitioned {
        job: DocumentProcessJob,
        extracted: Option<ExtractedData>,
    },
    /// The job was already terminal; nothing changed.
    AlreadyTerminal(DocumentProcessJob),
    /// The job is not `processing` (never claimed), so it cannot finish.
    NotClaimed(DocumentProcessJob),
    Missing,
}

impl Finish {
    pub fn transitioned(&self) -> bool {
        matches!(self, Finish::Transitioned { .. })
    }
}

/// Result of recording a halt signal.
#[derive(Debug, Clone)]
pub enum HaltRequest {
    Recorded(DocumentProcessJob),
    AlreadyTerminal(DocumentProcessJob),
    Missing,
}

/// Result of applying a verdict.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Updated(ExtractedData),
    /// Already decided or superseded; left unchanged.
    Conflict(ExtractedData),
    Missing,
}

/// Durable record of jobs and their extractions.
///
/// Every mutation is a read-modify-write scoped to one id.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: NewJob) -> Result<DocumentProcessJob, StoreError>;

    async fn load_job(&self, job_id: Uuid) -> Result<Option<DocumentProcessJob>, StoreError>;

    async fn jobs_for_application(
        &self,
        application_id: &str,
    ) -> Result<Vec<DocumentProcessJob>, StoreError>;

    /// Atomically moves `pending -> processing`, or re-claims a `processing`
    /// job whose claim is older than `lease`.
    async fn claim_job(&self, job_id: Uuid, lease: Duration) -> Result<Claim, StoreError>;

    /// Moves a `processing` job into its terminal state. A completed outcome
    /// also creates the `ExtractedData` record in the same write.
    async fn finish_job(&self, job_id: Uuid, outcome: Outcome) -> Result<Finish, StoreError>;

    async fn request_halt(&self, job_id: Uuid, reason: HaltReason) -> Result<HaltRequest, StoreError>;

    async fn halt_requested(&self, job_id: Uuid) -> Result<Option<HaltReason>, StoreError>;

    /// Non-terminal jobs that look abandoned: `pending` since before
    /// `pending_before`, or `processing` with a claim older than `claimed_before`.
    async fn stalled_jobs(
        &self,
        pending_before: DateTime<Utc>,
        claimed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;

    async fn load_extracted(&self, id: Uuid) -> Result<Option<ExtractedData>, StoreError>;

    async fn extracted_for_job(&self, job_id: Uuid) -> Result<Vec<ExtractedData>, StoreError>;

    /// Applies a verdict only if the record is still open.
    async fn update_verification(
        &self,
        id: Uuid,
        decision: VerificationDecision,
    ) -> Result<VerifyOutcome, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row for {id}: {detail}")]
    Corrupt { id: Uuid, detail: String },
}
