use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::extracted::{ExtractedData, VerificationDecision};
use crate::models::job::{DocumentProcessJob, HaltReason, NewJob, Outcome};
use crate::services::store::{
    cutoff, Claim, Finish, HaltRequest, JobStore, StoreError, VerifyOutcome,
};

pub mod contacts;
pub mod extracted_queries;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// [`JobStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: NewJob) -> Result<DocumentProcessJob, StoreError> {
        queries::create_job(&self.pool, &job).await
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<DocumentProcessJob>, StoreError> {
        queries::get_job(&self.pool, job_id).await
    }

    async fn jobs_for_application(
        &self,
        application_id: &str,
    ) -> Result<Vec<DocumentProcessJob>, StoreError> {
        queries::jobs_for_application(&self.pool, application_id).await
    }

    async fn claim_job(&self, job_id: Uuid, lease: Duration) -> Result<Claim, StoreError> {
        if let Some(job) = queries::claim_job(&self.pool, job_id, cutoff(Utc::now(), lease)).await? {
            return Ok(Claim::Claimed(job));
        }

        Ok(match queries::get_job(&self.pool, job_id).await? {
            None => Claim::Missing,
            Some(job) if job.status.is_terminal() => Claim::AlreadyTerminal(job),
            Some(job) => Claim::Busy(job),
        })
    }

    async fn finish_job(&self, job_id: Uuid, outcome: Outcome) -> Result<Finish, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(job) = queries::finish_job(&mut *tx, job_id, &outcome).await? else {
            let current = queries::get_job(&mut *tx, job_id).await?;
            tx.rollback().await?;
            return Ok(match current {
                None => Finish::Missing,
                Some(job) if job.status.is_terminal() => Finish::AlreadyTerminal(job),
                Some(job) => Finish::NotClaimed(job),
            });
        };

        let extracted = match outcome.result() {
            Some(result) => {
                let extracted = extracted_queries::create_extracted(&mut *tx, &job, result).await?;
                let superseded = extracted_queries::supersede_previous(&mut *tx, &extracted).await?;
                if superseded > 0 {
                    tracing::info!(
                        job_id = %job.id,
                        extracted_id = %extracted.id,
                        superseded,
                        "New extraction supersedes earlier records"
                    );
                }
                Some(extracted)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(Finish::Transitioned { job, extracted })
    }

    async fn request_halt(&self, job_id: Uuid, reason: HaltReason) -> Result<HaltRequest, StoreError> {
        if let Some(job) = queries::request_halt(&self.pool, job_id, reason).await? {
            return Ok(HaltRequest::Recorded(job));
        }

        Ok(match queries::get_job(&self.pool, job_id).await? {
            Some(job) => HaltRequest::AlreadyTerminal(job),
            None => HaltRequest::Missing,
        })
    }

    async fn halt_requested(&self, job_id: Uuid) -> Result<Option<HaltReason>, StoreError> {
        queries::halt_requested(&self.pool, job_id).await
    }

    async fn stalled_jobs(
        &self,
        pending_before: DateTime<Utc>,
        claimed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        queries::stalled_jobs(&self.pool, pending_before, claimed_before, limit).await
    }

    async fn load_extracted(&self, id: Uuid) -> Result<Option<ExtractedData>, StoreError> {
        extracted_queries::get_extracted(&self.pool, id).await
    }

    async fn extracted_for_job(&self, job_id: Uuid) -> Result<Vec<ExtractedData>, StoreError> {
        extracted_queries::extracted_for_job(&self.pool, job_id).await
    }

    async fn update_verification(
        &self,
        id: Uuid,
        decision: VerificationDecision,
    ) -> Result<VerifyOutcome, StoreError> {
        if let Some(updated) = extracted_queries::update_verification(&self.pool, id, &decision).await? {
            return Ok(VerifyOutcome::Updated(updated));
        }

        Ok(match extracted_queries::get_extracted(&self.pool, id).await? {
            Some(current) => VerifyOutcome::Conflict(current),
            None => VerifyOutcome::Missing,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
