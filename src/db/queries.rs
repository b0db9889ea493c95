use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{DocumentProcessJob, DocumentType, HaltReason, JobStatus, NewJob, Outcome};
use crate::models::reason::ApplicationFailedReason;
use crate::services::store::StoreError;

const JOB_COLUMNS: &str = "id, application_id, user_id, file_id, file_name, file_url, document_type, \
     status, result, error, halt_requested, attempts, claimed_at, created_at, updated_at";

/// `updated_at` must strictly advance even when two writes share a clock tick.
const BUMP_UPDATED_AT: &str = "GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')";

fn status_names(statuses: Vec<JobStatus>) -> Vec<String> {
    statuses.into_iter().map(|s| s.to_string()).collect()
}

fn parse_column<T: FromStr>(id: Uuid, column: &str, value: &str) -> Result<T, StoreError> {
    value.parse().map_err(|_| StoreError::Corrupt {
        id,
        detail: format!("unknown {column} '{value}'"),
    })
}

pub(crate) fn job_from_row(row: &PgRow) -> Result<DocumentProcessJob, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let document_type: String = row.try_get("document_type")?;
    let status: String = row.try_get("status")?;
    let error: Option<String> = row.try_get("error")?;
    let halt: Option<String> = row.try_get("halt_requested")?;

    Ok(DocumentProcessJob {
        id,
        application_id: row.try_get("application_id")?,
        user_id: row.try_get("user_id")?,
        file_id: row.try_get("file_id")?,
        file_name: row.try_get("file_name")?,
        file_url: row.try_get("file_url")?,
        document_type: parse_column::<DocumentType>(id, "document_type", &document_type)?,
        status: parse_column::<JobStatus>(id, "status", &status)?,
        result: row.try_get("result")?,
        error: error
            .map(|e| parse_column::<ApplicationFailedReason>(id, "error", &e))
            .transpose()?,
        halt_requested: halt
            .map(|h| parse_column::<HaltReason>(id, "halt_requested", &h))
            .transpose()?,
        attempts: row.try_get("attempts")?,
        claimed_at: row.try_get("claimed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new `pending` job.
pub async fn create_job(pool: &PgPool, job: &NewJob) -> Result<DocumentProcessJob, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO document_jobs
            (id, application_id, user_id, file_id, file_name, file_url, document_type, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&job.application_id)
    .bind(&job.user_id)
    .bind(&job.file_id)
    .bind(&job.file_name)
    .bind(&job.file_url)
    .bind(job.document_type.as_ref())
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job<'e, E: PgExecutor<'e>>(
    executor: E,
    job_id: Uuid,
) -> Result<Option<DocumentProcessJob>, StoreError> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM document_jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

pub async fn jobs_for_application(
    pool: &PgPool,
    application_id: &str,
) -> Result<Vec<DocumentProcessJob>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM document_jobs WHERE application_id = $1 ORDER BY created_at ASC"
    ))
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Conditional claim. Returns `None` when the job is missing, terminal, or
/// held by a live claim.
pub async fn claim_job(
    pool: &PgPool,
    job_id: Uuid,
    claimed_before: DateTime<Utc>,
) -> Result<Option<DocumentProcessJob>, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE document_jobs
        SET status = 'processing',
            attempts = attempts + 1,
            claimed_at = NOW(),
            updated_at = {BUMP_UPDATED_AT}
        WHERE id = $1
          AND status = ANY($3)
          AND (status = 'pending' OR claimed_at < $2)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(claimed_before)
    .bind(status_names(JobStatus::sources_of(JobStatus::Processing)))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Moves a `processing` job into the outcome's terminal state.
pub async fn finish_job<'e, E: PgExecutor<'e>>(
    executor: E,
    job_id: Uuid,
    outcome: &Outcome,
) -> Result<Option<DocumentProcessJob>, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE document_jobs
        SET status = $2,
            result = $3,
            error = $4,
            updated_at = {BUMP_UPDATED_AT}
        WHERE id = $1 AND status = ANY($5)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(outcome.status().as_ref())
    .bind(outcome.result())
    .bind(outcome.error().map(|e| e.to_string()))
    .bind(status_names(JobStatus::sources_of(outcome.status())))
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Records a halt signal on a non-terminal job. The first signal wins.
pub async fn request_halt(
    pool: &PgPool,
    job_id: Uuid,
    reason: HaltReason,
) -> Result<Option<DocumentProcessJob>, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE document_jobs
        SET halt_requested = COALESCE(halt_requested, $2)
        WHERE id = $1 AND status IN ('pending', 'processing')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(reason.as_ref())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

pub async fn halt_requested(pool: &PgPool, job_id: Uuid) -> Result<Option<HaltReason>, StoreError> {
    let halt: Option<Option<String>> =
        sqlx::query_scalar("SELECT halt_requested FROM document_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await?;

    halt.flatten()
        .map(|h| parse_column::<HaltReason>(job_id, "halt_requested", &h))
        .transpose()
}

/// Jobs for the recovery sweep.
pub async fn stalled_jobs(
    pool: &PgPool,
    pending_before: DateTime<Utc>,
    claimed_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Uuid>, StoreError> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT id FROM document_jobs
        WHERE (status = 'pending' AND updated_at < $1)
           OR (status = 'processing' AND claimed_at < $2)
        ORDER BY updated_at ASC
        LIMIT $3
        "#,
    )
    .bind(pending_before)
    .bind(claimed_before)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
