use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::models::extracted::{ExtractedData, VerificationDecision, VerificationStatus};
use crate::models::job::DocumentProcessJob;
use crate::services::store::StoreError;

const EXTRACTED_COLUMNS: &str = "id, job_id, application_id, document_type, result, verification_status, \
     notes, verified_by, verified_at, superseded_by, created_at";

fn extracted_from_row(row: &PgRow) -> Result<ExtractedData, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let document_type: String = row.try_get("document_type")?;
    let status: String = row.try_get("verification_status")?;

    let corrupt = |detail: String| StoreError::Corrupt { id, detail };

    Ok(ExtractedData {
        id,
        job_id: row.try_get("job_id")?,
        application_id: row.try_get("application_id")?,
        document_type: document_type
            .parse()
            .map_err(|_| corrupt(format!("unknown document_type '{document_type}'")))?,
        result: row.try_get("result")?,
        verification_status: status
            .parse::<VerificationStatus>()
            .map_err(|_| corrupt(format!("unknown verification_status '{status}'")))?,
        notes: row.try_get("notes")?,
        verified_by: row.try_get("verified_by")?,
        verified_at: row.try_get("verified_at")?,
        superseded_by: row.try_get("superseded_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a `PENDING` extraction for a job that just completed.
pub async fn create_extracted<'e, E: PgExecutor<'e>>(
    executor: E,
    job: &DocumentProcessJob,
    result: &serde_json::Value,
) -> Result<ExtractedData, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO extracted_data (id, job_id, application_id, document_type, result, verification_status)
        VALUES ($1, $2, $3, $4, $5, 'PENDING')
        RETURNING {EXTRACTED_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(job.id)
    .bind(&job.application_id)
    .bind(job.document_type.as_ref())
    .bind(result)
    .fetch_one(executor)
    .await?;

    extracted_from_row(&row)
}

/// Points earlier extractions of the same document at the new one.
pub async fn supersede_previous<'e, E: PgExecutor<'e>>(
    executor: E,
    current: &ExtractedData,
) -> Result<u64, StoreError> {
    let done = sqlx::query(
        r#"
        UPDATE extracted_data
        SET superseded_by = $1
        WHERE application_id = $2
          AND document_type = $3
          AND id <> $1
          AND superseded_by IS NULL
        "#,
    )
    .bind(current.id)
    .bind(&current.application_id)
    .bind(current.document_type.as_ref())
    .execute(executor)
    .await?;

    Ok(done.rows_affected())
}

pub async fn get_extracted(pool: &PgPool, id: Uuid) -> Result<Option<ExtractedData>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {EXTRACTED_COLUMNS} FROM extracted_data WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(extracted_from_row).transpose()
}

pub async fn extracted_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<ExtractedData>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {EXTRACTED_COLUMNS} FROM extracted_data WHERE job_id = $1 ORDER BY created_at ASC"
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(extracted_from_row).collect()
}

/// Applies a verdict to an open record. `None` means nothing was updated.
pub async fn update_verification(
    pool: &PgPool,
    id: Uuid,
    decision: &VerificationDecision,
) -> Result<Option<ExtractedData>, StoreError> {
    let status = VerificationStatus::from(decision.verdict);
    let row = sqlx::query(&format!(
        r#"
        UPDATE extracted_data
        SET verification_status = $2,
            verified_by = $3,
            verified_at = $4,
            notes = $5
        WHERE id = $1
          AND verification_status = 'PENDING'
          AND superseded_by IS NULL
        RETURNING {EXTRACTED_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(status.as_ref())
    .bind(&decision.verifier_id)
    .bind(decision.decided_at)
    .bind(&decision.notes)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(extracted_from_row).transpose()
}
