use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::RequestContext;
use crate::models::api::{HaltJobRequest, SubmitJobRequest, SubmitJobResponse};
use crate::models::extracted::ExtractedData;
use crate::models::job::DocumentProcessJob;
use crate::routes::error::ApiError;

/// POST /api/v1/jobs — create a job for an uploaded document.
///
/// Returns as soon as the job is recorded and enqueued.
pub async fn submit_job(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let job = state.intake.submit(&ctx, request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DocumentProcessJob>, ApiError> {
    Ok(Json(state.intake.job(&ctx, job_id).await?))
}

/// GET /api/v1/applications/{application_id}/jobs
pub async fn application_jobs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(application_id): Path<String>,
) -> Result<Json<Vec<DocumentProcessJob>>, ApiError> {
    Ok(Json(
        state
            .intake
            .jobs_for_application(&ctx, &application_id)
            .await?,
    ))
}

/// POST /api/v1/jobs/{job_id}/cancel — applicant withdraws the document.
pub async fn cancel_job(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DocumentProcessJob>, ApiError> {
    Ok(Json(state.intake.cancel(&ctx, job_id).await?))
}

/// POST /api/v1/jobs/{job_id}/halt — admin report that the applicant or document is gone.
pub async fn halt_job(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
    payload: Result<Json<HaltJobRequest>, JsonRejection>,
) -> Result<Json<DocumentProcessJob>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(
        state
            .intake
            .report_missing(&ctx, job_id, request.reason)
            .await?,
    ))
}

/// GET /api/v1/jobs/{job_id}/extracted — extraction records for the job.
pub async fn job_extractions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<ExtractedData>>, ApiError> {
    // Same visibility as the job itself.
    state.intake.job(&ctx, job_id).await?;
    Ok(Json(state.gate.extracted_for_job(job_id).await?))
}
