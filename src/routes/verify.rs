use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{RequestContext, Role};
use crate::models::api::VerifyRequest;
use crate::models::extracted::ExtractedData;
use crate::routes::error::ApiError;

/// POST /api/v1/extracted/{id}/verify — record a verifier's verdict.
pub async fn verify_extracted(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(extracted_id): Path<Uuid>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<ExtractedData>, ApiError> {
    if !ctx.has_role(Role::Verifier) && !ctx.has_role(Role::Admin) {
        return Err(ApiError::Forbidden);
    }

    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    request
        .validate()
        .map_err(|report| ApiError::BadRequest(report.to_string()))?;

    let record = state
        .gate
        .verify(&ctx, extracted_id, request.verdict, request.notes)
        .await?;
    Ok(Json(record))
}
