use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::auth::RequestContext;
use crate::models::api::UploadResponse;
use crate::routes::error::ApiError;

/// POST /api/v1/files — store one document from the multipart field `file`.
pub async fn upload_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("document").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".into()));
        }

        let file_id = state.intake.upload(&ctx, &file_name, &data).await?;
        return Ok((StatusCode::CREATED, Json(UploadResponse { file_id, file_name })));
    }

    Err(ApiError::BadRequest("Missing multipart field `file`".into()))
}
