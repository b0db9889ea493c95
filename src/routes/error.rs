use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::models::reason::ApplicationFailedReason;
use crate::services::intake::IntakeError;
use crate::services::verification::VerificationError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<ApplicationFailedReason>,
}

/// Errors returned by HTTP handlers, rendered as JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Not allowed")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Rejected document, carrying the applicant-facing reason code.
    #[error("{detail}")]
    Document {
        status: StatusCode,
        reason: ApplicationFailedReason,
        detail: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, reason) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Not allowed".to_string(),
                None,
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail, None),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail, None),
            ApiError::Document {
                status,
                reason,
                detail,
            } => (status, "DOCUMENT_REJECTED", detail, Some(reason)),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail, None),
            ApiError::Unavailable(detail) => {
                tracing::warn!(detail, "Dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                    None,
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                reason,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        let reason = err.reason();
        match err {
            IntakeError::Invalid(_) | IntakeError::UnknownDocumentType(_) => {
                ApiError::BadRequest(err.to_string())
            }
            IntakeError::DocumentNotUploaded(_) => document(StatusCode::UNPROCESSABLE_ENTITY, reason, &err),
            IntakeError::UnsupportedFileType => document(StatusCode::UNSUPPORTED_MEDIA_TYPE, reason, &err),
            IntakeError::UploadFailed(_) => document(StatusCode::BAD_GATEWAY, reason, &err),
            IntakeError::NotFound => ApiError::NotFound(err.to_string()),
            IntakeError::Forbidden => ApiError::Forbidden,
            IntakeError::AlreadyFinished(_) => ApiError::Conflict(err.to_string()),
            IntakeError::Storage(ref e) if e.is_transient() => ApiError::Unavailable(err.to_string()),
            IntakeError::Storage(_) | IntakeError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

fn document(status: StatusCode, reason: Option<ApplicationFailedReason>, err: &IntakeError) -> ApiError {
    match reason {
        Some(reason) => ApiError::Document {
            status,
            reason,
            detail: err.to_string(),
        },
        None => ApiError::Internal(err.to_string()),
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::NotFound => ApiError::NotFound(err.to_string()),
            VerificationError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            VerificationError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}
