use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::extracted::Verdict;
use crate::models::job::{HaltReason, JobStatus};

/// Request to start processing an uploaded document.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    #[garde(length(min = 1, max = 100))]
    pub application_id: String,

    /// Checked against the known document types by intake.
    #[garde(length(min = 1, max = 50))]
    pub document_type: String,

    /// Object store key returned by the upload endpoint.
    #[garde(length(min = 1, max = 512))]
    pub file_id: String,

    #[garde(length(min = 1, max = 255))]
    pub file_name: String,
}

/// Response after submitting a document job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Response after uploading a file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_id: String,
    pub file_name: String,
}

/// A verifier's decision on an extraction.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyRequest {
    #[garde(skip)]
    pub verdict: Verdict,

    #[garde(length(max = 2000))]
    pub notes: Option<String>,
}

/// Upstream report that the applicant or document record no longer exists.
#[derive(Debug, Clone, Deserialize)]
pub struct HaltJobRequest {
    pub reason: HaltReason,
}
