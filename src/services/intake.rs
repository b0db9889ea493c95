use garde::Validate;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{RequestContext, Role};
use crate::models::api::SubmitJobRequest;
use crate::models::job::{DocumentProcessJob, DocumentType, HaltReason, JobRef, JobStatus, NewJob};
use crate::models::reason::ApplicationFailedReason;
use crate::services::extraction::sniff_media_type;
use crate::services::queue::TaskQueue;
use crate::services::storage::{ObjectStore, StorageError};
use crate::services::store::{HaltRequest, JobStore, StoreError};

/// Entry point of the pipeline: uploads, job creation, reads and halt signals.
#[derive(Clone)]
pub struct Intake {
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn TaskQueue<JobRef>>,
}

impl Intake {
    pub fn new(
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn TaskQueue<JobRef>>,
    ) -> Self {
        Self {
            store,
            objects,
            queue,
        }
    }

    /// Stores an uploaded document and returns its object key.
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        file_name: &str,
        data: &[u8],
    ) -> Result<String, IntakeError> {
        let content_type = sniff_media_type(data).ok_or(IntakeError::UnsupportedFileType)?;
        let key = upload_key(&ctx.user_id, file_name);

        self.objects
            .put_object(&key, data, content_type)
            .await
            .map_err(IntakeError::UploadFailed)?;

        tracing::info!(user_id = %ctx.user_id, file_id = %key, content_type, bytes = data.len(), "Document uploaded");
        Ok(key)
    }

    /// Creates a `pending` job and enqueues it. Returns without waiting for processing.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        request: SubmitJobRequest,
    ) -> Result<DocumentProcessJob, IntakeError> {
        request
            .validate()
            .map_err(|report| IntakeError::Invalid(report.to_string()))?;

        let document_type = DocumentType::from_str(&request.document_type)
            .map_err(|_| IntakeError::UnknownDocumentType(request.document_type.clone()))?;

        if !ctx.is_staff() && !request.file_id.starts_with(&upload_prefix(&ctx.user_id)) {
            return Err(IntakeError::Forbidden);
        }

        if !self.objects.exists(&request.file_id).await? {
            return Err(IntakeError::DocumentNotUploaded(request.file_id));
        }

        let job = self
            .store
            .create_job(NewJob {
                application_id: request.application_id,
                user_id: ctx.user_id.clone(),
                file_url: self.objects.url_for(&request.file_id),
                file_id: request.file_id,
                file_name: request.file_name,
                document_type,
            })
            .await?;

        metrics::counter!("document_jobs_submitted_total", "type" => document_type.to_string())
            .increment(1);

        if let Err(e) = self.queue.enqueue(&JobRef { job_id: job.id }).await {
            // The job is durable; the stalled-job sweep enqueues it later.
            tracing::warn!(job_id = %job.id, error = %e, "Enqueue failed, leaving job for the sweep");
        }

        tracing::info!(
            job_id = %job.id,
            application_id = %job.application_id,
            document_type = %job.document_type,
            "Document job submitted"
        );
        Ok(job)
    }

    pub async fn job(&self, ctx: &RequestContext, job_id: Uuid) -> Result<DocumentProcessJob, IntakeError> {
        let job = self
            .store
            .load_job(job_id)
            .await?
            .ok_or(IntakeError::NotFound)?;
        if !ctx.is_staff() && job.user_id != ctx.user_id {
            // Do not reveal other applicants' job ids.
            return Err(IntakeError::NotFound);
        }
        Ok(job)
    }

    pub async fn jobs_for_application(
        &self,
        ctx: &RequestContext,
        application_id: &str,
    ) -> Result<Vec<DocumentProcessJob>, IntakeError> {
        let jobs = self.store.jobs_for_application(application_id).await?;
        Ok(if ctx.is_staff() {
            jobs
        } else {
            jobs.into_iter().filter(|j| j.user_id == ctx.user_id).collect()
        })
    }

    /// Records the owner's cancellation request. The worker acts on it at its
    /// next check; a job already terminal cannot be cancelled.
    pub async fn cancel(&self, ctx: &RequestContext, job_id: Uuid) -> Result<DocumentProcessJob, IntakeError> {
        let job = self.job(ctx, job_id).await?;
        if job.user_id != ctx.user_id && !ctx.has_role(Role::Admin) {
            return Err(IntakeError::Forbidden);
        }
        self.halt(job_id, HaltReason::UserCancelled).await
    }

    /// Upstream report that the applicant account or document record is gone.
    pub async fn report_missing(
        &self,
        ctx: &RequestContext,
        job_id: Uuid,
        reason: HaltReason,
    ) -> Result<DocumentProcessJob, IntakeError> {
        if !ctx.has_role(Role::Admin) {
            return Err(IntakeError::Forbidden);
        }
        self.halt(job_id, reason).await
    }

    async fn halt(&self, job_id: Uuid, reason: HaltReason) -> Result<DocumentProcessJob, IntakeError> {
        match self.store.request_halt(job_id, reason).await? {
            HaltRequest::Recorded(job) => {
                tracing::info!(job_id = %job_id, reason = %reason, "Halt requested");
                Ok(job)
            }
            HaltRequest::AlreadyTerminal(job) => Err(IntakeError::AlreadyFinished(job.status)),
            HaltRequest::Missing => Err(IntakeError::NotFound),
        }
    }
}

fn upload_prefix(user_id: &str) -> String {
    format!("uploads/{}/", sanitize(user_id))
}

fn upload_key(user_id: &str, file_name: &str) -> String {
    format!("{}{}-{}", upload_prefix(user_id), Uuid::new_v4(), sanitize(file_name))
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(100)
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Unknown document type: {0}")]
    UnknownDocumentType(String),

    #[error("Document has not been uploaded: {0}")]
    DocumentNotUploaded(String),

    #[error("Unsupported file type")]
    UnsupportedFileType,

    #[error("Upload failed: {0}")]
    UploadFailed(StorageError),

    #[error("Job not found")]
    NotFound,

    #[error("Not allowed")]
    Forbidden,

    #[error("Job already finished with status {0}")]
    AlreadyFinished(JobStatus),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntakeError {
    /// Reason code shown to the applicant, where one applies.
    pub fn reason(&self) -> Option<ApplicationFailedReason> {
        match self {
            IntakeError::DocumentNotUploaded(_) => Some(ApplicationFailedReason::DocumentNotUploaded),
            IntakeError::UnsupportedFileType => {
                Some(ApplicationFailedReason::DocumentProcessingFailedInvalidFileType)
            }
            IntakeError::UploadFailed(_) => Some(ApplicationFailedReason::DocumentUploadFailed),
            _ => None,
        }
    }
}
