use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::job::{DocumentProcessJob, DocumentType, JobStatus};
use crate::models::reason::{self, ApplicationFailedReason, Locale};

/// A notification delivery medium. Each has its own queue and worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    Email,
    Bot,
}

/// One outcome announcement for one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationTask {
    pub id: Uuid,
    pub channel: Channel,
    pub job_id: Uuid,
    pub application_id: String,
    pub user_id: String,
    pub document_type: DocumentType,
    pub status: JobStatus,
    pub reason: Option<ApplicationFailedReason>,
    pub subject: String,
    pub message: String,
    /// Language the text was rendered in.
    #[serde(default)]
    pub locale: Locale,
    pub created_at: DateTime<Utc>,
}

impl NotificationTask {
    /// Builds the task for a job that has just reached a terminal state.
    ///
    /// Text comes only from the reason table or the success template.
    pub fn for_job(job: &DocumentProcessJob, channel: Channel, locale: Locale) -> Self {
        let succeeded = job.status == JobStatus::Completed;
        let message = match job.error {
            Some(reason) => reason.message(locale),
            None if succeeded => reason::success_message(job.document_type, locale),
            // Unreachable for a consistent terminal job; fall back to the generic failure.
            None => ApplicationFailedReason::DocumentProcessingFailed.message(locale),
        };

        Self {
            id: Uuid::new_v4(),
            channel,
            job_id: job.id,
            application_id: job.application_id.clone(),
            user_id: job.user_id.clone(),
            document_type: job.document_type,
            status: job.status,
            reason: job.error,
            subject: reason::subject(job.document_type, succeeded, locale),
            message: message.to_string(),
            locale,
            created_at: Utc::now(),
        }
    }
}
