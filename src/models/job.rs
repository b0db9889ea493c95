use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use uuid::Uuid;

use crate::models::reason::{ApplicationFailedReason, Locale};

/// Status of a document processing job.
///
/// `Pending` and `Processing` are transient; everything else is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    UserCancelled,
    UserNotFound,
    DocumentNotFound,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `Processing -> Processing` is a re-claim after an expired lease.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Processing, next) => next != JobStatus::Pending,
            _ => false,
        }
    }

    /// Statuses a job may be in when it moves to `next`.
    pub fn sources_of(next: JobStatus) -> Vec<JobStatus> {
        JobStatus::iter().filter(|s| s.can_transition_to(next)).collect()
    }
}

/// Recognized document types. Intake rejects anything else.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentType {
    Transcript,
    Certificate,
    Identity,
    BirthCertificate,
}

impl DocumentType {
    /// Human readable name used in notification subjects.
    pub fn label(self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::En, DocumentType::Transcript) => "transcript",
            (Locale::En, DocumentType::Certificate) => "certificate",
            (Locale::En, DocumentType::Identity) => "identity document",
            (Locale::En, DocumentType::BirthCertificate) => "birth certificate",
            (Locale::Vi, DocumentType::Transcript) => "Học bạ",
            (Locale::Vi, DocumentType::Certificate) => "Chứng chỉ",
            (Locale::Vi, DocumentType::Identity) => "Giấy tờ tùy thân",
            (Locale::Vi, DocumentType::BirthCertificate) => "Giấy khai sinh",
        }
    }
}

/// External signal that stops a job before it completes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HaltReason {
    UserCancelled,
    UserNotFound,
    DocumentNotFound,
}

impl HaltReason {
    pub fn status(self) -> JobStatus {
        match self {
            HaltReason::UserCancelled => JobStatus::UserCancelled,
            HaltReason::UserNotFound => JobStatus::UserNotFound,
            HaltReason::DocumentNotFound => JobStatus::DocumentNotFound,
        }
    }

    pub fn reason(self) -> ApplicationFailedReason {
        match self {
            HaltReason::UserCancelled => ApplicationFailedReason::UserCancelled,
            HaltReason::UserNotFound => ApplicationFailedReason::UserNotFound,
            HaltReason::DocumentNotFound => ApplicationFailedReason::DocumentNotFound,
        }
    }
}

/// The terminal result a worker records for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(serde_json::Value),
    Failed(ApplicationFailedReason),
    Halted(HaltReason),
}

impl Outcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Outcome::Completed(_) => JobStatus::Completed,
            Outcome::Failed(_) => JobStatus::Failed,
            Outcome::Halted(halt) => halt.status(),
        }
    }

    pub fn error(&self) -> Option<ApplicationFailedReason> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Failed(reason) => Some(*reason),
            Outcome::Halted(halt) => Some(halt.reason()),
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            Outcome::Completed(fields) => Some(fields),
            _ => None,
        }
    }
}

/// One document's progression through extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProcessJob {
    pub id: Uuid,
    pub application_id: String,
    pub user_id: String,
    pub file_id: String,
    pub file_name: String,
    pub file_url: String,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApplicationFailedReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_requested: Option<HaltReason>,
    pub attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentProcessJob {
    /// `result` iff completed, `error` iff any other terminal status.
    pub fn outcome_fields_consistent(&self) -> bool {
        let result_ok = self.result.is_some() == (self.status == JobStatus::Completed);
        let error_ok =
            self.error.is_some() == (self.status.is_terminal() && self.status != JobStatus::Completed);
        result_ok && error_ok
    }
}

/// Fields needed to create a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub application_id: String,
    pub user_id: String,
    pub file_id: String,
    pub file_name: String,
    pub file_url: String,
    pub document_type: DocumentType,
}

/// Reference carried on the job queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRef {
    pub job_id: Uuid,
}
