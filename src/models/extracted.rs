use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::job::DocumentType;

/// Human review state of an extraction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

/// A verifier's decision. Only the two decided states can be requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Verified,
    Rejected,
}

impl From<Verdict> for VerificationStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Verified => VerificationStatus::Verified,
            Verdict::Rejected => VerificationStatus::Rejected,
        }
    }
}

/// Structured fields produced by a completed job, awaiting human review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    pub id: Uuid,
    pub job_id: Uuid,
    pub application_id: String,
    pub document_type: DocumentType,
    pub result: serde_json::Value,
    pub verification_status: VerificationStatus,
    pub notes: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    /// Set when a later extraction of the same document replaces this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ExtractedData {
    /// Only undecided, current records accept a verdict.
    pub fn is_open(&self) -> bool {
        self.verification_status == VerificationStatus::Pending && self.superseded_by.is_none()
    }
}

/// A verdict recorded against one extraction.
#[derive(Debug, Clone)]
pub struct VerificationDecision {
    pub verdict: Verdict,
    pub verifier_id: String,
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}
