use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::models::extracted::{ExtractedData, Verdict, VerificationDecision, VerificationStatus};
use crate::services::store::{JobStore, StoreError, VerifyOutcome};

/// Applies human verdicts to extractions. Never touches jobs.
#[derive(Clone)]
pub struct VerificationGate {
    store: Arc<dyn JobStore>,
}

impl VerificationGate {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// One-shot decision on a `PENDING` record. The caller's role has already
    /// been checked; the verifier id comes from `ctx`.
    pub async fn verify(
        &self,
        ctx: &RequestContext,
        extracted_id: Uuid,
        verdict: Verdict,
        notes: Option<String>,
    ) -> Result<ExtractedData, VerificationError> {
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let decision = VerificationDecision {
            verdict,
            verifier_id: ctx.user_id.clone(),
            notes,
            decided_at: Utc::now(),
        };

        match self.store.update_verification(extracted_id, decision).await? {
            VerifyOutcome::Updated(record) => {
                metrics::counter!(
                    "extractions_verified_total",
                    "verdict" => record.verification_status.to_string()
                )
                .increment(1);
                tracing::info!(
                    extracted_id = %record.id,
                    job_id = %record.job_id,
                    verdict = %record.verification_status,
                    verifier = %ctx.user_id,
                    "Extraction verified"
                );
                Ok(record)
            }
            VerifyOutcome::Conflict(record) => {
                tracing::warn!(
                    extracted_id = %record.id,
                    status = %record.verification_status,
                    "Verification rejected, record already decided or superseded"
                );
                Err(VerificationError::Conflict {
                    status: record.verification_status,
                    superseded: record.superseded_by.is_some(),
                })
            }
            VerifyOutcome::Missing => Err(VerificationError::NotFound),
        }
    }

    pub async fn extracted_for_job(&self, job_id: Uuid) -> Result<Vec<ExtractedData>, VerificationError> {
        Ok(self.store.extracted_for_job(job_id).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Extracted data not found")]
    NotFound,

    #[error("Extracted data already decided ({status}) or superseded ({superseded})")]
    Conflict {
        status: VerificationStatus,
        superseded: bool,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
