//! In-process backends with the same semantics as the Postgres, Redis and R2
//! implementations. Used by the test suite and for running the pipeline
//! without infrastructure.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use crate::models::extracted::{ExtractedData, VerificationDecision, VerificationStatus};
use crate::models::job::{DocumentProcessJob, HaltReason, JobStatus, NewJob, Outcome};
use crate::services::notify::{Contact, ContactBook};
use crate::services::queue::{Delivery, QueueError, TaskQueue};
use crate::services::storage::{ObjectStore, StorageError};
use crate::services::store::{
    cutoff, Claim, Finish, HaltRequest, JobStore, StoreError, VerifyOutcome,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not wedge every other test.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Strictly after `previous`, even within one clock tick.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + ChronoDuration::microseconds(1))
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<Uuid, DocumentProcessJob>,
    extracted: HashMap<Uuid, ExtractedData>,
}

/// [`JobStore`] held in a mutex; every operation is one critical section.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<StoreState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdates a job's claim, as if its worker died long ago.
    pub fn expire_claim(&self, job_id: Uuid, by: Duration) {
        let mut state = lock(&self.state);
        if let Some(job) = state.jobs.get_mut(&job_id) {
            let by = ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
            job.claimed_at = job.claimed_at.map(|t| t - by);
            if job.status == JobStatus::Pending {
                job.updated_at -= by;
            }
        }
    }

    pub fn all_jobs(&self) -> Vec<DocumentProcessJob> {
        lock(&self.state).jobs.values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: NewJob) -> Result<DocumentProcessJob, StoreError> {
        let now = Utc::now();
        let record = DocumentProcessJob {
            id: Uuid::new_v4(),
            application_id: job.application_id,
            user_id: job.user_id,
            file_id: job.file_id,
            file_name: job.file_name,
            file_url: job.file_url,
            document_type: job.document_type,
            status: JobStatus::Pending,
            result: None,
            error: None,
            halt_requested: None,
            attempts: 0,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        lock(&self.state).jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<DocumentProcessJob>, StoreError> {
        Ok(lock(&self.state).jobs.get(&job_id).cloned())
    }

    async fn jobs_for_application(
        &self,
        application_id: &str,
    ) -> Result<Vec<DocumentProcessJob>, StoreError> {
        let mut jobs: Vec<_> = lock(&self.state)
            .jobs
            .values()
            .filter(|j| j.application_id == application_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn claim_job(&self, job_id: Uuid, lease: Duration) -> Result<Claim, StoreError> {
        let mut state = lock(&self.state);
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(Claim::Missing);
        };

        let now = Utc::now();
        let claimed_before = cutoff(now, lease);
        let claimable = job.status.can_transition_to(JobStatus::Processing)
            && (job.status == JobStatus::Pending
                || job.claimed_at.is_some_and(|t| t < claimed_before));

        if !claimable {
            return Ok(if job.status.is_terminal() {
                Claim::AlreadyTerminal(job.clone())
            } else {
                Claim::Busy(job.clone())
            });
        }

        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.claimed_at = Some(now);
        job.updated_at = advance(job.updated_at);
        Ok(Claim::Claimed(job.clone()))
    }

    async fn finish_job(&self, job_id: Uuid, outcome: Outcome) -> Result<Finish, StoreError> {
        let mut state = lock(&self.state);
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(Finish::Missing);
        };

        if !job.status.can_transition_to(outcome.status()) {
            return Ok(if job.status.is_terminal() {
                Finish::AlreadyTerminal(job.clone())
            } else {
                Finish::NotClaimed(job.clone())
            });
        }

        job.status = outcome.status();
        job.result = outcome.result().cloned();
        job.error = outcome.error();
        job.updated_at = advance(job.updated_at);
        let job = job.clone();

        let extracted = outcome.result().map(|result| ExtractedData {
            id: Uuid::new_v4(),
            job_id: job.id,
            application_id: job.application_id.clone(),
            document_type: job.document_type,
            result: result.clone(),
            verification_status: VerificationStatus::Pending,
            notes: None,
            verified_by: None,
            verified_at: None,
            superseded_by: None,
            created_at: Utc::now(),
        });

        if let Some(current) = &extracted {
            for previous in state.extracted.values_mut().filter(|e| {
                e.application_id == current.application_id
                    && e.document_type == current.document_type
                    && e.superseded_by.is_none()
            }) {
                previous.superseded_by = Some(current.id);
            }
            state.extracted.insert(current.id, current.clone());
        }

        Ok(Finish::Transitioned { job, extracted })
    }

    async fn request_halt(&self, job_id: Uuid, reason: HaltReason) -> Result<HaltRequest, StoreError> {
        let mut state = lock(&self.state);
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(HaltRequest::Missing);
        };
        if job.status.is_terminal() {
            return Ok(HaltRequest::AlreadyTerminal(job.clone()));
        }
        job.halt_requested.get_or_insert(reason);
        Ok(HaltRequest::Recorded(job.clone()))
    }

    async fn halt_requested(&self, job_id: Uuid) -> Result<Option<HaltReason>, StoreError> {
        Ok(lock(&self.state)
            .jobs
            .get(&job_id)
            .and_then(|j| j.halt_requested))
    }

    async fn stalled_jobs(
        &self,
        pending_before: DateTime<Utc>,
        claimed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let state = lock(&self.state);
        let mut stalled: Vec<_> = state
            .jobs
            .values()
            .filter(|j| match j.status {
                JobStatus::Pending => j.updated_at < pending_before,
                JobStatus::Processing => j.claimed_at.is_some_and(|t| t < claimed_before),
                _ => false,
            })
            .map(|j| (j.updated_at, j.id))
            .collect();
        stalled.sort();
        Ok(stalled
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn load_extracted(&self, id: Uuid) -> Result<Option<ExtractedData>, StoreError> {
        Ok(lock(&self.state).extracted.get(&id).cloned())
    }

    async fn extracted_for_job(&self, job_id: Uuid) -> Result<Vec<ExtractedData>, StoreError> {
        let mut records: Vec<_> = lock(&self.state)
            .extracted
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        records.sort_by_key(|e| e.created_at);
        Ok(records)
    }

    async fn update_verification(
        &self,
        id: Uuid,
        decision: VerificationDecision,
    ) -> Result<VerifyOutcome, StoreError> {
        let mut state = lock(&self.state);
        let Some(record) = state.extracted.get_mut(&id) else {
            return Ok(VerifyOutcome::Missing);
        };
        if !record.is_open() {
            return Ok(VerifyOutcome::Conflict(record.clone()));
        }
        record.verification_status = decision.verdict.into();
        record.verified_by = Some(decision.verifier_id);
        record.verified_at = Some(decision.decided_at);
        record.notes = decision.notes;
        Ok(VerifyOutcome::Updated(record.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// [`ObjectStore`] over a map of keys to bytes.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        lock(&self.objects).insert(key.to_string(), data.to_vec());
    }

    pub fn remove(&self, key: &str) {
        lock(&self.objects).remove(key);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put_object(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        self.insert(key, data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(lock(&self.objects).contains_key(key))
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<String>,
    in_flight: Vec<String>,
}

/// [`TaskQueue`] with the Redis list semantics: FIFO plus an in-flight list.
pub struct MemoryQueue<T> {
    state: Mutex<QueueState>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Default for MemoryQueue<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            _payload: PhantomData,
        }
    }
}

impl<T> MemoryQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight.len()
    }
}

impl<T: DeserializeOwned> MemoryQueue<T> {
    /// Everything waiting to be delivered, oldest first.
    pub fn pending(&self) -> Vec<T> {
        lock(&self.state)
            .ready
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }
}

#[async_trait]
impl<T> TaskQueue<T> for MemoryQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn enqueue(&self, item: &T) -> Result<(), QueueError> {
        let raw = serde_json::to_string(item)?;
        lock(&self.state).ready.push_back(raw);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery<T>>, QueueError> {
        let mut state = lock(&self.state);
        let Some(raw) = state.ready.pop_front() else {
            return Ok(None);
        };
        let payload = serde_json::from_str(&raw)?;
        state.in_flight.push(raw.clone());
        Ok(Some(Delivery { payload, raw }))
    }

    async fn ack(&self, delivery: &Delivery<T>) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if let Some(pos) = state.in_flight.iter().position(|r| *r == delivery.raw) {
            state.in_flight.remove(pos);
        }
        Ok(())
    }

    async fn release(&self, delivery: &Delivery<T>) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if let Some(pos) = state.in_flight.iter().position(|r| *r == delivery.raw) {
            state.in_flight.remove(pos);
        }
        state.ready.push_front(delivery.raw.clone());
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<u64, QueueError> {
        let mut state = lock(&self.state);
        let moved: Vec<String> = state.in_flight.drain(..).collect();
        let count = moved.len() as u64;
        for raw in moved.into_iter().rev() {
            state.ready.push_front(raw);
        }
        Ok(count)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(lock(&self.state).ready.len() as u64)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// [`ContactBook`] over a fixed map.
#[derive(Default)]
pub struct MemoryContactBook {
    contacts: Mutex<HashMap<String, Contact>>,
}

impl MemoryContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, contact: Contact) {
        lock(&self.contacts).insert(user_id.to_string(), contact);
    }
}

#[async_trait]
impl ContactBook for MemoryContactBook {
    async fn contact(&self, user_id: &str) -> Result<Option<Contact>, StoreError> {
        Ok(lock(&self.contacts).get(user_id).cloned())
    }
}
