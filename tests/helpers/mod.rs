//! In-process pipeline wiring and scripted external services.

#![allow(dead_code)]

use admission_docs::auth::{RequestContext, Role};
use admission_docs::models::api::SubmitJobRequest;
use admission_docs::models::job::{DocumentProcessJob, DocumentType, HaltReason, JobRef};
use admission_docs::models::notification::{Channel, NotificationTask};
use admission_docs::models::reason::Locale;
use admission_docs::services::dispatcher::NotificationDispatcher;
use admission_docs::services::extraction::{ExtractionFailure, Extractor, FailureKind};
use admission_docs::services::intake::Intake;
use admission_docs::services::memory::{MemoryJobStore, MemoryObjectStore, MemoryQueue};
use admission_docs::services::notify::{ChannelSender, DeliveryError};
use admission_docs::services::retry::Backoff;
use admission_docs::services::store::JobStore;
use admission_docs::services::verification::VerificationGate;
use admission_docs::services::worker::{ExtractionWorker, WorkerSettings};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::fixtures;

/// A scripted answer from the extraction engine.
#[derive(Debug, Clone)]
pub enum Script {
    Fields(Value),
    Fail(FailureKind),
}

/// Extraction engine that answers from a script and counts its calls.
///
/// Once the script runs out it returns valid fields for the requested type.
#[derive(Default)]
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    halt_on_call: Mutex<Option<(Arc<dyn JobStore>, Uuid, HaltReason)>>,
    on_call: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ScriptedExtractor {
    pub fn push(&self, answer: Script) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records a halt signal for `job_id` while the next extraction is in progress.
    pub fn halt_during_next_call(&self, store: Arc<dyn JobStore>, job_id: Uuid, reason: HaltReason) {
        *self.halt_on_call.lock().unwrap() = Some((store, job_id, reason));
    }

    /// Runs `hook` while the next extraction is in progress.
    pub fn during_next_call(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(
        &self,
        _document: &[u8],
        document_type: DocumentType,
    ) -> Result<Value, ExtractionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let halt = self.halt_on_call.lock().unwrap().take();
        if let Some((store, job_id, reason)) = halt {
            store.request_halt(job_id, reason).await.unwrap();
        }
        let hook = self.on_call.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Fields(fields)) => Ok(fields),
            Some(Script::Fail(kind)) => Err(ExtractionFailure::new(kind, "scripted failure")),
            None => Ok(fixtures::valid_fields(document_type)),
        }
    }
}

/// Channel sender that records what it delivered and fails on request.
pub struct RecordingSender {
    channel: Channel,
    delivered: Mutex<Vec<NotificationTask>>,
    failures: Mutex<VecDeque<DeliveryError>>,
    attempts: AtomicUsize,
}

impl RecordingSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            delivered: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, error: DeliveryError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn delivered(&self) -> Vec<NotificationTask> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, task: &NotificationTask) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.delivered.lock().unwrap().push(task.clone());
        Ok(())
    }
}

pub fn fast_backoff() -> Backoff {
    Backoff::new(3, Duration::from_millis(1), Duration::from_millis(5))
}

pub fn test_settings() -> WorkerSettings {
    WorkerSettings {
        concurrency: 1,
        backoff: fast_backoff(),
        claim_lease: Duration::from_secs(300),
        stall_after: Duration::from_secs(60),
        sweep_interval: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
    }
}

pub fn applicant(user_id: &str) -> RequestContext {
    RequestContext::new(user_id, vec![Role::Applicant])
}

pub fn verifier() -> RequestContext {
    RequestContext::new("verifier-1", vec![Role::Verifier])
}

pub fn admin() -> RequestContext {
    RequestContext::new("admin-1", vec![Role::Admin])
}

/// The whole pipeline on in-memory backends.
pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub jobs: Arc<MemoryQueue<JobRef>>,
    pub email: Arc<MemoryQueue<NotificationTask>>,
    pub bot: Arc<MemoryQueue<NotificationTask>>,
    pub extractor: Arc<ScriptedExtractor>,
    pub intake: Intake,
    pub gate: VerificationGate,
    pub worker: ExtractionWorker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_locale(Locale::En)
    }

    pub fn with_locale(locale: Locale) -> Self {
        Self::build(locale, test_settings())
    }

    pub fn with_settings(settings: WorkerSettings) -> Self {
        Self::build(Locale::En, settings)
    }

    fn build(locale: Locale, settings: WorkerSettings) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let jobs = Arc::new(MemoryQueue::<JobRef>::new());
        let email = Arc::new(MemoryQueue::<NotificationTask>::new());
        let bot = Arc::new(MemoryQueue::<NotificationTask>::new());
        let extractor = Arc::new(ScriptedExtractor::default());

        let dispatcher = NotificationDispatcher::new(locale)
            .with_channel(Channel::Email, email.clone())
            .with_channel(Channel::Bot, bot.clone());

        let intake = Intake::new(store.clone(), objects.clone(), jobs.clone());
        let gate = VerificationGate::new(store.clone());
        let worker = ExtractionWorker::new(
            store.clone(),
            objects.clone(),
            extractor.clone(),
            jobs.clone(),
            dispatcher,
            settings,
        );

        Self {
            store,
            objects,
            jobs,
            email,
            bot,
            extractor,
            intake,
            gate,
            worker,
        }
    }

    /// Uploads the fixture for `document_type` as `ctx` and submits a job for it.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        application_id: &str,
        document_type: DocumentType,
    ) -> DocumentProcessJob {
        let fixture = fixtures::fixture(document_type);
        let file_id = self
            .intake
            .upload(ctx, fixture.file_name, fixture.bytes)
            .await
            .expect("upload");
        self.intake
            .submit(
                ctx,
                SubmitJobRequest {
                    application_id: application_id.to_string(),
                    document_type: document_type.to_string(),
                    file_id,
                    file_name: fixture.file_name.to_string(),
                },
            )
            .await
            .expect("submit")
    }

    pub async fn job(&self, job_id: Uuid) -> DocumentProcessJob {
        self.store
            .load_job(job_id)
            .await
            .unwrap()
            .expect("job exists")
    }

    /// Processes queued job references until the queue is empty.
    pub async fn drain(&self) -> usize {
        let mut handled = 0;
        while self.worker.process_next().await.unwrap().is_some() {
            handled += 1;
        }
        handled
    }

    pub fn notifications(&self) -> Vec<NotificationTask> {
        let mut tasks = self.email.pending();
        tasks.extend(self.bot.pending());
        tasks
    }
}
