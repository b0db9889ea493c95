//! Pipeline behaviour on in-memory backends: intake, extraction worker,
//! verification gate, dispatcher and channel workers.

mod fixtures;
mod helpers;

use admission_docs::models::api::SubmitJobRequest;
use admission_docs::models::extracted::{Verdict, VerificationStatus};
use admission_docs::models::job::{DocumentType, HaltReason, JobRef, JobStatus};
use admission_docs::models::notification::{Channel, NotificationTask};
use admission_docs::models::reason::{self, ApplicationFailedReason, Locale};
use admission_docs::services::extraction::FailureKind;
use admission_docs::services::intake::IntakeError;
use admission_docs::services::memory::MemoryQueue;
use admission_docs::services::notify::worker::{ChannelWorker, DeliveryOutcome};
use admission_docs::services::notify::DeliveryError;
use admission_docs::services::queue::TaskQueue;
use admission_docs::services::shutdown;
use admission_docs::services::store::{Claim, JobStore};
use admission_docs::services::verification::VerificationError;
use admission_docs::services::worker::{ProcessOutcome, SkipReason, WorkerSettings};
use helpers::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;

const APPLICATION: &str = "HS-2025-0042";

#[tokio::test]
async fn test_successful_extraction_notifies_every_channel() {
    let h = Harness::new();
    let ctx = applicant("student-1");
    let job = h.submit(&ctx, APPLICATION, DocumentType::Transcript).await;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(h.jobs.pending(), vec![JobRef { job_id: job.id }]);

    let outcome = h.worker.process_next().await.unwrap();
    assert_eq!(
        outcome,
        Some(ProcessOutcome::Finished {
            status: JobStatus::Completed,
            notified: 2
        })
    );

    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.error, None);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.result.as_ref().unwrap()["school_name"], "THPT Chu Văn An");
    assert!(job.outcome_fields_consistent());

    let extracted = h.gate.extracted_for_job(job.id).await.unwrap();
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].verification_status, VerificationStatus::Pending);
    assert_eq!(Some(&extracted[0].result), job.result.as_ref());

    let tasks = h.notifications();
    assert_eq!(tasks.len(), 2);
    for task in &tasks {
        assert_eq!(task.job_id, job.id);
        assert_eq!(task.status, JobStatus::Completed);
        assert_eq!(task.reason, None);
        assert_eq!(task.message, reason::success_message(DocumentType::Transcript, Locale::En));
    }
    assert_eq!(h.email.pending()[0].channel, Channel::Email);
    assert_eq!(h.bot.pending()[0].channel, Channel::Bot);
    assert_eq!(h.jobs.in_flight(), 0);
}

#[tokio::test]
async fn test_invalid_format_fails_with_reason_and_two_tasks() {
    let h = Harness::new();
    h.extractor.push(Script::Fail(FailureKind::InvalidFormat));
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Certificate).await;

    h.drain().await;

    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error,
        Some(ApplicationFailedReason::DocumentProcessingFailedInvalidFormat)
    );
    assert!(job.result.is_none());
    assert_eq!(h.extractor.calls(), 1);
    assert!(h.gate.extracted_for_job(job.id).await.unwrap().is_empty());

    let tasks = h.notifications();
    assert_eq!(tasks.len(), 2);
    let expected = ApplicationFailedReason::DocumentProcessingFailedInvalidFormat.message(Locale::En);
    assert!(tasks.iter().all(|t| t.message == expected && t.reason == job.error));
}

#[tokio::test]
async fn test_missing_object_fails_without_calling_extractor() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Identity).await;
    h.objects.remove(&job.file_id);

    h.drain().await;

    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, Some(ApplicationFailedReason::DocumentNotFound));
    assert_eq!(h.extractor.calls(), 0);
    assert_eq!(h.notifications().len(), 2);
}

#[tokio::test]
async fn test_reject_then_second_verdict_conflicts() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    h.drain().await;
    let job_after_processing = h.job(job.id).await;
    let record = h.gate.extracted_for_job(job.id).await.unwrap().remove(0);

    let rejected = h
        .gate
        .verify(&verifier(), record.id, Verdict::Rejected, Some("  GPA does not match  ".into()))
        .await
        .unwrap();
    assert_eq!(rejected.verification_status, VerificationStatus::Rejected);
    assert_eq!(rejected.verified_by.as_deref(), Some("verifier-1"));
    assert_eq!(rejected.notes.as_deref(), Some("GPA does not match"));

    let second = h.gate.verify(&verifier(), record.id, Verdict::Verified, None).await;
    assert!(matches!(
        second,
        Err(VerificationError::Conflict {
            status: VerificationStatus::Rejected,
            superseded: false
        })
    ));

    let stored = h.gate.extracted_for_job(job.id).await.unwrap().remove(0);
    assert_eq!(stored, rejected);
    // Verification never touches the job.
    assert_eq!(h.job(job.id).await, job_after_processing);
}

#[tokio::test]
async fn test_verify_unknown_record_is_not_found() {
    let h = Harness::new();
    let result = h
        .gate
        .verify(&verifier(), uuid::Uuid::new_v4(), Verdict::Verified, None)
        .await;
    assert!(matches!(result, Err(VerificationError::NotFound)));
}

#[tokio::test]
async fn test_redelivery_of_finished_job_is_a_no_op() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::BirthCertificate).await;
    h.drain().await;
    let finished = h.job(job.id).await;
    let notifications = h.notifications().len();

    h.jobs.enqueue(&JobRef { job_id: job.id }).await.unwrap();
    let outcome = h.worker.process_next().await.unwrap();

    assert_eq!(outcome, Some(ProcessOutcome::Skipped(SkipReason::AlreadyTerminal)));
    assert_eq!(h.job(job.id).await, finished);
    assert_eq!(h.job(job.id).await.updated_at, finished.updated_at);
    assert_eq!(h.notifications().len(), notifications);
    assert_eq!(h.extractor.calls(), 1);
    assert_eq!(h.jobs.in_flight(), 0);
}

#[tokio::test]
async fn test_duplicate_messages_process_once() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    h.jobs.enqueue(&JobRef { job_id: job.id }).await.unwrap();

    let job_ref = JobRef { job_id: job.id };
    let attempts = (0..4).map(|_| h.worker.process(&job_ref));
    let finished = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|outcome| outcome.unwrap())
        .filter(|o| matches!(o, ProcessOutcome::Finished { .. }))
        .count();

    assert_eq!(finished, 1);
    assert_eq!(h.notifications().len(), 2);
    assert_eq!(h.gate.extracted_for_job(job.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_message_for_unknown_job_is_dropped() {
    let h = Harness::new();
    h.jobs.enqueue(&JobRef { job_id: uuid::Uuid::new_v4() }).await.unwrap();

    let outcome = h.worker.process_next().await.unwrap();
    assert_eq!(outcome, Some(ProcessOutcome::Skipped(SkipReason::Missing)));
    assert_eq!(h.jobs.in_flight(), 0);
    assert!(h.notifications().is_empty());
}

#[tokio::test]
async fn test_cancel_before_processing_skips_extraction() {
    let h = Harness::new();
    let ctx = applicant("student-1");
    let job = h.submit(&ctx, APPLICATION, DocumentType::Transcript).await;

    let recorded = h.intake.cancel(&ctx, job.id).await.unwrap();
    assert_eq!(recorded.status, JobStatus::Pending);
    assert_eq!(recorded.halt_requested, Some(HaltReason::UserCancelled));

    h.drain().await;

    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::UserCancelled);
    assert_eq!(job.error, Some(ApplicationFailedReason::UserCancelled));
    assert!(job.result.is_none());
    assert_eq!(h.extractor.calls(), 0);
    assert_eq!(h.notifications().len(), 2);
}

#[tokio::test]
async fn test_cancel_during_extraction_discards_result() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    h.extractor
        .halt_during_next_call(h.store.clone(), job.id, HaltReason::UserCancelled);

    h.drain().await;

    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::UserCancelled);
    assert!(job.result.is_none());
    assert_eq!(h.extractor.calls(), 1);
    assert!(h.gate.extracted_for_job(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_finished_job_is_rejected() {
    let h = Harness::new();
    let ctx = applicant("student-1");
    let job = h.submit(&ctx, APPLICATION, DocumentType::Transcript).await;
    h.drain().await;

    let result = h.intake.cancel(&ctx, job.id).await;
    assert!(matches!(result, Err(IntakeError::AlreadyFinished(JobStatus::Completed))));
    assert_eq!(h.job(job.id).await.halt_requested, None);
}

#[tokio::test]
async fn test_cancel_is_limited_to_owner() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

    let result = h.intake.cancel(&applicant("student-2"), job.id).await;
    assert!(matches!(result, Err(IntakeError::NotFound)));

    // Verifiers can see the job but not cancel it.
    let result = h.intake.cancel(&verifier(), job.id).await;
    assert!(matches!(result, Err(IntakeError::Forbidden)));

    h.intake.cancel(&admin(), job.id).await.unwrap();
}

#[tokio::test]
async fn test_report_missing_applicant_and_document() {
    let h = Harness::new();
    let first = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Identity).await;
    let second = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Certificate).await;

    let denied = h
        .intake
        .report_missing(&applicant("student-1"), first.id, HaltReason::UserNotFound)
        .await;
    assert!(matches!(denied, Err(IntakeError::Forbidden)));

    h.intake
        .report_missing(&admin(), first.id, HaltReason::UserNotFound)
        .await
        .unwrap();
    h.intake
        .report_missing(&admin(), second.id, HaltReason::DocumentNotFound)
        .await
        .unwrap();
    // The first signal wins.
    h.intake
        .report_missing(&admin(), first.id, HaltReason::DocumentNotFound)
        .await
        .unwrap();

    h.drain().await;

    let first = h.job(first.id).await;
    assert_eq!(first.status, JobStatus::UserNotFound);
    assert_eq!(first.error, Some(ApplicationFailedReason::UserNotFound));
    let second = h.job(second.id).await;
    assert_eq!(second.status, JobStatus::DocumentNotFound);
    assert_eq!(second.error, Some(ApplicationFailedReason::DocumentNotFound));
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let h = Harness::new();
    h.extractor.push(Script::Fail(FailureKind::Transient));
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

    h.drain().await;

    assert_eq!(h.job(job.id).await.status, JobStatus::Completed);
    assert_eq!(h.extractor.calls(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_fail_generically() {
    let h = Harness::new();
    for _ in 0..3 {
        h.extractor.push(Script::Fail(FailureKind::Transient));
    }
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

    h.drain().await;

    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, Some(ApplicationFailedReason::DocumentProcessingFailed));
    assert_eq!(h.extractor.calls(), 3);
}

#[tokio::test]
async fn test_conclusive_failures_are_not_retried() {
    let cases = [
        (FailureKind::InvalidFileType, ApplicationFailedReason::DocumentProcessingFailedInvalidFileType),
        (FailureKind::QualityCheckFailed, ApplicationFailedReason::DocumentQualityCheckFailed),
        (FailureKind::InvalidData, ApplicationFailedReason::DocumentProcessingFailedInvalidData),
        (FailureKind::InformationMissing, ApplicationFailedReason::InformationMissing),
        (FailureKind::Fatal, ApplicationFailedReason::DocumentProcessingFailed),
    ];
    for (kind, reason) in cases {
        let h = Harness::new();
        h.extractor.push(Script::Fail(kind));
        let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

        h.drain().await;

        let job = h.job(job.id).await;
        assert_eq!(job.status, JobStatus::Failed, "{kind:?}");
        assert_eq!(job.error, Some(reason), "{kind:?}");
        assert_eq!(h.extractor.calls(), 1, "{kind:?}");
    }
}

#[tokio::test]
async fn test_incomplete_or_invalid_fields_fail() {
    let h = Harness::new();
    h.extractor.push(Script::Fields(json!({
        "full_name": "Nguyễn Văn An",
        "school_name": "",
        "academic_year": "2023-2024",
        "gpa": 8.0
    })));
    h.extractor.push(Script::Fields(json!({
        "full_name": "Nguyễn Văn An",
        "school_name": "THPT Chu Văn An",
        "academic_year": "2023-2024",
        "gpa": 12.5
    })));
    let incomplete = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    let invalid = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

    h.drain().await;

    assert_eq!(
        h.job(incomplete.id).await.error,
        Some(ApplicationFailedReason::InformationMissing)
    );
    assert_eq!(
        h.job(invalid.id).await.error,
        Some(ApplicationFailedReason::DocumentProcessingFailedInvalidData)
    );
}

#[tokio::test]
async fn test_new_extraction_supersedes_previous_record() {
    let h = Harness::new();
    let ctx = applicant("student-1");
    let first = h.submit(&ctx, APPLICATION, DocumentType::Transcript).await;
    h.drain().await;
    let second = h.submit(&ctx, APPLICATION, DocumentType::Transcript).await;
    // A different document type of the same application is unaffected.
    let identity = h.submit(&ctx, APPLICATION, DocumentType::Identity).await;
    h.drain().await;

    let old = h.gate.extracted_for_job(first.id).await.unwrap().remove(0);
    let new = h.gate.extracted_for_job(second.id).await.unwrap().remove(0);
    let other = h.gate.extracted_for_job(identity.id).await.unwrap().remove(0);
    assert_eq!(old.superseded_by, Some(new.id));
    assert!(new.superseded_by.is_none());
    assert!(other.superseded_by.is_none());

    let result = h.gate.verify(&verifier(), old.id, Verdict::Verified, None).await;
    assert!(matches!(
        result,
        Err(VerificationError::Conflict { superseded: true, .. })
    ));
    h.gate.verify(&verifier(), new.id, Verdict::Verified, None).await.unwrap();
}

#[tokio::test]
async fn test_intake_rejections_create_no_job() {
    let h = Harness::new();
    let ctx = applicant("student-1");

    let not_uploaded = h
        .intake
        .submit(
            &ctx,
            SubmitJobRequest {
                application_id: APPLICATION.into(),
                document_type: "transcript".into(),
                file_id: "uploads/student-1/never-uploaded.pdf".into(),
                file_name: "never-uploaded.pdf".into(),
            },
        )
        .await;
    match not_uploaded {
        Err(e) => assert_eq!(e.reason(), Some(ApplicationFailedReason::DocumentNotUploaded)),
        Ok(job) => panic!("unexpected job {}", job.id),
    }

    let file_id = h.intake.upload(&ctx, "scan.pdf", fixtures::PDF_BYTES).await.unwrap();
    let unknown_type = h
        .intake
        .submit(
            &ctx,
            SubmitJobRequest {
                application_id: APPLICATION.into(),
                document_type: "passport".into(),
                file_id: file_id.clone(),
                file_name: "scan.pdf".into(),
            },
        )
        .await;
    assert!(matches!(unknown_type, Err(IntakeError::UnknownDocumentType(_))));

    let empty_application = h
        .intake
        .submit(
            &ctx,
            SubmitJobRequest {
                application_id: String::new(),
                document_type: "transcript".into(),
                file_id: file_id.clone(),
                file_name: "scan.pdf".into(),
            },
        )
        .await;
    assert!(matches!(empty_application, Err(IntakeError::Invalid(_))));

    let someone_elses = h
        .intake
        .submit(
            &applicant("student-2"),
            SubmitJobRequest {
                application_id: APPLICATION.into(),
                document_type: "transcript".into(),
                file_id,
                file_name: "scan.pdf".into(),
            },
        )
        .await;
    assert!(matches!(someone_elses, Err(IntakeError::Forbidden)));

    assert!(h.store.all_jobs().is_empty());
    assert!(h.jobs.pending().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_unknown_file_types() {
    let h = Harness::new();
    let result = h
        .intake
        .upload(&applicant("student-1"), "notes.txt", b"just some text")
        .await;
    match result {
        Err(e) => assert_eq!(
            e.reason(),
            Some(ApplicationFailedReason::DocumentProcessingFailedInvalidFileType)
        ),
        Ok(key) => panic!("unexpected upload {key}"),
    }
}

#[tokio::test]
async fn test_jobs_are_scoped_to_their_owner() {
    let h = Harness::new();
    let mine = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    h.submit(&applicant("student-2"), APPLICATION, DocumentType::Transcript).await;

    let visible = h
        .intake
        .jobs_for_application(&applicant("student-1"), APPLICATION)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, mine.id);

    let all = h.intake.jobs_for_application(&verifier(), APPLICATION).await.unwrap();
    assert_eq!(all.len(), 2);

    assert!(matches!(
        h.intake.job(&applicant("student-2"), mine.id).await,
        Err(IntakeError::NotFound)
    ));
}

#[tokio::test]
async fn test_sweep_recovers_lost_message() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

    // The message disappears before any worker sees it.
    let lost = h.jobs.dequeue().await.unwrap().unwrap();
    h.jobs.ack(&lost).await.unwrap();

    assert_eq!(h.worker.sweep().await.unwrap(), 0, "fresh jobs are left alone");

    h.store.expire_claim(job.id, Duration::from_secs(120));
    assert_eq!(h.worker.sweep().await.unwrap(), 1);

    h.drain().await;
    assert_eq!(h.job(job.id).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_sweep_reclaims_abandoned_processing_job() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

    // A worker claimed the job and died.
    let delivery = h.jobs.dequeue().await.unwrap().unwrap();
    assert!(matches!(
        h.store.claim_job(job.id, Duration::from_secs(300)).await.unwrap(),
        Claim::Claimed(_)
    ));
    h.jobs.ack(&delivery).await.unwrap();

    h.jobs.enqueue(&JobRef { job_id: job.id }).await.unwrap();
    assert_eq!(
        h.worker.process_next().await.unwrap(),
        Some(ProcessOutcome::Skipped(SkipReason::Busy))
    );

    h.store.expire_claim(job.id, Duration::from_secs(600));
    assert_eq!(h.worker.sweep().await.unwrap(), 1);
    h.drain().await;

    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    assert_eq!(h.notifications().len(), 2);
}

#[tokio::test]
async fn test_sweep_tolerates_oversized_windows() {
    let h = Harness::with_settings(WorkerSettings {
        claim_lease: Duration::from_secs(u64::MAX),
        stall_after: Duration::MAX,
        ..test_settings()
    });
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    let lost = h.jobs.dequeue().await.unwrap().unwrap();
    h.jobs.ack(&lost).await.unwrap();
    h.store.expire_claim(job.id, Duration::from_secs(3600));

    assert_eq!(h.worker.sweep().await.unwrap(), 0);
    assert_eq!(h.job(job.id).await.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_notifications_use_configured_locale() {
    let h = Harness::with_locale(Locale::Vi);
    h.extractor.push(Script::Fail(FailureKind::QualityCheckFailed));
    h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;

    h.drain().await;

    let expected = ApplicationFailedReason::DocumentQualityCheckFailed.message(Locale::Vi);
    assert!(h.notifications().iter().all(|t| t.message == expected));
}

#[tokio::test]
async fn test_every_terminal_job_is_consistent() {
    let h = Harness::new();
    let ctx = applicant("student-1");
    h.extractor.push(Script::Fail(FailureKind::InvalidFormat));
    h.extractor.push(Script::Fields(json!({"full_name": "An"})));
    let mut ids = Vec::new();
    for document_type in DocumentType::iter() {
        ids.push(h.submit(&ctx, APPLICATION, document_type).await.id);
    }
    let cancelled = h.submit(&ctx, APPLICATION, DocumentType::Transcript).await;
    h.intake.cancel(&ctx, cancelled.id).await.unwrap();

    h.drain().await;

    let jobs = h.store.all_jobs();
    assert_eq!(jobs.len(), 5);
    for job in &jobs {
        assert!(job.status.is_terminal(), "{} left {}", job.id, job.status);
        assert!(job.outcome_fields_consistent(), "{job:?}");
    }
    // One task per channel for each terminal job.
    assert_eq!(h.notifications().len(), jobs.len() * 2);
}

#[tokio::test]
async fn test_worker_run_drains_queue_in_background() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    let worker = Arc::new(h.worker);
    let (trigger, stop) = shutdown::channel();
    let running = tokio::spawn(Arc::clone(&worker).run(stop));

    let mut status = JobStatus::Pending;
    for _ in 0..200 {
        status = h.store.load_job(job.id).await.unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(status, JobStatus::Completed);

    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("worker stops after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_during_extraction_finishes_the_job() {
    let h = Harness::new();
    let job = h.submit(&applicant("student-1"), APPLICATION, DocumentType::Transcript).await;
    let (trigger, stop) = shutdown::channel();
    h.extractor.during_next_call(move || trigger.trigger());

    let worker = Arc::new(h.worker);
    tokio::time::timeout(Duration::from_secs(5), Arc::clone(&worker).run(stop))
        .await
        .expect("worker stops after the job in hand");

    let finished = h.store.load_job(job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(h.jobs.depth().await.unwrap(), 0);
    assert_eq!(h.jobs.in_flight(), 0);
    assert_eq!(h.email.pending().len() + h.bot.pending().len(), 2);
    assert_eq!(h.extractor.calls(), 1);
}

#[tokio::test]
async fn test_channel_worker_stops_between_tasks() {
    let queue = Arc::new(MemoryQueue::<NotificationTask>::new());
    queue.enqueue(&notification(Channel::Email)).await.unwrap();
    queue.enqueue(&notification(Channel::Email)).await.unwrap();
    let sender = Arc::new(RecordingSender::new(Channel::Email));
    let worker = ChannelWorker::new(queue.clone(), sender.clone(), fast_backoff(), Duration::from_millis(5));

    let (trigger, stop) = shutdown::channel();
    let running = tokio::spawn(async move { worker.run(stop).await });
    for _ in 0..200 {
        if sender.delivered().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("channel worker stops after shutdown")
        .unwrap();

    assert_eq!(sender.delivered().len(), 2);
    assert_eq!(queue.in_flight(), 0);
}

fn notification(channel: Channel) -> NotificationTask {
    NotificationTask {
        id: uuid::Uuid::new_v4(),
        channel,
        job_id: uuid::Uuid::new_v4(),
        application_id: APPLICATION.into(),
        user_id: "student-1".into(),
        document_type: DocumentType::Transcript,
        status: JobStatus::Failed,
        reason: Some(ApplicationFailedReason::DocumentQualityCheckFailed),
        subject: reason::subject(DocumentType::Transcript, false, Locale::En),
        message: ApplicationFailedReason::DocumentQualityCheckFailed
            .message(Locale::En)
            .to_string(),
        locale: Locale::En,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_channel_worker_retries_transient_delivery() {
    let queue = Arc::new(MemoryQueue::<NotificationTask>::new());
    let sender = Arc::new(RecordingSender::new(Channel::Email));
    sender.fail_next(DeliveryError::Transient("relay returned 503".into()));
    let worker = ChannelWorker::new(queue.clone(), sender.clone(), fast_backoff(), Duration::from_millis(5));

    let task = notification(Channel::Email);
    queue.enqueue(&task).await.unwrap();

    assert_eq!(worker.process_next().await.unwrap(), Some(DeliveryOutcome::Delivered));
    assert_eq!(sender.attempts(), 2);
    assert_eq!(sender.delivered(), vec![task]);
    assert_eq!(queue.in_flight(), 0);
    assert_eq!(worker.process_next().await.unwrap(), None);
}

#[tokio::test]
async fn test_channel_worker_drops_rejected_delivery() {
    let queue = Arc::new(MemoryQueue::<NotificationTask>::new());
    let sender = Arc::new(RecordingSender::new(Channel::Bot));
    sender.fail_next(DeliveryError::NoRecipient {
        channel: Channel::Bot,
        user_id: "student-1".into(),
    });
    let worker = ChannelWorker::new(queue.clone(), sender.clone(), fast_backoff(), Duration::from_millis(5));

    queue.enqueue(&notification(Channel::Bot)).await.unwrap();
    // Routed to the wrong queue: never handed to the sender.
    queue.enqueue(&notification(Channel::Email)).await.unwrap();

    assert_eq!(worker.process_next().await.unwrap(), Some(DeliveryOutcome::Dropped));
    assert_eq!(worker.process_next().await.unwrap(), Some(DeliveryOutcome::Dropped));
    assert_eq!(sender.attempts(), 1);
    assert!(sender.delivered().is_empty());
    assert_eq!(queue.in_flight(), 0);
    assert!(queue.pending().is_empty());
}
