use std::sync::Arc;

use crate::models::job::DocumentProcessJob;
use crate::models::notification::{Channel, NotificationTask};
use crate::models::reason::Locale;
use crate::services::queue::TaskQueue;

/// Fans a terminal job out to every configured channel queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    channels: Vec<(Channel, Arc<dyn TaskQueue<NotificationTask>>)>,
    locale: Locale,
}

impl NotificationDispatcher {
    pub fn new(locale: Locale) -> Self {
        Self {
            channels: Vec::new(),
            locale,
        }
    }

    pub fn with_channel(mut self, channel: Channel, queue: Arc<dyn TaskQueue<NotificationTask>>) -> Self {
        self.channels.push((channel, queue));
        self
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.channels.iter().map(|(c, _)| *c)
    }

    /// Enqueues one task per channel for a job that has just transitioned
    /// into a terminal state. Returns how many tasks were enqueued.
    ///
    /// Queue failures are logged and skipped; they never affect the job.
    pub async fn dispatch(&self, job: &DocumentProcessJob) -> usize {
        if !job.status.is_terminal() {
            tracing::warn!(job_id = %job.id, status = %job.status, "Refusing to notify for non-terminal job");
            return 0;
        }

        let mut enqueued = 0;
        for (channel, queue) in &self.channels {
            let task = NotificationTask::for_job(job, *channel, self.locale);
            match queue.enqueue(&task).await {
                Ok(()) => {
                    enqueued += 1;
                    metrics::counter!("notifications_enqueued_total", "channel" => channel.to_string())
                        .increment(1);
                    tracing::debug!(job_id = %job.id, channel = %channel, task_id = %task.id, "Notification enqueued");
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job.id,
                        channel = %channel,
                        error = %e,
                        "Failed to enqueue notification"
                    );
                }
            }
        }
        enqueued
    }
}
