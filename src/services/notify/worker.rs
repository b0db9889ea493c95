use std::sync::Arc;
use std::time::Duration;

use crate::models::notification::NotificationTask;
use crate::services::notify::ChannelSender;
use crate::services::queue::{QueueError, TaskQueue};
use crate::services::retry::{retry, Backoff};
use crate::services::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Dropped,
}

/// Drains one channel's queue. Delivery problems stay here: they are retried,
/// then logged and dropped.
pub struct ChannelWorker {
    queue: Arc<dyn TaskQueue<NotificationTask>>,
    sender: Arc<dyn ChannelSender>,
    backoff: Backoff,
    poll_interval: Duration,
}

impl ChannelWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue<NotificationTask>>,
        sender: Arc<dyn ChannelSender>,
        backoff: Backoff,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            sender,
            backoff,
            poll_interval,
        }
    }

    /// Delivers the next task. `Ok(None)` when the queue is empty.
    pub async fn process_next(&self) -> Result<Option<DeliveryOutcome>, QueueError> {
        let Some(delivery) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        let task = &delivery.payload;
        let channel = self.sender.channel();

        let outcome = if task.channel != channel {
            tracing::error!(
                task_id = %task.id,
                expected = %channel,
                found = %task.channel,
                "Task routed to the wrong channel queue, dropping"
            );
            DeliveryOutcome::Dropped
        } else {
            let result = retry(
                &self.backoff,
                "notification_delivery",
                |e: &super::DeliveryError| e.is_transient(),
                || self.sender.send(task),
            )
            .await;

            match result {
                Ok(()) => {
                    metrics::counter!("notifications_delivered_total", "channel" => channel.to_string())
                        .increment(1);
                    tracing::info!(
                        task_id = %task.id,
                        job_id = %task.job_id,
                        channel = %channel,
                        "Notification delivered"
                    );
                    DeliveryOutcome::Delivered
                }
                Err(e) => {
                    metrics::counter!("notifications_dropped_total", "channel" => channel.to_string())
                        .increment(1);
                    tracing::warn!(
                        task_id = %task.id,
                        job_id = %task.job_id,
                        channel = %channel,
                        error = %e,
                        "Notification dropped"
                    );
                    DeliveryOutcome::Dropped
                }
            }
        };

        self.queue.ack(&delivery).await?;
        Ok(Some(outcome))
    }

    /// Delivers until `shutdown` fires. The signal is checked between tasks.
    pub async fn run(&self, mut shutdown: Shutdown) {
        match self.queue.recover_in_flight().await {
            Ok(0) => {}
            Ok(moved) => tracing::info!(moved, "Requeued notifications left in flight"),
            Err(e) => tracing::error!(error = %e, "Failed to recover in-flight notifications"),
        }

        while !shutdown.is_triggered() {
            match self.process_next().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    shutdown.sleep(self.poll_interval).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Notification queue error, will retry");
                    shutdown.sleep(self.poll_interval).await;
                }
            }
        }
        tracing::info!(channel = %self.sender.channel(), "Notification worker stopped");
    }
}
