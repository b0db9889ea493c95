use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::models::notification::{Channel, NotificationTask};
use crate::models::reason;
use crate::services::notify::{ChannelSender, ContactBook, DeliveryError};

/// Sends outcome emails through an HTTP mail relay.
pub struct EmailSender {
    http: Client,
    api_url: String,
    api_token: String,
    from: String,
    contacts: Arc<dyn ContactBook>,
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

impl EmailSender {
    pub fn new(
        api_url: &str,
        api_token: &str,
        from: &str,
        contacts: Arc<dyn ContactBook>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            api_url: api_url.to_string(),
            api_token: api_token.to_string(),
            from: from.to_string(),
            contacts,
        })
    }
}

fn body_text(task: &NotificationTask) -> String {
    let details =
        reason::reference_details(task.locale, &task.application_id, task.document_type, task.job_id);
    format!("{}\n\n{details}", task.message)
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, task: &NotificationTask) -> Result<(), DeliveryError> {
        let to = self
            .contacts
            .contact(&task.user_id)
            .await?
            .and_then(|c| c.email)
            .ok_or_else(|| DeliveryError::NoRecipient {
                channel: Channel::Email,
                user_id: task.user_id.clone(),
            })?;

        let request = MailRequest {
            from: &self.from,
            to: &to,
            subject: &task.subject,
            text: body_text(task),
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(DeliveryError::from_http)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::from_status(status, body))
        }
    }
}
