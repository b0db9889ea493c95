use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::models::notification::{Channel, NotificationTask};
use crate::services::notify::{ChannelSender, ContactBook, DeliveryError};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends outcome messages through the Telegram Bot API.
pub struct TelegramSender {
    http: Client,
    base_url: String,
    token: String,
    contacts: Arc<dyn ContactBook>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

#[derive(Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSender {
    pub fn new(
        token: &str,
        contacts: Arc<dyn ContactBook>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: TELEGRAM_API.to_string(),
            token: token.to_string(),
            contacts,
        })
    }
}

fn message_text(task: &NotificationTask) -> String {
    format!("{}\n{}\n(#{})", task.subject, task.message, task.application_id)
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn channel(&self) -> Channel {
        Channel::Bot
    }

    async fn send(&self, task: &NotificationTask) -> Result<(), DeliveryError> {
        let chat_id = self
            .contacts
            .contact(&task.user_id)
            .await?
            .and_then(|c| c.telegram_chat_id)
            .ok_or_else(|| DeliveryError::NoRecipient {
                channel: Channel::Bot,
                user_id: task.user_id.clone(),
            })?;

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .http
            .post(&url)
            .json(&SendMessage {
                chat_id: &chat_id,
                text: message_text(task),
            })
            .send()
            .await
            .map_err(DeliveryError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::from_status(status, body));
        }

        let reply: TelegramReply = response.json().await.map_err(DeliveryError::from_http)?;
        if reply.ok {
            Ok(())
        } else {
            Err(DeliveryError::Rejected(
                reply.description.unwrap_or_else(|| "telegram returned ok=false".to_string()),
            ))
        }
    }
}
