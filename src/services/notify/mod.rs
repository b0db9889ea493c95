//! Notification delivery: one sender and one worker per channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::notification::{Channel, NotificationTask};
use crate::services::store::StoreError;

pub mod bot;
pub mod email;
pub mod worker;

/// Where an applicant can be reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub email: Option<String>,
    pub telegram_chat_id: Option<String>,
}

/// Lookup of applicant contact details.
#[async_trait]
pub trait ContactBook: Send + Sync {
    async fn contact(&self, user_id: &str) -> Result<Option<Contact>, StoreError>;
}

/// Delivers a task over one medium.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, task: &NotificationTask) -> Result<(), DeliveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Network failure, timeout, rate limit or 5xx.
    #[error("Delivery temporarily failed: {0}")]
    Transient(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("No {channel} contact for user {user_id}")]
    NoRecipient { channel: Channel, user_id: String },
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }

    pub(crate) fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            DeliveryError::Transient(err.to_string())
        } else {
            DeliveryError::Rejected(err.to_string())
        }
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            DeliveryError::Transient(format!("{status}: {body}"))
        } else {
            DeliveryError::Rejected(format!("{status}: {body}"))
        }
    }
}

impl From<StoreError> for DeliveryError {
    fn from(err: StoreError) -> Self {
        DeliveryError::Transient(format!("contact lookup failed: {err}"))
    }
}
