use serde::Deserialize;
use std::time::Duration;

use crate::models::notification::Channel;
use crate::models::reason::Locale;
use crate::services::retry::Backoff;
use crate::services::worker::WorkerSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job and notification queues
    pub redis_url: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// Workers AI vision model used for extraction
    #[serde(default = "default_cf_model")]
    pub cf_model: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// AES-256-GCM encryption key (base64-encoded, 32 bytes)
    pub encryption_key: String,

    /// HS256 secret for bearer tokens
    pub jwt_secret: String,

    /// Mail relay endpoint, token and sender. Required by the email worker only.
    pub mail_api_url: Option<String>,
    pub mail_api_token: Option<String>,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Telegram bot token. Required by the bot worker only.
    pub telegram_bot_token: Option<String>,

    /// Language of notification texts: "vi" or "en"
    #[serde(default)]
    pub notify_locale: Locale,

    /// Comma-separated channels that receive a task per finished job
    #[serde(default = "default_notify_channels")]
    pub notify_channels: String,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_extraction_max_attempts")]
    pub extraction_max_attempts: u32,

    #[serde(default = "default_delivery_max_attempts")]
    pub delivery_max_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,

    #[serde(default = "default_stall_after_secs")]
    pub stall_after_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout for outbound HTTP calls (extraction, mail relay, Telegram)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_cf_model() -> String {
    "@cf/meta/llama-3.2-11b-vision-instruct".to_string()
}

fn default_mail_from() -> String {
    "tuyensinh@localhost".to_string()
}

fn default_notify_channels() -> String {
    "email,bot".to_string()
}

fn default_worker_concurrency() -> usize {
    2
}

fn default_extraction_max_attempts() -> u32 {
    3
}

fn default_delivery_max_attempts() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_claim_lease_secs() -> u64 {
    600
}

fn default_stall_after_secs() -> u64 {
    900
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Parsed `NOTIFY_CHANNELS`. Unknown names are skipped with a warning.
    pub fn channels(&self) -> Vec<Channel> {
        parse_channels(&self.notify_channels)
    }

    pub fn extraction_backoff(&self) -> Backoff {
        self.backoff(self.extraction_max_attempts)
    }

    pub fn delivery_backoff(&self) -> Backoff {
        self.backoff(self.delivery_max_attempts)
    }

    fn backoff(&self, max_attempts: u32) -> Backoff {
        Backoff::new(
            max_attempts,
            Duration::from_millis(self.retry_base_ms),
            Duration::from_millis(self.retry_max_ms),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.worker_concurrency.max(1),
            backoff: self.extraction_backoff(),
            claim_lease: Duration::from_secs(self.claim_lease_secs),
            stall_after: Duration::from_secs(self.stall_after_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            poll_interval: self.poll_interval(),
        }
    }
}

fn parse_channels(raw: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name.parse::<Channel>() {
            Ok(channel) if !channels.contains(&channel) => channels.push(channel),
            Ok(_) => {}
            Err(_) => tracing::warn!(channel = name, "Ignoring unknown notification channel"),
        }
    }
    channels
}
