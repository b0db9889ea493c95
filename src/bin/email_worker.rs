use admission_docs::{
    config::AppConfig,
    db::{self, contacts::PgContactBook},
    models::notification::{Channel, NotificationTask},
    services::{
        notify::{email::EmailSender, worker::ChannelWorker},
        queue::{channel_queue, RedisQueue},
        shutdown,
    },
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting email notification worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let _metrics = telemetry::init_metrics().expect("Failed to install metrics recorder");

    let api_url = config
        .mail_api_url
        .as_deref()
        .expect("MAIL_API_URL is required for the email worker");
    let api_token = config
        .mail_api_token
        .as_deref()
        .expect("MAIL_API_TOKEN is required for the email worker");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    let contacts = Arc::new(PgContactBook::new(db_pool));

    let sender = EmailSender::new(api_url, api_token, &config.mail_from, contacts, config.http_timeout())
        .expect("Failed to initialize mail relay client");

    let queue = RedisQueue::<NotificationTask>::new(&config.redis_url, channel_queue(Channel::Email))
        .expect("Failed to initialize notification queue");

    let worker = ChannelWorker::new(
        Arc::new(queue),
        Arc::new(sender),
        config.delivery_backoff(),
        config.poll_interval(),
    );

    worker.run(shutdown::on_ctrl_c("email_worker")).await;
}
