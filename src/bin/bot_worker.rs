use admission_docs::{
    config::AppConfig,
    db::{self, contacts::PgContactBook},
    models::notification::{Channel, NotificationTask},
    services::{
        notify::{bot::TelegramSender, worker::ChannelWorker},
        queue::{channel_queue, RedisQueue},
        shutdown,
    },
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting Telegram notification worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let _metrics = telemetry::init_metrics().expect("Failed to install metrics recorder");

    let token = config
        .telegram_bot_token
        .as_deref()
        .expect("TELEGRAM_BOT_TOKEN is required for the bot worker");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    let contacts = Arc::new(PgContactBook::new(db_pool));

    let sender = TelegramSender::new(token, contacts, config.http_timeout())
        .expect("Failed to initialize Telegram client");

    let queue = RedisQueue::<NotificationTask>::new(&config.redis_url, channel_queue(Channel::Bot))
        .expect("Failed to initialize notification queue");

    let worker = ChannelWorker::new(
        Arc::new(queue),
        Arc::new(sender),
        config.delivery_backoff(),
        config.poll_interval(),
    );

    worker.run(shutdown::on_ctrl_c("bot_worker")).await;
}
