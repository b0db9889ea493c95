use admission_docs::{
    config::AppConfig,
    db::{self, PgJobStore},
    models::{job::JobRef, notification::NotificationTask},
    services::{
        dispatcher::NotificationDispatcher,
        encryption::DocumentCipher,
        extraction::WorkersAiExtractor,
        queue::{channel_queue, RedisQueue, JOB_QUEUE},
        shutdown,
        storage::R2Client,
        worker::ExtractionWorker,
    },
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting document extraction worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    // The recorder has no scrape endpoint here; it keeps metric calls cheap
    // and consistent with the API process.
    let _metrics = telemetry::init_metrics().expect("Failed to install metrics recorder");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Initializing services");
    let cipher = DocumentCipher::new(&config.encryption_key).expect("Failed to initialize encryption");
    let objects = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        cipher,
    )
    .expect("Failed to initialize R2 client");

    let extractor = WorkersAiExtractor::new(
        &config.cf_account_id,
        &config.cf_api_token,
        &config.cf_model,
        config.http_timeout(),
    )
    .expect("Failed to initialize Workers AI client");

    let queue = RedisQueue::<JobRef>::new(&config.redis_url, JOB_QUEUE).expect("Failed to initialize job queue");

    let mut dispatcher = NotificationDispatcher::new(config.notify_locale);
    for channel in config.channels() {
        let notify_queue = RedisQueue::<NotificationTask>::new(&config.redis_url, channel_queue(channel))
            .expect("Failed to initialize notification queue");
        dispatcher = dispatcher.with_channel(channel, Arc::new(notify_queue));
    }
    tracing::info!(
        channels = ?dispatcher.channels().collect::<Vec<_>>(),
        locale = %config.notify_locale,
        "Notification channels configured"
    );

    let worker = Arc::new(ExtractionWorker::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(objects),
        Arc::new(extractor),
        Arc::new(queue),
        dispatcher,
        config.worker_settings(),
    ));

    tracing::info!(concurrency = config.worker_concurrency, "Worker ready, starting job processing loops");

    worker.run(shutdown::on_ctrl_c("worker")).await;
}
