use admission_docs::{
    app_state::AppState,
    auth::TokenVerifier,
    config::AppConfig,
    db::{self, PgJobStore},
    models::job::JobRef,
    routes,
    services::{
        encryption::DocumentCipher,
        queue::{RedisQueue, JOB_QUEUE},
        storage::R2Client,
    },
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing admission document API");

    let prometheus_handle = telemetry::init_metrics().expect("Failed to install Prometheus metrics recorder");

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing R2 storage client with AES-256-GCM at rest");
    let cipher = DocumentCipher::new(&config.encryption_key).expect("Failed to initialize encryption");
    let objects = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        cipher,
    )
    .expect("Failed to initialize R2 client");

    tracing::info!("Connecting to Redis job queue");
    let queue = RedisQueue::<JobRef>::new(&config.redis_url, JOB_QUEUE).expect("Failed to initialize job queue");

    let state = AppState::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(objects),
        Arc::new(queue),
        TokenVerifier::new(&config.jwt_secret),
    );

    let app = routes::router(state, Some(prometheus_handle));

    tracing::info!("Starting admission document API on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
