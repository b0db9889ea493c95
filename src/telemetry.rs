use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// JSON logs filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}

/// Installs the Prometheus recorder and registers metric descriptions.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    metrics::describe_counter!(
        "document_jobs_submitted_total",
        "Document jobs accepted by intake"
    );
    metrics::describe_counter!(
        "document_jobs_finished_total",
        "Document jobs moved into a terminal state, by status"
    );
    metrics::describe_histogram!(
        "document_extraction_seconds",
        "Time spent in the extraction call, retries included"
    );
    metrics::describe_histogram!(
        "document_job_processing_seconds",
        "Time from claim to terminal state"
    );
    metrics::describe_gauge!(
        "document_queue_depth",
        "Job references waiting in the extraction queue"
    );
    metrics::describe_counter!(
        "notifications_enqueued_total",
        "Notification tasks enqueued, by channel"
    );
    metrics::describe_counter!(
        "notifications_delivered_total",
        "Notifications delivered, by channel"
    );
    metrics::describe_counter!(
        "notifications_dropped_total",
        "Notifications given up on, by channel"
    );
    metrics::describe_counter!(
        "extractions_verified_total",
        "Verification decisions recorded, by verdict"
    );
}
