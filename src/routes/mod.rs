use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod error;
pub mod files;
pub mod health;
pub mod jobs;
pub mod verify;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Builds the HTTP API. `/metrics` is mounted only when a recorder handle is given.
pub fn router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let api: Router = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/files", post(files::upload_file))
        .route("/api/v1/jobs", post(jobs::submit_job))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job))
        .route("/api/v1/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .route("/api/v1/jobs/{job_id}/halt", post(jobs::halt_job))
        .route("/api/v1/jobs/{job_id}/extracted", get(jobs::job_extractions))
        .route(
            "/api/v1/applications/{application_id}/jobs",
            get(jobs::application_jobs),
        )
        .route(
            "/api/v1/extracted/{id}/verify",
            post(verify::verify_extracted),
        )
        .with_state(state);

    let api = match metrics {
        Some(handle) => api.route("/metrics", get(prometheus_metrics).with_state(handle)),
        None => api,
    };

    api.layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // Multipart framing on top of the largest file.
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES + 64 * 1024))
}

/// GET /metrics — Prometheus text exposition.
async fn prometheus_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
