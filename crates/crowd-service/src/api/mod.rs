pub mod routes;

use crate::state::CrowdServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the API router
pub fn router(state: CrowdServiceState) -> Router {
    let limits = state.limits();

    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Classification endpoints
        .route("/detect-crowd", post(routes::detect_crowd))
        .route("/detect-crowd/upload", post(routes::detect_crowd_upload))
        .route("/v1/frames", post(routes::detect_frames))
        .layer(DefaultBodyLimit::max(limits.max_upload_bytes))
        .layer(TimeoutLayer::new(limits.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            telemetry::http_tracing::trace_http_request,
        ))
        .with_state(state)
}
