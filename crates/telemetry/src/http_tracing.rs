use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{error, info, warn, Instrument};

use crate::correlation::{extract_or_generate_correlation_id, CorrelationId, X_CORRELATION_ID};

/// Axum middleware that traces each request under a correlation ID and
/// echoes the ID back in `x-correlation-id`
pub async fn trace_http_request(mut req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let correlation_id = CorrelationId(extract_or_generate_correlation_id(req.headers()));
    req.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        correlation_id = %correlation_id,
    );

    let mut response = next.run(req).instrument(span.clone()).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    span.in_scope(|| match status {
        500..=599 => error!(status, latency_ms, "request failed (server error)"),
        400..=499 => warn!(status, latency_ms, "request failed (client error)"),
        _ => info!(status, latency_ms, "request completed"),
    });

    if let Some(value) = correlation_id.header_value() {
        response.headers_mut().insert(X_CORRELATION_ID, value);
    }

    response
}
