use crate::error::ApiError;
use crate::pipeline::aggregate_verdict;
use crate::state::CrowdServiceState;
use axum::{
    extract::{
        multipart::MultipartError,
        rejection::JsonRejection,
        Multipart, State,
    },
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use common::crowd::{
    CrowdDetectRequest, CrowdDetectResponse, FrameSequenceRequest, FrameSequenceResponse,
    FrameVerdict,
};
use serde_json::json;

/// Multipart field carrying the uploaded image
pub const UPLOAD_FIELD: &str = "file";

pub const X_CROWD_STATUS: HeaderName = HeaderName::from_static("x-crowd-status");

fn json_rejection(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(rejection.body_text())
    } else {
        ApiError::bad_request(rejection.body_text())
    }
}

fn multipart_rejection(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// Classify an image stored in object storage
pub async fn detect_crowd(
    State(state): State<CrowdServiceState>,
    payload: Result<Json<CrowdDetectRequest>, JsonRejection>,
) -> Result<Json<CrowdDetectResponse>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    let response = state.detect_from_storage(&request).await?;
    Ok(Json(response))
}

/// Classify an uploaded image and return the annotated JPEG
pub async fn detect_crowd_upload(
    State(state): State<CrowdServiceState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_rejection)? {
        if field.name() == Some(UPLOAD_FIELD) {
            upload = Some(field.bytes().await.map_err(multipart_rejection)?);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| {
        ApiError::bad_request(format!("missing multipart field '{}'", UPLOAD_FIELD))
    })?;

    let outcome = state.pipeline().process_bytes(bytes.to_vec()).await?;
    let verdict = outcome.verdict();
    let person_count = outcome.person_count();
    let cluster_count = outcome.cluster_count();

    match outcome.into_annotated_image() {
        Some(image) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (
                    header::CONTENT_DISPOSITION,
                    "inline; filename=processed_image.jpg",
                ),
                (X_CROWD_STATUS, verdict.as_str()),
            ],
            image,
        )
            .into_response()),
        None => Ok((
            StatusCode::OK,
            [(X_CROWD_STATUS, verdict.as_str())],
            Json(CrowdDetectResponse {
                crowd_status: verdict,
                processed_image: None,
                processed_key: None,
                person_count,
                cluster_count,
            }),
        )
            .into_response()),
    }
}

/// Classify a short sequence of base64 frames
pub async fn detect_frames(
    State(state): State<CrowdServiceState>,
    payload: Result<Json<FrameSequenceRequest>, JsonRejection>,
) -> Result<Json<FrameSequenceResponse>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    let limits = state.limits();

    if request.frames.is_empty() {
        return Err(ApiError::bad_request("frames must not be empty"));
    }
    if request.frames.len() > limits.max_frames {
        return Err(ApiError::PayloadTooLarge(format!(
            "{} frames submitted, at most {} allowed",
            request.frames.len(),
            limits.max_frames
        )));
    }
    if request.frame_interval == 0 {
        return Err(ApiError::bad_request("frame_interval must be at least 1"));
    }

    let frames = request
        .frames
        .iter()
        .enumerate()
        .map(|(index, frame)| {
            base64::prelude::BASE64_STANDARD
                .decode(frame)
                .map_err(|e| ApiError::bad_request(format!("frame {}: invalid base64: {}", index, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let outcomes = state
        .pipeline()
        .process_sequence(frames, request.frame_interval)
        .await?;

    let crowd_status = aggregate_verdict(outcomes.iter().map(|(_, o)| o));
    let crowd_frames = outcomes
        .iter()
        .filter(|(_, o)| o.verdict().is_crowd())
        .count();

    let frames = outcomes
        .into_iter()
        .map(|(index, outcome)| FrameVerdict {
            index,
            crowd_status: outcome.verdict(),
            person_count: outcome.person_count(),
            cluster_count: outcome.cluster_count(),
            decoded: outcome.is_decoded(),
            processed_image: if request.include_images {
                outcome
                    .annotated_image()
                    .map(|image| base64::prelude::BASE64_STANDARD.encode(image))
            } else {
                None
            },
        })
        .collect();

    Ok(Json(FrameSequenceResponse {
        crowd_status,
        crowd_frames,
        frames,
    }))
}

/// Health check endpoint
pub async fn healthz(State(state): State<CrowdServiceState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "crowd-service",
            "node_id": state.node_id(),
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<CrowdServiceState>) -> impl IntoResponse {
    let (detector_ok, store_ok) = state.readiness().await;
    let storage = match state.store() {
        Some(store) => json!({ "backend": store.backend(), "healthy": store_ok }),
        None => json!(null),
    };
    let body = json!({
        "status": if detector_ok && store_ok { "ready" } else { "not ready" },
        "detector": { "id": state.detector().id(), "healthy": detector_ok },
        "storage": storage,
    });

    if detector_ok && store_ok {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> Response {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            ApiError::internal("failed to encode metrics").into_response()
        }
    }
}
