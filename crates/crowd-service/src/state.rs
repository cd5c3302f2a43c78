use crate::config::{CrowdServiceConfig, StorageBackend};
use crate::detector::{build_detector, PersonDetector};
use crate::error::ApiError;
use crate::pipeline::CrowdPipeline;
use crate::storage::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use anyhow::{Context, Result};
use base64::Engine;
use common::crowd::{CrowdDetectRequest, CrowdDetectResponse};
use common::validation::{processed_key_for, validate_bucket_name, validate_object_key};
use crowd_engine::{Annotator, CrowdEngine};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Path segment marking source images
pub const SOURCE_SEGMENT: &str = "original";

/// Path segment replacing [`SOURCE_SEGMENT`] for annotated output
pub const PROCESSED_SEGMENT: &str = "processed";

/// Per-request bounds enforced by the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestLimits {
    pub max_upload_bytes: usize,
    pub max_frames: usize,
    pub request_timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * 1024 * 1024,
            max_frames: 64,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct CrowdServiceState {
    inner: Arc<CrowdServiceStateInner>,
}

struct CrowdServiceStateInner {
    node_id: String,
    pipeline: CrowdPipeline,
    store: Option<Arc<dyn ObjectStore>>,
    limits: RequestLimits,
}

impl CrowdServiceState {
    pub fn new(
        node_id: String,
        pipeline: CrowdPipeline,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        Self::with_limits(node_id, pipeline, store, RequestLimits::default())
    }

    pub fn with_limits(
        node_id: String,
        pipeline: CrowdPipeline,
        store: Option<Arc<dyn ObjectStore>>,
        limits: RequestLimits,
    ) -> Self {
        Self {
            inner: Arc::new(CrowdServiceStateInner {
                node_id,
                pipeline,
                store,
                limits,
            }),
        }
    }

    /// Construct the detector, engine and object store described by `config`
    pub async fn from_config(config: &CrowdServiceConfig) -> Result<Self> {
        let detector = build_detector(&config.detector)
            .await
            .context("Failed to initialize person detector")?;
        info!(detector = detector.id(), "person detector ready");

        let mut engine =
            CrowdEngine::new(config.engine.clone()).context("Invalid engine configuration")?;
        if let Some(path) = &config.font_path {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read font {}", path.display()))?;
            let annotator = Annotator::new(config.engine.annotation.clone())
                .with_font_bytes(bytes)
                .with_context(|| format!("Failed to load font {}", path.display()))?;
            engine = engine.with_annotator(annotator);
            info!(font = %path.display(), "verdict label font override loaded");
        }

        let store: Option<Arc<dyn ObjectStore>> = match &config.storage {
            StorageBackend::S3(settings) => Some(Arc::new(S3ObjectStore::connect(settings).await)),
            StorageBackend::Memory => Some(Arc::new(MemoryObjectStore::new())),
            StorageBackend::None => None,
        };
        match &store {
            Some(store) => info!(backend = store.backend(), "object store configured"),
            None => info!("running without object storage"),
        }

        let limits = RequestLimits {
            max_upload_bytes: config.max_upload_bytes,
            max_frames: config.max_frames,
            request_timeout: config.request_timeout,
        };

        Ok(Self::with_limits(
            config.node_id.clone(),
            CrowdPipeline::new(detector, engine),
            store,
            limits,
        ))
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn pipeline(&self) -> &CrowdPipeline {
        &self.inner.pipeline
    }

    pub fn detector(&self) -> &Arc<dyn PersonDetector> {
        self.inner.pipeline.detector()
    }

    pub fn store(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.inner.store.as_ref()
    }

    pub fn limits(&self) -> RequestLimits {
        self.inner.limits
    }

    /// Download → classify → upload the annotated image next to the source
    pub async fn detect_from_storage(
        &self,
        request: &CrowdDetectRequest,
    ) -> Result<CrowdDetectResponse, ApiError> {
        validate_bucket_name(&request.bucket).map_err(|e| ApiError::bad_request(e.to_string()))?;
        validate_object_key(&request.file).map_err(|e| ApiError::bad_request(e.to_string()))?;

        let store = self.store().ok_or(ApiError::StorageUnavailable)?;

        let source = store
            .get_object(&request.bucket, &request.file)
            .await
            .map_err(ApiError::from_download)?;

        let outcome = self.pipeline().process_bytes(source).await?;
        let crowd_status = outcome.verdict();
        let person_count = outcome.person_count();
        let cluster_count = outcome.cluster_count();

        let (processed_image, processed_key) = match outcome.into_annotated_image() {
            Some(image) => {
                let key = processed_key_for(&request.file, SOURCE_SEGMENT, PROCESSED_SEGMENT);
                let encoded = base64::prelude::BASE64_STANDARD.encode(&image);
                store
                    .put_object(&request.bucket, &key, image, "image/jpeg")
                    .await
                    .map_err(ApiError::from_upload)?;
                (Some(encoded), Some(key))
            }
            None => (None, None),
        };

        info!(
            bucket = %request.bucket,
            file = %request.file,
            processed_key = processed_key.as_deref().unwrap_or("-"),
            verdict = %crowd_status,
            "stored crowd detection complete"
        );

        Ok(CrowdDetectResponse {
            crowd_status,
            processed_image,
            processed_key,
            person_count,
            cluster_count,
        })
    }

    /// Health of the detector and, when configured, the object store
    pub async fn readiness(&self) -> (bool, bool) {
        let detector_ok = self.detector().health_check().await.unwrap_or(false);
        let store_ok = match self.store() {
            Some(store) => store.health_check().await,
            None => true,
        };
        (detector_ok, store_ok)
    }
}
