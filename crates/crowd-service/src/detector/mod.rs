pub mod static_detector;
pub mod yolov8;

use crate::config::DetectorBackend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::detections::Detection;
use image::DynamicImage;
use std::sync::Arc;

pub use static_detector::StaticDetector;
pub use yolov8::{YoloV8Config, YoloV8Detector};

/// Object detector producing boxes in the pixel space of the given image
#[async_trait]
pub trait PersonDetector: Send + Sync {
    /// Unique detector identifier (e.g., "yolov8")
    fn id(&self) -> &'static str;

    /// Human-readable detector name
    fn name(&self) -> &'static str;

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;

    /// Verify the detector is operational
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Construct the configured detector
pub async fn build_detector(backend: &DetectorBackend) -> Result<Arc<dyn PersonDetector>> {
    match backend {
        DetectorBackend::YoloV8 {
            model_path,
            execution_provider,
            device_id,
        } => {
            let mut config = YoloV8Config {
                model_path: model_path.to_string_lossy().into_owned(),
                ..YoloV8Config::default()
            };
            if let Some(provider) = execution_provider {
                config.execution_provider = provider.clone();
            }
            if let Some(id) = device_id {
                config.device_id = *id;
            }
            let detector = tokio::task::spawn_blocking(move || YoloV8Detector::load(config))
                .await
                .context("YOLOv8 loader task failed")??;
            Ok(Arc::new(detector))
        }
        DetectorBackend::Static { path: Some(path) } => {
            let detector = StaticDetector::from_file(path).await?;
            Ok(Arc::new(detector))
        }
        DetectorBackend::Static { path: None } => Ok(Arc::new(StaticDetector::empty())),
    }
}
