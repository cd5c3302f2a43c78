//! Detector returning a fixed detection list, for tests and demos
use super::PersonDetector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::detections::Detection;
use image::DynamicImage;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    detections: Vec<Detection>,
}

impl StaticDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a JSON array of detections
    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read static detections from {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid static detections in {}", path.display()))
    }

    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let detections: Vec<Detection> = serde_json::from_slice(raw)?;
        Ok(Self::new(detections))
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }
}

#[async_trait]
impl PersonDetector for StaticDetector {
    fn id(&self) -> &'static str {
        "static"
    }

    fn name(&self) -> &'static str {
        "Static Detector"
    }

    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::detections::BoundingBox;
    use std::io::Write;

    #[tokio::test]
    async fn test_returns_configured_detections() {
        let detector = StaticDetector::new(vec![Detection::person(
            BoundingBox::new(0, 0, 10, 20),
            0.8,
        )]);
        let image = DynamicImage::new_rgb8(4, 4);

        let detections = detector.detect(&image).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class, "person");
        assert!(detector.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"class": "person", "class_id": 0, "confidence": 0.9, "bbox": {{"x1": 1, "y1": 2, "x2": 30, "y2": 60}}}},
               {{"class": "car", "confidence": 0.7, "bbox": {{"x1": 0, "y1": 0, "x2": 5, "y2": 5}}}}]"#
        )
        .unwrap();

        let detector = StaticDetector::from_file(file.path()).await.unwrap();
        assert_eq!(detector.detections().len(), 2);
        assert_eq!(detector.detections()[1].class_id, None);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(StaticDetector::from_json(b"{not json").is_err());
    }
}
