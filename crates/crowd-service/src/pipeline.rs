use crate::detector::PersonDetector;
use common::crowd::Verdict;
use crowd_engine::{CrowdEngine, CrowdReport, Resolution};
use image::{imageops::FilterType, DynamicImage};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{
    CROWD_ANNOTATION_FAILURES, CROWD_CLUSTERS_FOUND, CROWD_FRAMES_PROCESSED,
    CROWD_PERSONS_DETECTED, CROWD_PIPELINE_LATENCY,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("detector failed: {0:#}")]
    Detector(anyhow::Error),

    #[error("processing task failed: {0}")]
    Task(String),
}

/// Result of running one frame through the pipeline
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Classified(CrowdReport),

    /// Input could not be decoded as an image; classified as NoCrowd
    Undecodable { reason: String },
}

impl FrameOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            FrameOutcome::Classified(report) => report.verdict(),
            FrameOutcome::Undecodable { .. } => Verdict::NoCrowd,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, FrameOutcome::Classified(_))
    }

    pub fn person_count(&self) -> usize {
        match self {
            FrameOutcome::Classified(report) => report.assessment.person_count(),
            FrameOutcome::Undecodable { .. } => 0,
        }
    }

    pub fn cluster_count(&self) -> usize {
        match self {
            FrameOutcome::Classified(report) => report.assessment.cluster_count(),
            FrameOutcome::Undecodable { .. } => 0,
        }
    }

    pub fn annotated_image(&self) -> Option<&[u8]> {
        match self {
            FrameOutcome::Classified(report) => report.annotated_image.as_deref(),
            FrameOutcome::Undecodable { .. } => None,
        }
    }

    pub fn into_annotated_image(self) -> Option<Vec<u8>> {
        match self {
            FrameOutcome::Classified(report) => report.annotated_image,
            FrameOutcome::Undecodable { .. } => None,
        }
    }
}

/// Crowd when any frame is a crowd
pub fn aggregate_verdict<'a>(outcomes: impl IntoIterator<Item = &'a FrameOutcome>) -> Verdict {
    if outcomes.into_iter().any(|o| o.verdict().is_crowd()) {
        Verdict::Crowd
    } else {
        Verdict::NoCrowd
    }
}

/// Decode → resize → detect → classify → annotate
#[derive(Clone)]
pub struct CrowdPipeline {
    detector: Arc<dyn PersonDetector>,
    engine: Arc<CrowdEngine>,
}

impl CrowdPipeline {
    pub fn new(detector: Arc<dyn PersonDetector>, engine: CrowdEngine) -> Self {
        Self {
            detector,
            engine: Arc::new(engine),
        }
    }

    pub fn detector(&self) -> &Arc<dyn PersonDetector> {
        &self.detector
    }

    pub fn engine(&self) -> &CrowdEngine {
        &self.engine
    }

    /// Run one encoded image through the pipeline
    pub async fn process_bytes(&self, bytes: Vec<u8>) -> Result<FrameOutcome, PipelineError> {
        let start = Instant::now();
        let resolution = self.engine.config().working_resolution;

        let decoded = tokio::task::spawn_blocking(move || decode_and_resize(&bytes, resolution))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        observe_stage("decode", start);

        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "input is not a decodable image, classifying as no crowd");
                CROWD_FRAMES_PROCESSED
                    .with_label_values(&["undecodable"])
                    .inc();
                return Ok(FrameOutcome::Undecodable {
                    reason: e.to_string(),
                });
            }
        };

        let report = self.process_image(image).await?;
        observe_stage("total", start);
        Ok(FrameOutcome::Classified(report))
    }

    /// Detect and classify an image already at working resolution
    pub async fn process_image(&self, image: DynamicImage) -> Result<CrowdReport, PipelineError> {
        let detect_start = Instant::now();
        let detections = self
            .detector
            .detect(&image)
            .await
            .map_err(PipelineError::Detector)?;
        observe_stage("detect", detect_start);

        let classify_start = Instant::now();
        let engine = Arc::clone(&self.engine);
        let report = tokio::task::spawn_blocking(move || engine.analyze(&image, &detections))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        observe_stage("classify", classify_start);

        record_report(&report);
        info!(
            detector = self.detector.id(),
            verdict = %report.verdict(),
            persons = report.assessment.person_count(),
            clusters = report.assessment.cluster_count(),
            rejected = report.assessment.extraction.rejected.len(),
            annotated = report.annotated_image.is_some(),
            "frame classified"
        );
        Ok(report)
    }

    /// Classify every `frame_interval`-th frame independently.
    ///
    /// Returns `(index, outcome)` pairs in submission order.
    pub async fn process_sequence(
        &self,
        frames: Vec<Vec<u8>>,
        frame_interval: u32,
    ) -> Result<Vec<(usize, FrameOutcome)>, PipelineError> {
        let step = frame_interval.max(1) as usize;
        let mut outcomes = Vec::with_capacity(frames.len().div_ceil(step));

        for (index, frame) in frames.into_iter().enumerate().step_by(step) {
            let outcome = self.process_bytes(frame).await?;
            debug!(index, verdict = %outcome.verdict(), "sequence frame processed");
            outcomes.push((index, outcome));
        }

        Ok(outcomes)
    }
}

fn decode_and_resize(bytes: &[u8], resolution: Resolution) -> image::ImageResult<DynamicImage> {
    let image = image::load_from_memory(bytes)?;
    if image.width() == resolution.width && image.height() == resolution.height {
        return Ok(image);
    }
    Ok(image.resize_exact(resolution.width, resolution.height, FilterType::Triangle))
}

fn observe_stage(stage: &str, start: Instant) {
    CROWD_PIPELINE_LATENCY
        .with_label_values(&[stage])
        .observe(start.elapsed().as_secs_f64());
}

fn record_report(report: &CrowdReport) {
    CROWD_FRAMES_PROCESSED
        .with_label_values(&[report.verdict().metric_label()])
        .inc();
    CROWD_PERSONS_DETECTED.observe(report.assessment.person_count() as f64);
    CROWD_CLUSTERS_FOUND.observe(report.assessment.cluster_count() as f64);
    if report.annotated_image.is_none() {
        CROWD_ANNOTATION_FAILURES.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::StaticDetector;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use common::detections::{BoundingBox, Detection};
    use crowd_engine::EngineConfig;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingDetector;

    #[async_trait]
    impl PersonDetector for FailingDetector {
        fn id(&self) -> &'static str {
            "failing"
        }

        fn name(&self) -> &'static str {
            "Failing Detector"
        }

        async fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
            Err(anyhow!("model exploded"))
        }
    }

    /// Records the size of every image it sees
    #[derive(Default)]
    struct CountingDetector {
        calls: AtomicUsize,
        last_width: AtomicUsize,
    }

    #[async_trait]
    impl PersonDetector for CountingDetector {
        fn id(&self) -> &'static str {
            "counting"
        }

        fn name(&self) -> &'static str {
            "Counting Detector"
        }

        async fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_width.store(image.width() as usize, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn crowd_detections() -> Vec<Detection> {
        (0..5)
            .map(|i| {
                let x = 400 + i * 12;
                Detection::person(BoundingBox::new(x, 300, x + 20, 360), 0.9)
            })
            .collect()
    }

    fn pipeline(detector: Arc<dyn PersonDetector>) -> CrowdPipeline {
        CrowdPipeline::new(detector, CrowdEngine::new(EngineConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_crowd_frame() {
        let pipeline = pipeline(Arc::new(StaticDetector::new(crowd_detections())));

        let outcome = pipeline.process_bytes(png(640, 360)).await.unwrap();
        assert!(outcome.is_decoded());
        assert_eq!(outcome.verdict(), Verdict::Crowd);
        assert_eq!(outcome.person_count(), 5);
        assert_eq!(outcome.cluster_count(), 1);
        assert!(outcome.annotated_image().is_some());
    }

    #[tokio::test]
    async fn test_empty_detections_still_annotated() {
        let pipeline = pipeline(Arc::new(StaticDetector::empty()));

        let outcome = pipeline.process_bytes(png(320, 240)).await.unwrap();
        assert_eq!(outcome.verdict(), Verdict::NoCrowd);
        assert!(outcome.annotated_image().is_some());
    }

    #[tokio::test]
    async fn test_undecodable_input_is_no_crowd() {
        let detector = Arc::new(CountingDetector::default());
        let pipeline = pipeline(detector.clone());

        let outcome = pipeline.process_bytes(b"not an image".to_vec()).await.unwrap();
        assert!(matches!(outcome, FrameOutcome::Undecodable { .. }));
        assert_eq!(outcome.verdict(), Verdict::NoCrowd);
        assert!(outcome.annotated_image().is_none());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_detector_sees_working_resolution() {
        let detector = Arc::new(CountingDetector::default());
        let pipeline = pipeline(detector.clone());

        pipeline.process_bytes(png(320, 240)).await.unwrap();
        assert_eq!(detector.last_width.load(Ordering::SeqCst), 1280);
    }

    #[tokio::test]
    async fn test_detector_failure_is_an_error() {
        let pipeline = pipeline(Arc::new(FailingDetector));

        let err = pipeline.process_bytes(png(64, 64)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Detector(_)));
        assert!(err.to_string().contains("model exploded"));
    }

    #[tokio::test]
    async fn test_sequence_sampling_and_aggregate() {
        let detector = Arc::new(CountingDetector::default());
        let pipeline = pipeline(detector.clone());
        let frames = vec![png(32, 32), png(32, 32), b"junk".to_vec(), png(32, 32), png(32, 32)];

        let outcomes = pipeline.process_sequence(frames, 2).await.unwrap();
        let indices: Vec<usize> = outcomes.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert!(!outcomes[1].1.is_decoded());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            aggregate_verdict(outcomes.iter().map(|(_, o)| o)),
            Verdict::NoCrowd
        );
    }

    #[tokio::test]
    async fn test_aggregate_is_crowd_if_any_frame_is() {
        let crowd = pipeline(Arc::new(StaticDetector::new(crowd_detections())))
            .process_bytes(png(64, 64))
            .await
            .unwrap();
        let empty = FrameOutcome::Undecodable {
            reason: "junk".to_string(),
        };
        assert_eq!(aggregate_verdict([&empty, &crowd]), Verdict::Crowd);
        assert_eq!(aggregate_verdict([&empty]), Verdict::NoCrowd);
    }
}
