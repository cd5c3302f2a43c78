//! Crowd verdict and the end-to-end engine entry point.

use crate::annotate::Annotator;
use crate::centroid::{extract_centroids, CentroidExtraction};
use crate::config::EngineConfig;
use crate::density::{estimate, ClusterParams, DistanceMatrix};
use crate::error::{AnnotationError, EngineError};
use crate::partition::{partition, ClusterAssignment};
use common::crowd::Verdict;
use common::detections::Detection;
use image::DynamicImage;
use tracing::{debug, warn};

/// Numeric outcome for one image
#[derive(Debug, Clone, PartialEq)]
pub struct CrowdAssessment {
    pub extraction: CentroidExtraction,

    /// Absent when fewer than two people were found
    pub params: Option<ClusterParams>,

    /// Absent when fewer than two people were found
    pub assignment: Option<ClusterAssignment>,

    pub verdict: Verdict,
}

impl CrowdAssessment {
    pub fn person_count(&self) -> usize {
        self.extraction.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.assignment
            .as_ref()
            .map(ClusterAssignment::cluster_count)
            .unwrap_or(0)
    }

    /// Whether clustering ran for this image
    pub fn was_clustered(&self) -> bool {
        self.assignment.is_some()
    }
}

/// Assessment plus the rendered visualization
#[derive(Debug, Clone)]
pub struct CrowdReport {
    pub assessment: CrowdAssessment,

    /// JPEG bytes, absent when annotation failed
    pub annotated_image: Option<Vec<u8>>,

    pub annotation_error: Option<String>,
}

impl CrowdReport {
    /// Combine an assessment with an annotation attempt. A failed annotation
    /// leaves the verdict untouched.
    pub fn from_parts(
        assessment: CrowdAssessment,
        annotation: Result<Vec<u8>, AnnotationError>,
    ) -> Self {
        match annotation {
            Ok(bytes) => Self {
                assessment,
                annotated_image: Some(bytes),
                annotation_error: None,
            },
            Err(e) => {
                warn!(
                    verdict = %assessment.verdict,
                    error = %e,
                    "annotation failed, returning verdict without image"
                );
                Self {
                    assessment,
                    annotated_image: None,
                    annotation_error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.assessment.verdict
    }
}

/// Reduce an assignment to a verdict: Crowd iff any cluster exists
pub fn verdict_for(assignment: &ClusterAssignment) -> Verdict {
    if assignment.cluster_count() > 0 {
        Verdict::Crowd
    } else {
        Verdict::NoCrowd
    }
}

/// Stateless crowd classifier.
///
/// Holds only immutable configuration; one instance can serve any number of
/// concurrent callers.
#[derive(Debug, Clone)]
pub struct CrowdEngine {
    config: EngineConfig,
    annotator: Annotator,
}

impl CrowdEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let annotator = Annotator::new(config.annotation.clone());
        Ok(Self { config, annotator })
    }

    /// Replace the annotator, e.g. with one that has a font loaded
    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Extract → (short-circuit below two people) → estimate → partition → classify
    pub fn assess(&self, detections: &[Detection]) -> CrowdAssessment {
        let extraction = extract_centroids(detections, &self.config);
        let matrix = DistanceMatrix::from_centroids(&extraction.centroids);

        // Below two people there is no pairwise distance to adapt to
        let params = match estimate(&matrix, &self.config) {
            Ok(params) => params,
            Err(e) => {
                debug!(persons = extraction.len(), reason = %e, "too few people to cluster");
                return CrowdAssessment {
                    extraction,
                    params: None,
                    assignment: None,
                    verdict: Verdict::NoCrowd,
                };
            }
        };

        let assignment = partition(&matrix, &params);
        let verdict = verdict_for(&assignment);

        debug!(
            persons = extraction.len(),
            eps = params.eps,
            min_neighbors = params.min_neighbors,
            avg_distance = params.avg_distance,
            clusters = assignment.cluster_count(),
            noise = assignment.noise_count(),
            verdict = %verdict,
            "crowd assessment complete"
        );

        CrowdAssessment {
            extraction,
            params: Some(params),
            assignment: Some(assignment),
            verdict,
        }
    }

    /// Assess and render the annotated image
    pub fn analyze(&self, image: &DynamicImage, detections: &[Detection]) -> CrowdReport {
        let assessment = self.assess(detections);
        let annotation = self.annotator.annotate(image, &assessment);
        CrowdReport::from_parts(assessment, annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::detections::BoundingBox;
    use image::RgbImage;

    fn person_at(cx: i32, cy: i32) -> Detection {
        Detection::person(BoundingBox::new(cx - 10, cy - 20, cx + 10, cy + 20), 0.9)
    }

    fn engine() -> CrowdEngine {
        CrowdEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_short_circuit_below_two() {
        let engine = engine();

        let none = engine.assess(&[]);
        assert_eq!(none.verdict, Verdict::NoCrowd);
        assert!(!none.was_clustered());
        assert!(none.params.is_none());

        let one = engine.assess(&[person_at(100, 100)]);
        assert_eq!(one.verdict, Verdict::NoCrowd);
        assert!(!one.was_clustered());
        assert_eq!(one.person_count(), 1);
        assert!(one.params.is_none());
        assert!(one.assignment.is_none());
    }

    #[test]
    fn test_dense_group_is_crowd() {
        let detections: Vec<Detection> = [(100, 100), (110, 105), (95, 112), (105, 95), (100, 120)]
            .iter()
            .map(|&(x, y)| person_at(x, y))
            .collect();

        let assessment = engine().assess(&detections);
        assert_eq!(assessment.verdict, Verdict::Crowd);
        assert_eq!(assessment.cluster_count(), 1);
        assert_eq!(assessment.params.unwrap().eps, 50.0);
    }

    #[test]
    fn test_degenerate_boxes_do_not_count() {
        let detections = vec![
            person_at(100, 100),
            Detection::person(BoundingBox::new(100, 100, 100, 140), 0.9),
        ];

        let assessment = engine().assess(&detections);
        assert_eq!(assessment.person_count(), 1);
        assert_eq!(assessment.extraction.malformed_count(), 1);
        assert!(!assessment.was_clustered());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.min_neighbors_divisor = 0;
        assert!(CrowdEngine::new(config).is_err());
    }

    #[test]
    fn test_annotation_failure_keeps_verdict() {
        let detections: Vec<Detection> = (0..5).map(|i| person_at(100 + i * 5, 100)).collect();
        let assessment = engine().assess(&detections);
        assert_eq!(assessment.verdict, Verdict::Crowd);

        let report = CrowdReport::from_parts(
            assessment,
            Err(AnnotationError::Font("broken".to_string())),
        );
        assert_eq!(report.verdict(), Verdict::Crowd);
        assert!(report.annotated_image.is_none());
        assert!(report.annotation_error.is_some());
    }

    #[test]
    fn test_analyze_produces_jpeg() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(320, 240));
        let detections: Vec<Detection> = (0..4).map(|i| person_at(100 + i * 8, 120)).collect();

        let report = engine().analyze(&image, &detections);
        assert_eq!(report.verdict(), Verdict::Crowd);
        let bytes = report.annotated_image.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
