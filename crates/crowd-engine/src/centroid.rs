//! Person filtering and centroid extraction.

use crate::config::EngineConfig;
use common::detections::Detection;
use serde::{Deserialize, Serialize};

/// Representative point of one detected person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
}

impl Centroid {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Centroid) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

/// Why a detection did not produce a centroid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NotPerson,
    LowConfidence,
    DegenerateBox,
}

/// A detection dropped during extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Index of the detection in the detector output
    pub index: usize,
    pub reason: RejectionReason,
}

/// Result of centroid extraction.
///
/// `accepted[i]` produced `centroids[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CentroidExtraction {
    pub accepted: Vec<Detection>,
    pub centroids: Vec<Centroid>,
    pub rejected: Vec<Rejection>,
}

impl CentroidExtraction {
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Person detections dropped because their box was degenerate
    pub fn malformed_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| r.reason == RejectionReason::DegenerateBox)
            .count()
    }
}

/// Whether a detection denotes a person under the given config
pub fn is_person(detection: &Detection, config: &EngineConfig) -> bool {
    detection.class_id == Some(config.person_class_id)
        || detection.class.eq_ignore_ascii_case(&config.person_label)
}

/// Keep person detections and map each to the floor midpoint of its box.
///
/// Degenerate boxes are dropped, not reported as errors; each drop is
/// recorded in [`CentroidExtraction::rejected`].
pub fn extract_centroids(detections: &[Detection], config: &EngineConfig) -> CentroidExtraction {
    let mut extraction = CentroidExtraction::default();

    for (index, detection) in detections.iter().enumerate() {
        let reason = if !is_person(detection, config) {
            Some(RejectionReason::NotPerson)
        } else if detection.confidence < config.confidence_threshold {
            Some(RejectionReason::LowConfidence)
        } else if !detection.bbox.is_well_formed() {
            Some(RejectionReason::DegenerateBox)
        } else {
            None
        };

        if let Some(reason) = reason {
            extraction.rejected.push(Rejection { index, reason });
            continue;
        }

        let bbox = detection.bbox;
        let centroid = Centroid::new(
            midpoint(bbox.x1, bbox.x2),
            midpoint(bbox.y1, bbox.y2),
        );
        extraction.centroids.push(centroid);
        extraction.accepted.push(detection.clone());
    }

    if extraction.malformed_count() > 0 {
        tracing::debug!(
            dropped = extraction.malformed_count(),
            "dropped person detections with degenerate boxes"
        );
    }

    extraction
}

/// Floor of (a + b) / 2 without overflow
fn midpoint(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)).div_euclid(2)) as i32
}
