//! Scenario tests for the crowd classification engine
//!
//! These exercise the engine end to end from raw detections, covering the
//! adaptive parameter derivation, clustering and verdict.

use common::crowd::Verdict;
use common::detections::{BoundingBox, Detection};
use common::validation::processed_key_for;
use crowd_engine::{
    estimate, extract_centroids, AnnotationError, Centroid, CrowdEngine, CrowdReport,
    DistanceMatrix, EngineConfig, RejectionReason,
};
use image::{DynamicImage, RgbImage};

/// Person whose box midpoint is exactly (cx, cy)
fn person_at(cx: i32, cy: i32) -> Detection {
    Detection::person(BoundingBox::new(cx - 10, cy - 20, cx + 10, cy + 20), 0.9)
}

fn people(points: &[(i32, i32)]) -> Vec<Detection> {
    points.iter().map(|&(x, y)| person_at(x, y)).collect()
}

fn engine() -> CrowdEngine {
    CrowdEngine::new(EngineConfig::default()).unwrap()
}

/// Ten people within 40px of each other plus two far away
fn busy_scene() -> Vec<(i32, i32)> {
    let mut points: Vec<(i32, i32)> = (0..10)
        .map(|i| (500 + 8 * (i % 5), 300 + 10 * (i / 5)))
        .collect();
    points.push((50, 50));
    points.push((1200, 650));
    points
}

/// Clusters as sorted centroid sets, independent of ids and input order
fn cluster_shapes(engine: &CrowdEngine, detections: &[Detection]) -> Vec<Vec<(i32, i32)>> {
    let assessment = engine.assess(detections);
    let centroids = &assessment.extraction.centroids;
    let mut shapes: Vec<Vec<(i32, i32)>> = assessment
        .assignment
        .map(|a| a.clusters())
        .unwrap_or_default()
        .into_iter()
        .map(|members| {
            let mut shape: Vec<(i32, i32)> = members
                .into_iter()
                .map(|i| (centroids[i].x, centroids[i].y))
                .collect();
            shape.sort_unstable();
            shape
        })
        .collect();
    shapes.sort();
    shapes
}

#[test]
fn test_fewer_than_two_people_is_no_crowd() {
    let engine = engine();

    for detections in [vec![], vec![person_at(640, 360)]] {
        let assessment = engine.assess(&detections);
        assert_eq!(assessment.verdict, Verdict::NoCrowd);
        assert!(assessment.params.is_none());
        assert!(assessment.assignment.is_none());
    }
}

#[test]
fn test_tight_group_of_five_is_crowd() {
    let detections = people(&[(100, 100), (110, 105), (95, 112), (105, 95), (100, 120)]);

    let assessment = engine().assess(&detections);
    let params = assessment.params.unwrap();
    assert_eq!(params.eps, 50.0);
    assert_eq!(params.min_neighbors, 3);
    assert_eq!(assessment.cluster_count(), 1);
    assert_eq!(assessment.verdict, Verdict::Crowd);
}

#[test]
fn test_scattered_people_clamp_radius_and_stay_noise() {
    let detections = people(&[(0, 0), (300, 0), (600, 0), (0, 300), (300, 300)]);

    let assessment = engine().assess(&detections);
    assert_eq!(assessment.params.unwrap().eps, 150.0);
    let assignment = assessment.assignment.as_ref().unwrap();
    assert_eq!(assignment.noise_count(), 5);
    assert_eq!(assignment.cluster_count(), 0);
    assert_eq!(assessment.verdict, Verdict::NoCrowd);
}

#[test]
fn test_two_identical_people_are_not_a_crowd() {
    let assessment = engine().assess(&people(&[(200, 200), (200, 200)]));

    let params = assessment.params.unwrap();
    assert_eq!(params.min_neighbors, 3);
    assert_eq!(params.eps, 50.0);
    assert_eq!(assessment.cluster_count(), 0);
    assert_eq!(assessment.verdict, Verdict::NoCrowd);
}

#[test]
fn test_busy_scene_finds_one_cluster_of_ten() {
    let assessment = engine().assess(&people(&busy_scene()));

    let assignment = assessment.assignment.as_ref().unwrap();
    assert_eq!(assignment.cluster_count(), 1);
    assert_eq!(assignment.noise_count(), 2);
    assert_eq!(assignment.groups(), vec![(0..10).collect::<Vec<usize>>()]);
    assert!(assignment.label(10).unwrap().is_noise());
    assert!(assignment.label(11).unwrap().is_noise());
    assert_eq!(assessment.verdict, Verdict::Crowd);
}

#[test]
fn test_estimate_is_order_invariant() {
    let config = EngineConfig::default();
    let points = busy_scene();
    let mut reversed = points.clone();
    reversed.reverse();
    let mut rotated = points.clone();
    rotated.rotate_left(5);

    let params_of = |pts: &[(i32, i32)]| {
        let centroids: Vec<Centroid> = pts.iter().map(|&(x, y)| Centroid::new(x, y)).collect();
        estimate(&DistanceMatrix::from_centroids(&centroids), &config).unwrap()
    };

    let base = params_of(&points);
    for permuted in [&reversed, &rotated] {
        let params = params_of(permuted);
        assert!((params.avg_distance - base.avg_distance).abs() < 1e-9);
        assert!((params.eps - base.eps).abs() < 1e-9);
        assert_eq!(params.min_neighbors, base.min_neighbors);
    }
}

#[test]
fn test_partition_is_isomorphic_under_permutation() {
    let engine = engine();
    let mut points = busy_scene();
    // Second group far from the first
    points.extend([(900, 100), (910, 100), (900, 110), (910, 110)]);

    let base = cluster_shapes(&engine, &people(&points));
    assert_eq!(base.len(), 2);

    let mut reversed = points.clone();
    reversed.reverse();
    assert_eq!(cluster_shapes(&engine, &people(&reversed)), base);

    let mut interleaved: Vec<(i32, i32)> = points.iter().step_by(2).copied().collect();
    interleaved.extend(points.iter().skip(1).step_by(2).copied());
    assert_eq!(cluster_shapes(&engine, &people(&interleaved)), base);
}

#[test]
fn test_pipeline_is_idempotent() {
    let engine = engine();
    let detections = people(&busy_scene());
    let image = DynamicImage::ImageRgb8(RgbImage::new(1280, 720));

    assert_eq!(engine.assess(&detections), engine.assess(&detections));

    let first = engine.analyze(&image, &detections);
    let second = engine.analyze(&image, &detections);
    assert_eq!(first.verdict(), second.verdict());
    assert_eq!(first.annotated_image, second.annotated_image);
}

#[test]
fn test_malformed_boxes_are_dropped_and_reported() {
    let mut detections = people(&[(100, 100), (110, 100), (100, 110), (110, 110)]);
    detections.push(Detection::person(BoundingBox::new(105, 105, 105, 140), 0.9));
    detections.push(Detection::person(BoundingBox::new(120, 140, 100, 100), 0.9));

    let extraction = extract_centroids(&detections, &EngineConfig::default());
    assert_eq!(extraction.len(), 4);
    assert_eq!(extraction.malformed_count(), 2);
    assert!(extraction
        .rejected
        .iter()
        .all(|r| r.reason == RejectionReason::DegenerateBox && r.index >= 4));

    let assessment = engine().assess(&detections);
    assert_eq!(assessment.person_count(), 4);
    assert_eq!(assessment.verdict, Verdict::Crowd);
}

#[test]
fn test_non_person_detections_are_ignored() {
    let mut detections = people(&[(100, 100), (400, 400)]);
    for offset in 0..5 {
        detections.push(Detection {
            class: "car".to_string(),
            class_id: Some(2),
            confidence: 0.95,
            bbox: BoundingBox::new(100 + offset, 100, 130 + offset, 130),
        });
    }

    let assessment = engine().assess(&detections);
    assert_eq!(assessment.person_count(), 2);
    assert_eq!(assessment.verdict, Verdict::NoCrowd);
}

#[test]
fn test_annotation_failure_keeps_verdict() {
    let assessment = engine().assess(&people(&busy_scene()));
    assert_eq!(assessment.verdict, Verdict::Crowd);

    let report = CrowdReport::from_parts(
        assessment,
        Err(AnnotationError::Font("unreadable font".to_string())),
    );
    assert_eq!(report.verdict(), Verdict::Crowd);
    assert!(report.annotated_image.is_none());
    assert_eq!(report.assessment.cluster_count(), 1);
}

#[test]
fn test_processed_key_never_equals_source() {
    for key in [
        "site/original/frame.jpg",
        "original/frame.jpg",
        "frame.jpg",
        "site/originals/frame.jpg",
        "processed/frame.jpg",
    ] {
        let derived = processed_key_for(key, "original", "processed");
        assert_ne!(derived, key, "derived key for {key} must differ");
    }
}
