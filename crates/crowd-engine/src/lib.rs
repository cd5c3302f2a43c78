//! Adaptive density-based crowd classification.
//!
//! Person detections are reduced to floor centroids, a pairwise distance
//! matrix drives scene-adaptive DBSCAN parameters, and any resulting cluster
//! marks the image as a crowd.

pub mod annotate;
pub mod centroid;
pub mod classifier;
pub mod config;
pub mod density;
pub mod error;
pub mod partition;

pub use annotate::Annotator;
pub use centroid::{extract_centroids, Centroid, CentroidExtraction, Rejection, RejectionReason};
pub use classifier::{verdict_for, CrowdAssessment, CrowdEngine, CrowdReport};
pub use common::crowd::Verdict;
pub use config::{AnnotationStyle, Bounds, EngineConfig, Resolution};
pub use density::{estimate, ClusterParams, DistanceMatrix};
pub use error::{AnnotationError, EngineError};
pub use partition::{partition, ClusterAssignment, ClusterLabel};
