//! Pairwise distances and scene-adaptive clustering parameters.

use crate::centroid::Centroid;
use crate::config::EngineConfig;
use crate::error::EngineError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Symmetric matrix of Euclidean distances between centroids, zero diagonal
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    distances: Array2<f64>,
}

impl DistanceMatrix {
    pub fn from_centroids(centroids: &[Centroid]) -> Self {
        let n = centroids.len();
        let mut distances = Array2::<f64>::zeros((n, n));

        for i in 0..n {
            for j in (i + 1)..n {
                let d = centroids[i].distance(&centroids[j]);
                distances[[i, j]] = d;
                distances[[j, i]] = d;
            }
        }

        Self { distances }
    }

    pub fn len(&self) -> usize {
        self.distances.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.distances[[i, j]]
    }

    /// Mean over all off-diagonal entries, `None` below two points
    pub fn mean_pairwise(&self) -> Option<f64> {
        let n = self.len();
        if n < 2 {
            return None;
        }
        // Diagonal entries are zero and contribute nothing to the sum
        let pairs = (n * (n - 1)) as f64;
        Some(self.distances.sum() / pairs)
    }

    /// Indices of points within `eps` of `index`, excluding `index` itself
    pub fn neighbors(&self, index: usize, eps: f64) -> Vec<usize> {
        self.distances
            .row(index)
            .iter()
            .enumerate()
            .filter(|&(j, &d)| j != index && d <= eps)
            .map(|(j, _)| j)
            .collect()
    }
}

/// Clustering parameters derived from one scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Neighborhood radius in working-resolution pixels
    pub eps: f64,

    /// Minimum number of other points within eps for a core point
    pub min_neighbors: usize,

    /// Mean pairwise distance the radius was derived from
    pub avg_distance: f64,
}

/// Derive eps and minPts for a scene.
///
/// Fails with [`EngineError::InsufficientPoints`] below two centroids, which
/// the classifier reports as a no-crowd scene without parameters.
pub fn estimate(matrix: &DistanceMatrix, config: &EngineConfig) -> Result<ClusterParams, EngineError> {
    let n = matrix.len();
    let avg_distance = matrix
        .mean_pairwise()
        .ok_or(EngineError::InsufficientPoints(n))?;

    let eps = config.radius_bounds.clamp(avg_distance * config.radius_scale);
    let min_neighbors = config
        .min_neighbors_bounds
        .clamp(n / config.min_neighbors_divisor.max(1));

    Ok(ClusterParams {
        eps,
        min_neighbors,
        avg_distance,
    })
}
