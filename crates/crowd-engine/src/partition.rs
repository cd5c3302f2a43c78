//! Density-based clustering (DBSCAN) over a precomputed distance matrix.

use crate::density::{ClusterParams, DistanceMatrix};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Cluster membership of one centroid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    Noise,
    Cluster(usize),
}

impl ClusterLabel {
    pub fn is_noise(self) -> bool {
        matches!(self, ClusterLabel::Noise)
    }

    pub fn cluster_id(self) -> Option<usize> {
        match self {
            ClusterLabel::Cluster(id) => Some(id),
            ClusterLabel::Noise => None,
        }
    }
}

/// One label per centroid index.
///
/// Cluster ids are contiguous from 0 but depend on visitation order; compare
/// partitions with [`ClusterAssignment::groups`], never by raw id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    labels: Vec<ClusterLabel>,
    cluster_count: usize,
}

impl ClusterAssignment {
    pub fn labels(&self) -> &[ClusterLabel] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<ClusterLabel> {
        self.labels.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_noise()).count()
    }

    /// Member indices of each cluster, indexed by cluster id
    pub fn clusters(&self) -> Vec<Vec<usize>> {
        let mut clusters = vec![Vec::new(); self.cluster_count];
        for (index, label) in self.labels.iter().enumerate() {
            if let ClusterLabel::Cluster(id) = label {
                clusters[*id].push(index);
            }
        }
        clusters
    }

    /// Id-independent view of the partition: each cluster's members sorted,
    /// clusters sorted by their smallest member
    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut groups = self.clusters();
        for group in &mut groups {
            group.sort_unstable();
        }
        groups.sort();
        groups
    }

    /// Indices of points that belong to some cluster
    pub fn clustered_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_noise())
            .map(|(i, _)| i)
    }
}

/// Run DBSCAN.
///
/// A point is core when at least `min_neighbors` other points lie within
/// `eps` (inclusive). Clusters grow from core points; non-core points reached
/// from a cluster join it as border points; the rest is noise.
pub fn partition(matrix: &DistanceMatrix, params: &ClusterParams) -> ClusterAssignment {
    let n = matrix.len();
    let mut labels: Vec<Option<ClusterLabel>> = vec![None; n];
    let mut cluster_count = 0;

    for point in 0..n {
        if labels[point].is_some() {
            continue;
        }

        let neighbors = matrix.neighbors(point, params.eps);
        if neighbors.len() < params.min_neighbors {
            // May still be claimed as a border point later
            labels[point] = Some(ClusterLabel::Noise);
            continue;
        }

        let cluster = ClusterLabel::Cluster(cluster_count);
        cluster_count += 1;
        labels[point] = Some(cluster);

        let mut queue: VecDeque<usize> = neighbors.into_iter().collect();
        while let Some(candidate) = queue.pop_front() {
            match labels[candidate] {
                Some(ClusterLabel::Cluster(_)) => continue,
                Some(ClusterLabel::Noise) => {
                    // Border point: joins the cluster but does not expand it
                    labels[candidate] = Some(cluster);
                    continue;
                }
                None => {}
            }

            labels[candidate] = Some(cluster);
            let reachable = matrix.neighbors(candidate, params.eps);
            if reachable.len() >= params.min_neighbors {
                queue.extend(reachable.into_iter().filter(|&j| {
                    !matches!(labels[j], Some(ClusterLabel::Cluster(_)))
                }));
            }
        }
    }

    ClusterAssignment {
        labels: labels
            .into_iter()
            .map(|l| l.unwrap_or(ClusterLabel::Noise))
            .collect(),
        cluster_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::centroid::Centroid;

    fn matrix(points: &[(i32, i32)]) -> DistanceMatrix {
        let centroids: Vec<Centroid> = points.iter().map(|&(x, y)| Centroid::new(x, y)).collect();
        DistanceMatrix::from_centroids(&centroids)
    }

    fn params(eps: f64, min_neighbors: usize) -> ClusterParams {
        ClusterParams {
            eps,
            min_neighbors,
            avg_distance: 0.0,
        }
    }

    #[test]
    fn test_single_dense_group() {
        let m = matrix(&[(100, 100), (110, 100), (100, 110), (110, 110), (105, 105)]);
        let assignment = partition(&m, &params(50.0, 3));

        assert_eq!(assignment.cluster_count(), 1);
        assert_eq!(assignment.noise_count(), 0);
        assert_eq!(assignment.groups(), vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn test_all_noise_when_sparse() {
        let m = matrix(&[(0, 0), (300, 0), (0, 300), (300, 300)]);
        let assignment = partition(&m, &params(150.0, 3));

        assert_eq!(assignment.cluster_count(), 0);
        assert_eq!(assignment.noise_count(), 4);
        assert!(assignment.groups().is_empty());
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Four tight points plus one point only reachable from the edge
        let m = matrix(&[(0, 0), (10, 0), (0, 10), (10, 10), (55, 10)]);
        let assignment = partition(&m, &params(50.0, 3));

        assert_eq!(assignment.cluster_count(), 1);
        // Point 4 has two neighbors, so it is not core but is within eps of point 3
        assert_eq!(assignment.label(4), assignment.label(3));
        assert!(!assignment.label(4).unwrap().is_noise());
    }

    #[test]
    fn test_border_point_visited_first() {
        // The border point comes first in visitation order and is initially noise
        let m = matrix(&[(55, 10), (0, 0), (10, 0), (0, 10), (10, 10)]);
        let assignment = partition(&m, &params(50.0, 3));

        assert_eq!(assignment.cluster_count(), 1);
        assert_eq!(assignment.noise_count(), 0);
    }

    #[test]
    fn test_two_separate_clusters() {
        let m = matrix(&[
            (0, 0), (10, 0), (0, 10), (10, 10),
            (500, 500), (510, 500), (500, 510), (510, 510),
            (1000, 0),
        ]);
        let assignment = partition(&m, &params(50.0, 3));

        assert_eq!(assignment.cluster_count(), 2);
        assert_eq!(assignment.noise_count(), 1);
        assert_eq!(
            assignment.groups(),
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]
        );
        assert_eq!(assignment.clustered_indices().count(), 8);
    }

    #[test]
    fn test_ids_are_contiguous() {
        let m = matrix(&[
            (0, 0), (1, 0), (0, 1), (1, 1),
            (900, 900),
            (400, 0), (401, 0), (400, 1), (401, 1),
        ]);
        let assignment = partition(&m, &params(10.0, 3));

        let mut ids: Vec<usize> = assignment
            .labels()
            .iter()
            .filter_map(|l| l.cluster_id())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_core_requires_other_points() {
        // Two coincident points: each has exactly one other neighbor
        let m = matrix(&[(5, 5), (5, 5)]);
        assert_eq!(partition(&m, &params(50.0, 3)).cluster_count(), 0);
        assert_eq!(partition(&m, &params(50.0, 1)).cluster_count(), 1);
    }
}
