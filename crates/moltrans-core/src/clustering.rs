//! Hierarchical clustering collaborator.
//!
//! The dendrogram code only depends on the `HierarchicalClusterer` contract:
//! a deterministic merge history of exactly `n - 1` events. The default
//! `AgglomerativeClusterer` is a plain O(n³) Lance–Williams implementation,
//! which is fine for the ensemble sizes a transition study produces (a few
//! hundred states).

use crate::errors::{Result, TransitionError};
use crate::features::FeatureMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Linkage criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Single,
    Complete,
    Average,
    Ward,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Ward => "ward",
        })
    }
}

impl FromStr for Linkage {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Linkage::Single),
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "ward" => Ok(Linkage::Ward),
            other => Err(TransitionError::config(format!("unknown linkage '{}'", other))),
        }
    }
}

/// Distance metric between feature vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Euclidean,
    L1,
    L2,
    Manhattan,
    Cosine,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::L1 => "l1",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Cosine => "cosine",
        })
    }
}

impl FromStr for DistanceMetric {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "l1" => Ok(DistanceMetric::L1),
            "l2" => Ok(DistanceMetric::L2),
            "manhattan" => Ok(DistanceMetric::Manhattan),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(TransitionError::config(format!("unknown metric '{}'", other))),
        }
    }
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            DistanceMetric::Euclidean | DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::L1 | DistanceMetric::Manhattan => {
                a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
            }
            DistanceMetric::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    // Zero vectors have no direction
                    1.0
                } else {
                    (1.0 - dot / (na * nb)).max(0.0)
                }
            }
        }
    }

    fn is_euclidean(&self) -> bool {
        matches!(self, DistanceMetric::Euclidean | DistanceMetric::L2)
    }
}

/// One merge of two existing leaves/subtrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeEvent {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
}

/// Merge history over `n_leaves` leaves: ids `< n` are leaves, id `n + i` is
/// the subtree produced by event `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMergeTree")]
pub struct MergeTree {
    n_leaves: usize,
    events: Vec<MergeEvent>,
}

#[derive(Deserialize)]
struct RawMergeTree {
    n_leaves: usize,
    events: Vec<MergeEvent>,
}

impl TryFrom<RawMergeTree> for MergeTree {
    type Error = TransitionError;

    fn try_from(raw: RawMergeTree) -> Result<Self> {
        MergeTree::new(raw.n_leaves, raw.events)
    }
}

impl MergeTree {
    /// Validate and wrap a merge history
    pub fn new(n_leaves: usize, events: Vec<MergeEvent>) -> Result<Self> {
        if n_leaves < 2 {
            return Err(TransitionError::InsufficientData {
                required: 2,
                actual: n_leaves,
            });
        }
        if events.len() != n_leaves - 1 {
            return Err(TransitionError::merge_tree(format!(
                "{} leaves need {} merge events, got {}",
                n_leaves,
                n_leaves - 1,
                events.len()
            )));
        }

        let mut used = vec![false; 2 * n_leaves - 1];
        for (i, event) in events.iter().enumerate() {
            for child in [event.left, event.right] {
                if child >= n_leaves + i {
                    return Err(TransitionError::merge_tree(format!(
                        "event {} references node {} which does not exist yet",
                        i, child
                    )));
                }
                if used[child] {
                    return Err(TransitionError::merge_tree(format!(
                        "node {} is merged more than once (event {})",
                        child, i
                    )));
                }
                used[child] = true;
            }
            if event.left == event.right {
                return Err(TransitionError::merge_tree(format!(
                    "event {} merges node {} with itself",
                    i, event.left
                )));
            }
            if event.distance.is_nan() {
                return Err(TransitionError::merge_tree(format!("event {} has NaN distance", i)));
            }
        }

        Ok(Self { n_leaves, events })
    }

    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn events(&self) -> &[MergeEvent] {
        &self.events
    }

    /// Id of the root node
    pub fn root(&self) -> usize {
        (2 * self.n_leaves).saturating_sub(2)
    }

    /// Largest merge distance in the tree
    pub fn max_distance(&self) -> f64 {
        self.events
            .iter()
            .map(|e| e.distance)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Flat labels after undoing the last `k - 1` merges. Labels are numbered
    /// in order of the first leaf belonging to each cluster.
    pub fn labels_for_count(&self, k: usize) -> Vec<usize> {
        let n = self.n_leaves;
        let k = k.clamp(1, n);
        let kept = n - k;

        let mut parent: Vec<usize> = (0..2 * n - 1).collect();
        for (i, event) in self.events.iter().take(kept).enumerate() {
            parent[event.left] = n + i;
            parent[event.right] = n + i;
        }

        fn find(parent: &[usize], mut i: usize) -> usize {
            while parent[i] != i {
                i = parent[i];
            }
            i
        }

        let mut root_label: Vec<Option<usize>> = vec![None; 2 * n - 1];
        let mut next = 0;
        (0..n)
            .map(|leaf| {
                let root = find(&parent, leaf);
                *root_label[root].get_or_insert_with(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect()
    }
}

/// Whether to stop at the full tree or also cut it into `k` clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMode {
    FullTree,
    Clusters(usize),
}

/// Result of running a clusterer
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub tree: MergeTree,
    /// Per-leaf labels when `ClusterMode::Clusters` was requested
    pub labels: Option<Vec<usize>>,
}

/// Collaborator contract: deterministic full merge history over the rows
pub trait HierarchicalClusterer {
    fn cluster(&self, matrix: &FeatureMatrix, mode: ClusterMode) -> Result<Clustering>;
}

/// Agglomerative clustering with Lance–Williams distance updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgglomerativeClusterer {
    pub linkage: Linkage,
    pub metric: DistanceMetric,
}

impl Default for AgglomerativeClusterer {
    fn default() -> Self {
        Self {
            linkage: Linkage::Ward,
            metric: DistanceMetric::Euclidean,
        }
    }
}

impl AgglomerativeClusterer {
    pub fn new(linkage: Linkage, metric: DistanceMetric) -> Result<Self> {
        if linkage == Linkage::Ward && !metric.is_euclidean() {
            return Err(TransitionError::IncompatibleLinkage {
                linkage: linkage.to_string(),
                metric: metric.to_string(),
            });
        }
        Ok(Self { linkage, metric })
    }

    /// Full symmetric `n x n` distance matrix with a zero diagonal. Rows are
    /// computed in parallel.
    fn pairwise_distances(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let metric = self.metric;
        (0..rows.len())
            .into_par_iter()
            .map(|i| {
                (0..rows.len())
                    .map(|j| if i == j { 0.0 } else { metric.distance(&rows[i], &rows[j]) })
                    .collect()
            })
            .collect()
    }

    fn merged_distance(&self, d_ki: f64, d_kj: f64, d_ij: f64, n_i: f64, n_j: f64, n_k: f64) -> f64 {
        match self.linkage {
            Linkage::Single => d_ki.min(d_kj),
            Linkage::Complete => d_ki.max(d_kj),
            Linkage::Average => (n_i * d_ki + n_j * d_kj) / (n_i + n_j),
            Linkage::Ward => {
                let total = n_i + n_j + n_k;
                let sq = ((n_i + n_k) * d_ki * d_ki + (n_j + n_k) * d_kj * d_kj
                    - n_k * d_ij * d_ij)
                    / total;
                sq.max(0.0).sqrt()
            }
        }
    }
}

impl HierarchicalClusterer for AgglomerativeClusterer {
    fn cluster(&self, matrix: &FeatureMatrix, mode: ClusterMode) -> Result<Clustering> {
        matrix.require_features()?;
        let n = matrix.n_rows();
        if n < 2 {
            return Err(TransitionError::InsufficientData {
                required: 2,
                actual: n,
            });
        }
        if self.linkage == Linkage::Ward && !self.metric.is_euclidean() {
            return Err(TransitionError::IncompatibleLinkage {
                linkage: self.linkage.to_string(),
                metric: self.metric.to_string(),
            });
        }

        log::info!(
            "Agglomerative clustering: {} members, {} features, linkage={}, metric={}",
            n,
            matrix.width(),
            self.linkage,
            self.metric
        );

        let mut dist = self.pairwise_distances(matrix.rows());
        // Slot i holds the active cluster that started at leaf i
        let mut node_id: Vec<usize> = (0..n).collect();
        let mut size: Vec<f64> = vec![1.0; n];
        let mut active: Vec<bool> = vec![true; n];
        let mut events = Vec::with_capacity(n - 1);

        for step in 0..n - 1 {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                if !active[i] {
                    continue;
                }
                for j in (i + 1)..n {
                    if !active[j] {
                        continue;
                    }
                    let d = dist[i][j];
                    let better = match best {
                        None => true,
                        Some((bi, bj, bd)) => {
                            d < bd
                                || (d == bd
                                    && (node_id[i].min(node_id[j]), node_id[i].max(node_id[j]))
                                        < (node_id[bi].min(node_id[bj]), node_id[bi].max(node_id[bj])))
                        }
                    };
                    if better {
                        best = Some((i, j, d));
                    }
                }
            }

            let (i, j, d) = best.ok_or_else(|| {
                TransitionError::merge_tree("no active cluster pair left to merge")
            })?;

            let (a, b) = (node_id[i], node_id[j]);
            events.push(MergeEvent {
                left: a.min(b),
                right: a.max(b),
                distance: d,
            });

            for k in 0..n {
                if !active[k] || k == i || k == j {
                    continue;
                }
                let updated =
                    self.merged_distance(dist[k][i], dist[k][j], d, size[i], size[j], size[k]);
                dist[k][i] = updated;
                dist[i][k] = updated;
            }

            size[i] += size[j];
            active[j] = false;
            node_id[i] = n + step;
        }

        let tree = MergeTree::new(n, events)?;
        let labels = match mode {
            ClusterMode::FullTree => None,
            ClusterMode::Clusters(k) => Some(tree.labels_for_count(k)),
        };
        Ok(Clustering { tree, labels })
    }
}
