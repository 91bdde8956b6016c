//! Dendrogram augmentation: subtree counts, threshold cut and leaf coloring.
//!
//! Cluster indices are assigned in dendrogram traversal order (root first,
//! left child before right child), so two cuts of the same tree color the
//! same visual band the same way regardless of the clusterer's own labels.

use crate::clustering::{
    AgglomerativeClusterer, ClusterMode, DistanceMetric, HierarchicalClusterer, Linkage,
    MergeEvent, MergeTree,
};
use crate::color::{ColorPalette, ColorRamp, Rgba};
use crate::errors::Result;
use crate::features::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Merge tree with the leaf count of every merged subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedLinkage {
    tree: MergeTree,
    counts: Vec<usize>,
}

impl AugmentedLinkage {
    /// Subtree sizes in one forward pass; children always refer to leaves
    /// or earlier events.
    pub fn from_tree(tree: MergeTree) -> Self {
        let n = tree.n_leaves();
        let mut counts: Vec<usize> = Vec::with_capacity(tree.events().len());
        for event in tree.events() {
            let size_of = |id: usize| if id < n { 1 } else { counts[id - n] };
            let size = size_of(event.left) + size_of(event.right);
            counts.push(size);
        }
        Self { tree, counts }
    }

    pub fn tree(&self) -> &MergeTree {
        &self.tree
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// `(left, right, distance, count)` rows, the usual linkage-matrix layout
    pub fn rows(&self) -> impl Iterator<Item = (MergeEvent, usize)> + '_ {
        self.tree.events().iter().copied().zip(self.counts.iter().copied())
    }
}

/// Flat clustering obtained by cutting the tree at a distance threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCut {
    pub threshold: f64,
    pub k: usize,
    /// Cluster index per leaf id
    pub labels: Vec<usize>,
    /// Leaf ids in dendrogram traversal order
    pub leaf_order: Vec<usize>,
}

impl ClusterCut {
    /// Leaves belonging to `cluster`, in traversal order
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.leaf_order
            .iter()
            .copied()
            .filter(|&leaf| self.labels[leaf] == cluster)
            .collect()
    }
}

/// Largest merge distance inside every subtree. Trees with inversions
/// (a parent lower than a child) are cut by this value, not the root height.
fn subtree_max_distances(tree: &MergeTree) -> Vec<f64> {
    let n = tree.n_leaves();
    let mut max_dist: Vec<f64> = Vec::with_capacity(tree.events().len());
    for event in tree.events() {
        let child = |id: usize| if id < n { f64::NEG_INFINITY } else { max_dist[id - n] };
        let value = event.distance.max(child(event.left)).max(child(event.right));
        max_dist.push(value);
    }
    max_dist
}

/// Cut `tree` at threshold `t`. Two leaves share a cluster iff every merge
/// on the path between them is at most `t`. A threshold `<= 0` keeps every
/// leaf separate.
pub fn cut_tree(tree: &MergeTree, threshold: f64) -> ClusterCut {
    let n = tree.n_leaves();
    let events = tree.events();
    let max_dist = subtree_max_distances(tree);
    let split_all = threshold <= 0.0;

    let mut labels = vec![0usize; n];
    let mut leaf_order = Vec::with_capacity(n);
    let mut k = 0;

    // (node, cluster already assigned to this subtree)
    let mut stack: Vec<(usize, Option<usize>)> = vec![(tree.root(), None)];
    while let Some((node, assigned)) = stack.pop() {
        let cluster = match assigned {
            Some(c) => Some(c),
            None if node < n || (!split_all && max_dist[node - n] <= threshold) => {
                k += 1;
                Some(k - 1)
            }
            None => None,
        };

        if node < n {
            // A lone leaf always opens its own cluster above
            labels[node] = cluster.unwrap_or(0);
            leaf_order.push(node);
            continue;
        }

        let event = events[node - n];
        // Right pushed first so the left subtree is visited first
        stack.push((event.right, cluster));
        stack.push((event.left, cluster));
    }

    log::debug!("Cut at t={} gives {} clusters over {} leaves", threshold, k, n);
    ClusterCut {
        threshold,
        k,
        labels,
        leaf_order,
    }
}

/// Color assignment for a single leaf
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeafColorEntry {
    pub leaf: usize,
    pub cluster: usize,
    pub color: Rgba,
}

/// Per-leaf colors, ascending by leaf index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafColorMap {
    entries: Vec<LeafColorEntry>,
}

impl LeafColorMap {
    /// Entries are produced in traversal order, then sorted by leaf so that
    /// `entries()[i]` is leaf `i`.
    pub fn from_cut(cut: &ClusterCut, palette: &ColorPalette) -> Self {
        let mut entries: Vec<LeafColorEntry> = cut
            .leaf_order
            .iter()
            .map(|&leaf| {
                let cluster = cut.labels[leaf];
                LeafColorEntry {
                    leaf,
                    cluster,
                    color: palette.get(cluster).unwrap_or(Rgba::NEUTRAL),
                }
            })
            .collect();
        entries.sort_by_key(|e| e.leaf);
        Self { entries }
    }

    pub fn entries(&self) -> &[LeafColorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn color_of(&self, leaf: usize) -> Option<Rgba> {
        self.entries.get(leaf).map(|e| e.color)
    }

    pub fn cluster_of(&self, leaf: usize) -> Option<usize> {
        self.entries.get(leaf).map(|e| e.cluster)
    }

    /// Color of any leaf in `cluster`; all leaves of a cluster share it
    pub fn representative(&self, cluster: usize) -> Option<Rgba> {
        self.entries
            .iter()
            .find(|e| e.cluster == cluster)
            .map(|e| e.color)
    }

    /// Number of distinct clusters present
    pub fn cluster_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.cluster + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Everything the augmenter derives from one merge tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColoredDendrogram {
    pub linkage: AugmentedLinkage,
    pub cut: ClusterCut,
    pub palette: ColorPalette,
    pub leaf_colors: LeafColorMap,
}

impl ColoredDendrogram {
    pub fn k(&self) -> usize {
        self.cut.k
    }
}

/// Turns merge trees into colored dendrograms with a given ramp
#[derive(Debug, Clone, Default)]
pub struct DendrogramAugmenter {
    ramp: ColorRamp,
}

impl DendrogramAugmenter {
    pub fn new(ramp: ColorRamp) -> Self {
        Self { ramp }
    }

    pub fn augment(&self, tree: MergeTree, threshold: f64) -> ColoredDendrogram {
        let cut = cut_tree(&tree, threshold);
        let palette = ColorPalette::sample(&self.ramp, cut.k);
        let leaf_colors = LeafColorMap::from_cut(&cut, &palette);
        ColoredDendrogram {
            linkage: AugmentedLinkage::from_tree(tree),
            cut,
            palette,
            leaf_colors,
        }
    }
}

/// Clusterer settings plus the cut threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    pub linkage: Linkage,
    pub metric: DistanceMetric,
    pub threshold: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            linkage: Linkage::Ward,
            metric: DistanceMetric::Euclidean,
            threshold: 1.0,
        }
    }
}

/// Cluster `matrix` with the default agglomerative clusterer and color the
/// resulting dendrogram
pub fn cluster_and_color(
    matrix: &FeatureMatrix,
    params: &ClusteringParams,
    ramp: &ColorRamp,
) -> Result<ColoredDendrogram> {
    let clusterer = AgglomerativeClusterer::new(params.linkage, params.metric)?;
    cluster_and_color_with(&clusterer, matrix, params.threshold, ramp)
}

/// Same as [`cluster_and_color`] with any clusterer
pub fn cluster_and_color_with<C: HierarchicalClusterer + ?Sized>(
    clusterer: &C,
    matrix: &FeatureMatrix,
    threshold: f64,
    ramp: &ColorRamp,
) -> Result<ColoredDendrogram> {
    matrix.require_features()?;
    let clustering = clusterer.cluster(matrix, ClusterMode::FullTree)?;
    let colored = DendrogramAugmenter::new(ramp.clone()).augment(clustering.tree, threshold);
    log::info!(
        "Colored dendrogram: {} leaves, {} clusters at threshold {}",
        matrix.n_rows(),
        colored.k(),
        threshold
    );
    Ok(colored)
}
