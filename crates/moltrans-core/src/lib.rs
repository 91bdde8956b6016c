//! moltrans-core: clustering and color encoding of electronic-transition ensembles
//!
//! Data flow:
//! ```text
//! dataset ─► build_feature_matrix ─► HierarchicalClusterer ─► MergeTree
//!                                                               │
//!               TransferFunction ◄─ LeafColorMap ◄─ cut_tree ◄──┘
//! ```
//!
//! Tables come in through the `TabularDataset` trait; `DataFrame` is the
//! in-memory implementation with CSV and parameter-file loaders.

pub mod charge_transfer;
pub mod clustering;
pub mod color;
pub mod dataset;
pub mod dendrogram;
pub mod errors;
pub mod features;
pub mod parameters;
pub mod statistics;
pub mod transfer_function;

pub use charge_transfer::{append_charge_transfer_columns, compute_charge_transfer, ChargeTransfer};
pub use clustering::{
    AgglomerativeClusterer, ClusterMode, Clustering, DistanceMetric, HierarchicalClusterer,
    Linkage, MergeEvent, MergeTree,
};
pub use color::{ColorPalette, ColorRamp, Rgba};
pub use dataset::{CellValue, Column, ColumnData, DataFrame, TabularDataset};
pub use dendrogram::{
    cluster_and_color, cluster_and_color_with, cut_tree, AugmentedLinkage, ClusterCut,
    ClusteringParams, ColoredDendrogram, DendrogramAugmenter, LeafColorEntry, LeafColorMap,
};
pub use errors::{Result, TransitionError};
pub use features::{build_feature_matrix, FeatureMatrix, FeatureSelection, SelectionRule, SemanticTag};
pub use parameters::{parse_parameters, read_parameters};
pub use statistics::{cluster_statistics, ClusterStatistics};
pub use transfer_function::{synthesize_transfer_function, ControlPoint, TransferFunction};
