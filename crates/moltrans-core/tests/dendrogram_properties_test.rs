//! Dendrogram Property Tests
//!
//! Structural guarantees of the augmentation pipeline checked over
//! deterministic pseudo-random ensembles: subtree counts, cut monotonicity,
//! leaf map ordering and transfer-function coverage.

use moltrans_core::{
    build_feature_matrix, cluster_and_color, cut_tree, synthesize_transfer_function,
    AgglomerativeClusterer, AugmentedLinkage, ClusterMode, ClusteringParams, ColorRamp, Column,
    DataFrame, DistanceMetric, FeatureSelection, HierarchicalClusterer, Linkage, MergeEvent,
    MergeTree, TabularDataset,
};

/// Ensemble of transition states with hole/particle charges for 3 subgroups
fn create_deterministic_ensemble(seed: u64, members: usize) -> DataFrame {
    let mut state = seed;
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 33) % 1000) as f64 / 1000.0
    };

    let names: Vec<String> = (0..members).map(|i| format!("phe-{}", i % 4)).collect();
    let states: Vec<String> = (0..members).map(|i| format!("State {}", i + 1)).collect();
    let mut columns = vec![
        Column::categorical("Name", names),
        Column::categorical("State", states),
    ];
    for sg in 1..=3 {
        columns.push(Column::float(format!("Hole sg{}", sg), (0..members).map(|_| next()).collect()));
    }
    for sg in 1..=3 {
        columns.push(Column::float(
            format!("Particle sg{}", sg),
            (0..members).map(|_| next()).collect(),
        ));
    }
    DataFrame::from_columns(columns).unwrap()
}

fn all_linkages() -> Vec<AgglomerativeClusterer> {
    vec![
        AgglomerativeClusterer::new(Linkage::Single, DistanceMetric::Euclidean).unwrap(),
        AgglomerativeClusterer::new(Linkage::Complete, DistanceMetric::Manhattan).unwrap(),
        AgglomerativeClusterer::new(Linkage::Average, DistanceMetric::Cosine).unwrap(),
        AgglomerativeClusterer::new(Linkage::Ward, DistanceMetric::L2).unwrap(),
    ]
}

#[test]
fn test_subtree_counts_bounded() {
    let ensemble = create_deterministic_ensemble(42, 25);
    let matrix = build_feature_matrix(&ensemble, &FeatureSelection::hole_and_particle()).unwrap();
    assert_eq!(matrix.width(), 6);

    for clusterer in all_linkages() {
        let tree = clusterer.cluster(&matrix, ClusterMode::FullTree).unwrap().tree;
        assert_eq!(tree.events().len(), 24);

        let linkage = AugmentedLinkage::from_tree(tree);
        assert_eq!(*linkage.counts().last().unwrap(), 25);
        assert!(linkage.counts().iter().all(|&c| (1..=25).contains(&c)));
    }
}

#[test]
fn test_cut_monotonic_coarsening() {
    let ensemble = create_deterministic_ensemble(7, 30);
    let matrix = build_feature_matrix(&ensemble, &FeatureSelection::hole_and_particle()).unwrap();

    for clusterer in all_linkages() {
        let tree = clusterer.cluster(&matrix, ClusterMode::FullTree).unwrap().tree;
        let top = tree.max_distance();

        let mut previous = usize::MAX;
        for step in 0..=40 {
            let t = top * (step as f64 / 40.0) * 1.1;
            let k = cut_tree(&tree, t).k;
            assert!(k <= previous, "k rose from {} to {} at t={}", previous, k, t);
            previous = k;
        }
        assert_eq!(cut_tree(&tree, 0.0).k, 30);
        assert_eq!(cut_tree(&tree, top).k, 1);
    }
}

#[test]
fn test_leaf_map_sorted_and_complete() {
    let ensemble = create_deterministic_ensemble(1234, 18);
    let matrix = build_feature_matrix(&ensemble, &FeatureSelection::hole_and_particle()).unwrap();
    let params = ClusteringParams {
        linkage: Linkage::Average,
        metric: DistanceMetric::Euclidean,
        threshold: 0.4,
    };
    let colored = cluster_and_color(&matrix, &params, &ColorRamp::spectral()).unwrap();

    let leaves: Vec<usize> = colored.leaf_colors.entries().iter().map(|e| e.leaf).collect();
    assert_eq!(leaves, (0..18).collect::<Vec<_>>());
    for entry in colored.leaf_colors.entries() {
        assert!(entry.cluster < colored.k());
        assert_eq!(Some(entry.color), colored.palette.get(entry.cluster));
    }
}

#[test]
fn test_transfer_function_covers_unit_interval() {
    let ensemble = create_deterministic_ensemble(99, 20);
    let matrix = build_feature_matrix(&ensemble, &FeatureSelection::hole_and_particle()).unwrap();
    let colored = cluster_and_color(&matrix, &ClusteringParams::default(), &ColorRamp::default()).unwrap();

    for highlight in [None, Some(0)] {
        let tf = synthesize_transfer_function(&colored.leaf_colors, colored.k(), highlight).unwrap();
        let positions: Vec<f64> = tf.points().iter().map(|p| p.position).collect();
        assert_eq!(positions[0], 0.0);
        assert_eq!(*positions.last().unwrap(), 1.0);
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(tf.bands(), colored.k());
    }
}

#[test]
fn test_four_leaf_reference_tree() {
    let tree = MergeTree::new(
        4,
        vec![
            MergeEvent { left: 0, right: 1, distance: 0.5 },
            MergeEvent { left: 2, right: 3, distance: 1.0 },
            MergeEvent { left: 4, right: 5, distance: 2.0 },
        ],
    )
    .unwrap();

    assert_eq!(AugmentedLinkage::from_tree(tree.clone()).counts(), &[2, 2, 4]);

    let cut = cut_tree(&tree, 1.0);
    assert_eq!(cut.k, 2);
    assert_eq!(cut.members(0), vec![0, 1]);
    assert_eq!(cut.members(1), vec![2, 3]);

    let cut = cut_tree(&tree, 2.5);
    assert_eq!(cut.k, 1);
    assert_eq!(cut.members(0), vec![0, 1, 2, 3]);
}

#[test]
fn test_clustering_is_deterministic() {
    let ensemble = create_deterministic_ensemble(5, 15);
    let matrix = build_feature_matrix(&ensemble, &FeatureSelection::hole_and_particle()).unwrap();
    let clusterer = AgglomerativeClusterer::default();

    let first = clusterer.cluster(&matrix, ClusterMode::Clusters(3)).unwrap();
    let second = clusterer.cluster(&matrix, ClusterMode::Clusters(3)).unwrap();
    assert_eq!(first, second);

    let labels = first.labels.unwrap();
    assert_eq!(labels.len(), ensemble.rows());
    assert_eq!(labels.iter().max(), Some(&2));
}
