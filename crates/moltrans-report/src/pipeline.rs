//! Pipeline orchestration
//!
//! Every entry point takes the dataset and an immutable `PipelineConfig`,
//! recomputes what it needs and hands back owned results. Nothing here
//! touches published outputs; the CLI decides what to write.

use crate::config::PipelineConfig;
use crate::jobs::{
    ClusterTransitionRequest, DendrogramRequest, JobId, MemberTransitionRequest, RenderJobSpec,
    RendererEntry,
};
use crate::outputs::{ArtifactManifest, OutputContract};
use crate::renderer::{RenderOutcome, RendererProcess};
use moltrans_core::{
    build_feature_matrix, cluster_and_color, synthesize_transfer_function, AgglomerativeClusterer,
    ClusterCut, ClusterMode, ColoredDendrogram, Column, DataFrame, FeatureMatrix,
    HierarchicalClusterer, Result, TabularDataset, TransferFunction,
};
use std::path::Path;

/// A render request of one of the three shapes
pub enum RenderRequest<'a> {
    Dendrogram {
        request: DendrogramRequest,
        threshold: f64,
    },
    ClusterTransitions {
        dataset: &'a dyn TabularDataset,
        request: ClusterTransitionRequest,
    },
    MemberTransition {
        dataset: &'a dyn TabularDataset,
        request: MemberTransitionRequest,
    },
}

/// Outcomes of every renderer run of one request, under one job id
#[derive(Debug, Clone)]
pub struct RenderSubmission {
    pub job_id: JobId,
    pub kind: RendererEntry,
    pub outcomes: Vec<RenderOutcome>,
}

impl RenderSubmission {
    pub fn all_completed(&self) -> bool {
        self.outcomes.iter().all(RenderOutcome::is_completed)
    }

    /// Artifacts of the runs that exited successfully
    pub fn artifacts(&self) -> Vec<&Path> {
        self.outcomes.iter().filter_map(RenderOutcome::artifact).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RenderOutcome> {
        self.outcomes.iter().filter(|o| !o.is_completed())
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes.iter().any(RenderOutcome::is_cancelled)
    }
}

/// Write the request files under a fresh job id, run the renderer once per
/// prepared job and collect the outcomes. Preparation errors abort before
/// the renderer runs. A failing exit status or a timeout is recorded as an
/// outcome and the remaining runs still go ahead; a cancelled run stops the
/// submission, keeping the outcomes gathered so far.
pub fn submit_render_job(
    renderer: &RendererProcess,
    request: &RenderRequest<'_>,
    output_dir: &Path,
) -> Result<RenderSubmission> {
    let job_id = JobId::generate();
    let (kind, specs): (RendererEntry, Vec<RenderJobSpec>) = match request {
        RenderRequest::Dendrogram { request, threshold } => (
            RendererEntry::Dendrogram,
            vec![request.prepare(output_dir, &job_id, *threshold)?],
        ),
        RenderRequest::ClusterTransitions { dataset, request } => (
            RendererEntry::ClusterDiagram,
            request.prepare(*dataset, output_dir, &job_id)?,
        ),
        RenderRequest::MemberTransition { dataset, request } => (
            RendererEntry::TransitionDiagram,
            vec![request.prepare(*dataset, output_dir, &job_id)?],
        ),
    };

    log::info!("Submitting {} render job(s) as {}", specs.len(), job_id);
    let mut outcomes = Vec::with_capacity(specs.len());
    for spec in &specs {
        let outcome = renderer.run(spec)?;
        let cancelled = outcome.is_cancelled();
        outcomes.push(outcome);
        if cancelled {
            log::warn!(
                "Job {} cancelled, {} of {} run(s) not started",
                job_id,
                specs.len() - outcomes.len(),
                specs.len()
            );
            break;
        }
    }

    Ok(RenderSubmission {
        job_id,
        kind,
        outcomes,
    })
}

/// Record the completed artifacts of a submission in the manifest. The
/// manifest is left untouched when nothing completed.
pub fn publish_submission(
    contract: &OutputContract,
    submission: &RenderSubmission,
) -> anyhow::Result<usize> {
    let completed = submission.artifacts();
    if completed.is_empty() {
        return Ok(0);
    }

    let path = contract.manifest_json();
    let mut manifest = ArtifactManifest::load(&path)?;
    for artifact in &completed {
        manifest.record(&submission.job_id, submission.kind, artifact);
    }
    manifest.publish(&path)?;
    Ok(completed.len())
}

/// Feature matrix for the configured selection, rejected when empty
pub fn select_features<D: TabularDataset + ?Sized>(
    config: &PipelineConfig,
    dataset: &D,
) -> Result<FeatureMatrix> {
    let matrix = build_feature_matrix(dataset, &config.features.selection())?;
    matrix.require_features()?;
    Ok(matrix)
}

/// Selected feature vector as its own table (`{prefix}1..{prefix}m`)
pub fn feature_vector_table<D: TabularDataset + ?Sized>(
    config: &PipelineConfig,
    dataset: &D,
) -> Result<DataFrame> {
    select_features(config, dataset)?.to_dataset(&config.features.prefix)
}

/// Colored dendrogram and its transfer function
#[derive(Debug, Clone)]
pub struct ClusterReport {
    pub dendrogram: ColoredDendrogram,
    pub transfer_function: TransferFunction,
}

impl ClusterReport {
    /// One cluster label per member, in dataset row order
    pub fn labels_table(&self, column: &str) -> Result<DataFrame> {
        cluster_labels_table(&self.dendrogram.cut, column)
    }
}

pub fn cluster_labels_table(cut: &ClusterCut, column: &str) -> Result<DataFrame> {
    DataFrame::from_columns(vec![Column::int(
        column,
        cut.labels.iter().map(|&l| l as i64).collect(),
    )])
}

/// Cluster the configured feature vector and derive colors
pub fn cluster_dataset<D: TabularDataset + ?Sized>(
    config: &PipelineConfig,
    dataset: &D,
) -> Result<ClusterReport> {
    let matrix = select_features(config, dataset)?;
    let ramp = config.colors.ramp()?;
    let dendrogram = cluster_and_color(&matrix, &config.clustering, &ramp)?;
    let transfer_function =
        synthesize_transfer_function(&dendrogram.leaf_colors, dendrogram.k(), config.colors.highlight)?;
    Ok(ClusterReport {
        dendrogram,
        transfer_function,
    })
}

/// Dendrogram render request for the configured feature vector
pub fn dendrogram_request<D: TabularDataset + ?Sized>(
    config: &PipelineConfig,
    dataset: &D,
) -> Result<DendrogramRequest> {
    let matrix = select_features(config, dataset)?;
    let clusterer = AgglomerativeClusterer::new(config.clustering.linkage, config.clustering.metric)?;
    let clustering = clusterer.cluster(&matrix, ClusterMode::FullTree)?;
    DendrogramRequest::new(&matrix, clustering.tree)
}

pub fn cluster_transition_request(config: &PipelineConfig) -> ClusterTransitionRequest {
    ClusterTransitionRequest::new(
        config.labels.cluster_column.clone(),
        config.labels.subgroup_labels(),
    )
    .with_max_clusters(config.labels.max_clusters)
}

pub fn member_transition_request(
    config: &PipelineConfig,
    name: &str,
    state: &str,
) -> MemberTransitionRequest {
    MemberTransitionRequest {
        name: name.to_string(),
        state: state.to_string(),
        name_column: config.labels.name_column.clone(),
        state_column: config.labels.state_column.clone(),
        selection: config.features.selection(),
        labels: config.labels.subgroup_labels(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moltrans_core::TransitionError;

    fn ensemble() -> DataFrame {
        DataFrame::from_columns(vec![
            Column::categorical(
                "Name",
                vec!["phe".into(), "phe".into(), "tyr".into(), "tyr".into()],
            ),
            Column::float("Hole sg1", vec![0.1, 0.12, 0.9, 0.88]),
            Column::float("Particle sg1", vec![0.9, 0.88, 0.1, 0.12]),
        ])
        .unwrap()
    }

    #[test]
    fn test_cluster_dataset_two_groups() {
        let mut config = PipelineConfig::default();
        config.clustering.threshold = 0.5;
        let report = cluster_dataset(&config, &ensemble()).unwrap();
        assert_eq!(report.dendrogram.k(), 2);
        assert_eq!(report.transfer_function.bands(), 2);

        let labels = report.labels_table("Cluster").unwrap();
        assert_eq!(labels.rows(), 4);
        assert_eq!(labels.cell(0, 0), labels.cell(1, 0));
        assert_ne!(labels.cell(1, 0), labels.cell(2, 0));
    }

    #[test]
    fn test_empty_selection_rejected_before_clustering() {
        let mut config = PipelineConfig::default();
        config.features.preset = crate::config::FeaturePreset::Named;
        config.features.fragment = "energy".into();
        assert!(matches!(
            cluster_dataset(&config, &ensemble()),
            Err(TransitionError::EmptyFeatureVector(_))
        ));
    }

    #[test]
    fn test_feature_vector_table_prefix() {
        let config = PipelineConfig::default();
        let table = feature_vector_table(&config, &ensemble()).unwrap();
        assert_eq!(table.cols(), 2);
        assert_eq!(table.header(0), "TranFV1");
    }

    #[test]
    fn test_dendrogram_request_matches_rows() {
        let request = dendrogram_request(&PipelineConfig::default(), &ensemble()).unwrap();
        assert_eq!(request.features.len(), 4);
        assert_eq!(request.tree.events().len(), 3);
    }
}
