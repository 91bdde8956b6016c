//! File-based render job protocol.
//!
//! Each request is written as plain text files under `{output_dir}/{job_id}/`
//! and turned into a `RenderJobSpec`: the renderer entry to call, its
//! positional arguments and the artifact path it is expected to produce.
//! The artifact path is derived before the renderer runs; it only counts as
//! produced once the renderer exits successfully.

use chrono::Local;
use moltrans_core::{
    build_feature_matrix, FeatureMatrix, FeatureSelection, MergeEvent, MergeTree, Result,
    TabularDataset, TransitionError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const DENDROGRAM_REQUEST_FILE: &str = "augmented_dendrogram.txt";
pub const DENDROGRAM_ARTIFACT: &str = "dendrogram.png";
pub const MAX_SUBGROUP_LABELS: usize = 5;

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Correlation id for one render request. Also the name of the job's
/// output subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Fresh id: local timestamp, process id and a per-process counter
    pub fn generate() -> Self {
        let seq = JOB_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "job-{}-{}-{}",
            Local::now().format("%Y%m%dT%H%M%S%3f"),
            std::process::id(),
            seq
        ))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which renderer program a job needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererEntry {
    Dendrogram,
    ClusterDiagram,
    TransitionDiagram,
}

impl fmt::Display for RendererEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RendererEntry::Dendrogram => "dendrogram",
            RendererEntry::ClusterDiagram => "cluster_diagram",
            RendererEntry::TransitionDiagram => "transition_diagram",
        })
    }
}

/// A prepared render job: request files are on disk, nothing has run yet
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJobSpec {
    pub job_id: JobId,
    pub output_dir: PathBuf,
    pub entry: RendererEntry,
    pub request_files: Vec<PathBuf>,
    /// Positional arguments after the entry name
    pub args: Vec<String>,
    pub expected_artifact: PathBuf,
}

impl RenderJobSpec {
    pub fn job_dir(&self) -> PathBuf {
        job_dir(&self.output_dir, &self.job_id)
    }
}

pub fn job_dir(output_dir: &Path, job_id: &JobId) -> PathBuf {
    output_dir.join(job_id.as_str())
}

fn create_job_dir(output_dir: &Path, job_id: &JobId) -> Result<PathBuf> {
    let dir = job_dir(output_dir, job_id);
    fs::create_dir_all(&dir).map_err(|e| TransitionError::io(&dir, e))?;
    Ok(dir)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|e| TransitionError::io(path, e))
}

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn feature_lines(rows: &[Vec<f64>]) -> String {
    let mut text = String::new();
    for row in rows {
        text.push_str(&join_values(row));
        text.push('\n');
    }
    text
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// Augmented dendrogram
// ============================================================================

/// Leaf feature vectors plus the merge history over them
#[derive(Debug, Clone, PartialEq)]
pub struct DendrogramRequest {
    pub features: Vec<Vec<f64>>,
    pub tree: MergeTree,
}

impl DendrogramRequest {
    pub fn new(matrix: &FeatureMatrix, tree: MergeTree) -> Result<Self> {
        if matrix.n_rows() != tree.n_leaves() {
            return Err(TransitionError::merge_tree(format!(
                "{} feature rows but {} tree leaves",
                matrix.n_rows(),
                tree.n_leaves()
            )));
        }
        Ok(Self {
            features: matrix.rows().to_vec(),
            tree,
        })
    }

    /// Line 1 is `n`, then `n` feature lines, then `n - 1` lines of
    /// `left right distance`
    pub fn to_text(&self) -> String {
        let mut text = format!("{}\n", self.tree.n_leaves());
        text.push_str(&feature_lines(&self.features));
        for event in self.tree.events() {
            text.push_str(&format!("{} {} {}\n", event.left, event.right, event.distance));
        }
        text
    }

    pub fn parse(text: &str, source_name: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate();
        let (_, first) = lines
            .next()
            .ok_or_else(|| TransitionError::parse(source_name, 1, "empty request"))?;
        let n: usize = first
            .trim()
            .parse()
            .map_err(|_| TransitionError::parse(source_name, 1, format!("'{}' is not a leaf count", first.trim())))?;

        // The header is untrusted: check it against the lines actually present
        // before sizing anything from it
        let remaining = text.lines().count() - 1;
        if n == 0 || n > remaining {
            return Err(TransitionError::parse(
                source_name,
                1,
                format!("header declares {} leaves but {} lines follow", n, remaining),
            ));
        }

        let mut features = Vec::with_capacity(n);
        for _ in 0..n {
            let (idx, line) = lines
                .next()
                .ok_or_else(|| TransitionError::parse(source_name, features.len() + 2, "missing feature line"))?;
            let row = line
                .split_whitespace()
                .map(|v| {
                    v.parse::<f64>().map_err(|_| {
                        TransitionError::parse(source_name, idx + 1, format!("'{}' is not a number", v))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            features.push(row);
        }

        let mut events = Vec::new();
        for (idx, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(TransitionError::parse(
                    source_name,
                    idx + 1,
                    format!("expected 'left right distance', found {} fields", fields.len()),
                ));
            }
            let bad = |what: &str| TransitionError::parse(source_name, idx + 1, format!("bad {}", what));
            events.push(MergeEvent {
                left: fields[0].parse().map_err(|_| bad("left id"))?,
                right: fields[1].parse().map_err(|_| bad("right id"))?,
                distance: fields[2].parse().map_err(|_| bad("distance"))?,
            });
        }

        Ok(Self {
            features,
            tree: MergeTree::new(n, events)?,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| TransitionError::io(path, e))?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Write the request file and build the job. Args:
    /// `(requestFile, outputDir, jobId, threshold)`.
    pub fn prepare(&self, output_dir: &Path, job_id: &JobId, threshold: f64) -> Result<RenderJobSpec> {
        let dir = create_job_dir(output_dir, job_id)?;
        let request_file = dir.join(DENDROGRAM_REQUEST_FILE);
        write_text(&request_file, &self.to_text())?;

        Ok(RenderJobSpec {
            job_id: job_id.clone(),
            output_dir: output_dir.to_path_buf(),
            entry: RendererEntry::Dendrogram,
            request_files: vec![request_file.clone()],
            args: vec![
                path_arg(&request_file),
                path_arg(output_dir),
                job_id.to_string(),
                threshold.to_string(),
            ],
            expected_artifact: dir.join(DENDROGRAM_ARTIFACT),
        })
    }
}

// ============================================================================
// Labels
// ============================================================================

/// Subgroup count and names written after the title of a labels file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgroupLabels {
    names: Vec<String>,
}

impl SubgroupLabels {
    /// `count` is clamped to 1..=5; missing names default to their 1-based
    /// index
    pub fn new(count: usize, names: Vec<String>) -> Self {
        let count = count.clamp(1, MAX_SUBGROUP_LABELS);
        let names = (0..count)
            .map(|i| names.get(i).cloned().unwrap_or_else(|| (i + 1).to_string()))
            .collect();
        Self { names }
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Title line, subgroup count, one name per line
    pub fn to_text(&self, title: &str) -> String {
        let mut text = format!("{}\n{}\n", title, self.count());
        for name in &self.names {
            text.push_str(name);
            text.push('\n');
        }
        text
    }
}

impl Default for SubgroupLabels {
    fn default() -> Self {
        Self::new(3, Vec::new())
    }
}

// ============================================================================
// Cluster transition diagrams
// ============================================================================

/// Upper bound on the number of cluster ids a single request expands to
pub const DEFAULT_MAX_CLUSTERS: usize = 1000;

/// Inclusive cluster id range from the declared value range of the column.
/// A range covering more than `max_clusters` ids is rejected.
pub fn cluster_ids<D: TabularDataset + ?Sized>(
    dataset: &D,
    cluster_column: &str,
    max_clusters: usize,
) -> Result<RangeInclusive<i64>> {
    let col = dataset.require_column(cluster_column)?;
    if !dataset.is_numeric(col) {
        return Err(TransitionError::cluster_range(cluster_column, "column is not numeric"));
    }
    let (lo, hi) = dataset
        .value_range(col)
        .ok_or_else(|| TransitionError::cluster_range(cluster_column, "column has no values"))?;
    if !lo.is_finite() || !hi.is_finite() {
        return Err(TransitionError::cluster_range(cluster_column, "range is not finite"));
    }
    let (lo, hi) = (lo.floor() as i64, hi.floor() as i64);
    let span = i128::from(hi) - i128::from(lo) + 1;
    if span > max_clusters as i128 {
        return Err(TransitionError::cluster_range(
            cluster_column,
            format!("{} cluster ids ({}..={}) exceed the limit of {}", span, lo, hi, max_clusters),
        ));
    }
    Ok(lo..=hi)
}

/// One diagram per cluster id, drawn from the hole/particle columns
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTransitionRequest {
    pub cluster_column: String,
    pub labels: SubgroupLabels,
    pub max_clusters: usize,
}

impl ClusterTransitionRequest {
    pub fn new(cluster_column: impl Into<String>, labels: SubgroupLabels) -> Self {
        Self {
            cluster_column: cluster_column.into(),
            labels,
            max_clusters: DEFAULT_MAX_CLUSTERS,
        }
    }

    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    pub fn features_file(dir: &Path, cluster: i64) -> PathBuf {
        dir.join(format!("cluster_diagram_cluster{}.txt", cluster))
    }

    pub fn labels_file(dir: &Path, cluster: i64) -> PathBuf {
        dir.join(format!("cluster_diagram_labels{}.txt", cluster))
    }

    pub fn artifact_name(cluster: i64) -> String {
        format!("{}_CD.png", cluster)
    }

    /// Write features and labels files for every cluster id and build one
    /// job per id. A cluster id no row carries still gets an empty features
    /// file. Args: `(featuresFile, labelsFile, outputDir, jobId, clusterId)`.
    pub fn prepare<D: TabularDataset + ?Sized>(
        &self,
        dataset: &D,
        output_dir: &Path,
        job_id: &JobId,
    ) -> Result<Vec<RenderJobSpec>> {
        let ids = cluster_ids(dataset, &self.cluster_column, self.max_clusters)?;
        let cluster_col = dataset.require_column(&self.cluster_column)?;
        let matrix = build_feature_matrix(dataset, &FeatureSelection::hole_and_particle())?;
        let membership: Vec<Option<f64>> = (0..dataset.rows())
            .map(|row| dataset.cell(row, cluster_col).as_f64())
            .collect();

        let dir = create_job_dir(output_dir, job_id)?;
        let mut specs = Vec::new();
        for cluster in ids {
            let rows: Vec<Vec<f64>> = membership
                .iter()
                .enumerate()
                .filter(|(_, value)| **value == Some(cluster as f64))
                .map(|(row, _)| matrix.row(row).to_vec())
                .collect();
            if rows.is_empty() {
                log::warn!("Cluster {} has no members, writing an empty features file", cluster);
            }

            let features_file = Self::features_file(&dir, cluster);
            let labels_file = Self::labels_file(&dir, cluster);
            write_text(&features_file, &feature_lines(&rows))?;
            write_text(&labels_file, &self.labels.to_text(&format!("Cluster {}", cluster)))?;

            specs.push(RenderJobSpec {
                job_id: job_id.clone(),
                output_dir: output_dir.to_path_buf(),
                entry: RendererEntry::ClusterDiagram,
                request_files: vec![features_file.clone(), labels_file.clone()],
                args: vec![
                    path_arg(&features_file),
                    path_arg(&labels_file),
                    path_arg(output_dir),
                    job_id.to_string(),
                    cluster.to_string(),
                ],
                expected_artifact: dir.join(Self::artifact_name(cluster)),
            });
        }
        Ok(specs)
    }
}

// ============================================================================
// Member transition diagram
// ============================================================================

/// Diagram for the rows matching a name/state pair
#[derive(Debug, Clone, PartialEq)]
pub struct MemberTransitionRequest {
    pub name: String,
    pub state: String,
    pub name_column: String,
    pub state_column: String,
    pub selection: FeatureSelection,
    pub labels: SubgroupLabels,
}

pub const MEMBER_FEATURES_FILE: &str = "member_diagram_feature.txt";
pub const MEMBER_LABELS_FILE: &str = "member_diagram_labels.txt";

impl MemberTransitionRequest {
    /// `name_state` with spaces removed from the state
    pub fn member_file_id(&self) -> String {
        format!("{}_{}", self.name, self.state.replace(' ', ""))
    }

    pub fn artifact_name(&self) -> String {
        format!("{}_MD.png", self.member_file_id())
    }

    /// Rows whose name and state cells contain the requested substrings
    pub fn matching_rows<D: TabularDataset + ?Sized>(&self, dataset: &D) -> Result<Vec<usize>> {
        let name_col = dataset.require_column(&self.name_column)?;
        let state_col = dataset.require_column(&self.state_column)?;
        Ok((0..dataset.rows())
            .filter(|&row| {
                dataset.cell(row, name_col).to_string().contains(&self.name)
                    && dataset.cell(row, state_col).to_string().contains(&self.state)
            })
            .collect())
    }

    /// Write features and labels files and build the job. Nothing is written
    /// when no row or no feature column matches. Args:
    /// `(featuresFile, labelsFile, outputDir, jobId, memberFileId)`.
    pub fn prepare<D: TabularDataset + ?Sized>(
        &self,
        dataset: &D,
        output_dir: &Path,
        job_id: &JobId,
    ) -> Result<RenderJobSpec> {
        let rows = self.matching_rows(dataset)?;
        let matrix = build_feature_matrix(dataset, &self.selection)?;
        if rows.is_empty() || matrix.width() == 0 {
            return Err(TransitionError::empty_features(format!(
                "no feature vector for name '{}' and state '{}'",
                self.name, self.state
            )));
        }

        let vectors: Vec<Vec<f64>> = rows.iter().map(|&r| matrix.row(r).to_vec()).collect();
        let dir = create_job_dir(output_dir, job_id)?;
        let features_file = dir.join(MEMBER_FEATURES_FILE);
        let labels_file = dir.join(MEMBER_LABELS_FILE);
        write_text(&features_file, &feature_lines(&vectors))?;
        write_text(
            &labels_file,
            &self.labels.to_text(&format!("{}, {}", self.name, self.state)),
        )?;

        Ok(RenderJobSpec {
            job_id: job_id.clone(),
            output_dir: output_dir.to_path_buf(),
            entry: RendererEntry::TransitionDiagram,
            request_files: vec![features_file.clone(), labels_file.clone()],
            args: vec![
                path_arg(&features_file),
                path_arg(&labels_file),
                path_arg(output_dir),
                job_id.to_string(),
                self.member_file_id(),
            ],
            expected_artifact: dir.join(self.artifact_name()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moltrans_core::{Column, DataFrame};
    use tempfile::TempDir;

    fn four_leaf_request() -> DendrogramRequest {
        let matrix = FeatureMatrix::from_rows(vec![
            vec![0.1, 0.25],
            vec![0.2, 0.3],
            vec![1.5, -2.0],
            vec![1.0 / 3.0, 7.0],
        ])
        .unwrap();
        let tree = MergeTree::new(
            4,
            vec![
                MergeEvent { left: 0, right: 1, distance: 0.5 },
                MergeEvent { left: 2, right: 3, distance: 1.0 },
                MergeEvent { left: 4, right: 5, distance: 2.0 },
            ],
        )
        .unwrap();
        DendrogramRequest::new(&matrix, tree).unwrap()
    }

    #[test]
    fn test_job_ids_unique() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("job-"));
    }

    #[test]
    fn test_dendrogram_request_format() {
        let text = four_leaf_request().to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + 4 + 3);
        assert_eq!(lines[0], "4");
        assert_eq!(lines[1], "0.1 0.25");
        assert_eq!(lines[7], "4 5 2");
    }

    #[test]
    fn test_dendrogram_request_roundtrip() {
        let request = four_leaf_request();
        let parsed = DendrogramRequest::parse(&request.to_text(), "request").unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_dendrogram_request_parse_errors() {
        assert!(DendrogramRequest::parse("", "r").is_err());
        assert!(DendrogramRequest::parse("x\n", "r").is_err());
        let err = DendrogramRequest::parse("2\n1 2\n3 4\n0 1\n", "r").unwrap_err();
        assert!(matches!(err, TransitionError::Parse { line: 4, .. }));
        // Merge line count must match the leaf count
        assert!(DendrogramRequest::parse("2\n1\n2\n", "r").is_err());
    }

    #[test]
    fn test_dendrogram_request_oversized_header() {
        for header in ["18446744073709551615\n", "1000000000000\n0.5\n", "0\n"] {
            let err = DendrogramRequest::parse(header, "r").unwrap_err();
            assert!(matches!(err, TransitionError::Parse { line: 1, .. }), "{header:?}: {err}");
        }
        assert!(DendrogramRequest::parse("3\n1\n2\n", "r").is_err());
    }

    #[test]
    fn test_dendrogram_prepare() {
        let tmp = TempDir::new().unwrap();
        let job = JobId::new("job_a");
        let spec = four_leaf_request().prepare(tmp.path(), &job, 1.5).unwrap();

        assert_eq!(spec.entry, RendererEntry::Dendrogram);
        assert!(spec.request_files[0].exists());
        assert_eq!(spec.args[2], "job_a");
        assert_eq!(spec.args[3], "1.5");
        assert_eq!(spec.expected_artifact, tmp.path().join("job_a").join("dendrogram.png"));
        assert!(!spec.expected_artifact.exists());
    }

    #[test]
    fn test_subgroup_labels_clamped() {
        assert_eq!(SubgroupLabels::new(0, vec![]).count(), 1);
        let labels = SubgroupLabels::new(9, vec!["ring".into()]);
        assert_eq!(labels.count(), 5);
        assert_eq!(labels.names()[0], "ring");
        assert_eq!(labels.names()[4], "5");
        assert_eq!(
            SubgroupLabels::new(2, vec!["a".into(), "b".into()]).to_text("Cluster 1"),
            "Cluster 1\n2\na\nb\n"
        );
    }

    fn members() -> DataFrame {
        DataFrame::from_columns(vec![
            Column::categorical("Name", vec!["phe".into(), "phe".into(), "tyr".into()]),
            Column::categorical("State", vec!["State 1".into(), "State 2".into(), "State 1".into()]),
            Column::int("Cluster", vec![1, 4, 1]),
            Column::float("Hole sg1", vec![0.5, 0.25, 0.75]),
            Column::float("Particle sg1", vec![0.5, 0.75, 0.25]),
            Column::float("TranFV1", vec![1.0, 2.0, 3.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_cluster_ids_from_range() {
        assert_eq!(cluster_ids(&members(), "cluster", DEFAULT_MAX_CLUSTERS).unwrap(), 1..=4);
        assert!(matches!(
            cluster_ids(&members(), "Name", DEFAULT_MAX_CLUSTERS),
            Err(TransitionError::InvalidClusterRange { .. })
        ));
        let empty = DataFrame::from_columns(vec![Column::int("Cluster", vec![])]).unwrap();
        assert!(matches!(
            cluster_ids(&empty, "Cluster", DEFAULT_MAX_CLUSTERS),
            Err(TransitionError::InvalidClusterRange { .. })
        ));
    }

    #[test]
    fn test_cluster_prepare_writes_every_id() {
        let tmp = TempDir::new().unwrap();
        let job = JobId::new("j");
        let request = ClusterTransitionRequest::new("Cluster", SubgroupLabels::new(1, vec!["ring".into()]));
        let specs = request.prepare(&members(), tmp.path(), &job).unwrap();
        assert_eq!(specs.len(), 4);

        let dir = tmp.path().join("j");
        let c1 = fs::read_to_string(ClusterTransitionRequest::features_file(&dir, 1)).unwrap();
        assert_eq!(c1, "0.5 0.5\n0.75 0.25\n");
        let c2 = fs::read_to_string(ClusterTransitionRequest::features_file(&dir, 2)).unwrap();
        assert_eq!(c2, "");
        let l2 = fs::read_to_string(ClusterTransitionRequest::labels_file(&dir, 2)).unwrap();
        assert_eq!(l2, "Cluster 2\n1\nring\n");

        assert_eq!(specs[3].args[4], "4");
        assert_eq!(specs[3].expected_artifact, dir.join("4_CD.png"));
    }

    #[test]
    fn test_cluster_span_limit() {
        assert_eq!(cluster_ids(&members(), "Cluster", 4).unwrap(), 1..=4);
        assert!(matches!(
            cluster_ids(&members(), "Cluster", 3),
            Err(TransitionError::InvalidClusterRange { .. })
        ));

        let wide = DataFrame::from_columns(vec![
            Column::int("Cluster", vec![0, 1_000_000_000]),
            Column::float("Hole sg1", vec![0.5, 0.5]),
            Column::float("Particle sg1", vec![0.5, 0.5]),
        ])
        .unwrap();
        let extreme = DataFrame::from_columns(vec![Column::float("Cluster", vec![-1e300, 1e300])]).unwrap();
        assert!(cluster_ids(&extreme, "Cluster", usize::MAX).is_err());

        let tmp = TempDir::new().unwrap();
        let request = ClusterTransitionRequest::new("Cluster", SubgroupLabels::default());
        let err = request.prepare(&wide, tmp.path(), &JobId::new("j")).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidClusterRange { .. }));
        assert!(!tmp.path().join("j").exists());
    }

    #[test]
    fn test_cluster_prepare_missing_column_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let request = ClusterTransitionRequest::new("Group", SubgroupLabels::default());
        let err = request.prepare(&members(), tmp.path(), &JobId::new("j")).unwrap_err();
        assert!(matches!(err, TransitionError::MissingColumn(_)));
        assert!(!tmp.path().join("j").exists());
    }

    fn member_request(name: &str, state: &str) -> MemberTransitionRequest {
        MemberTransitionRequest {
            name: name.into(),
            state: state.into(),
            name_column: "Name".into(),
            state_column: "State".into(),
            selection: FeatureSelection::named("TranFV"),
            labels: SubgroupLabels::new(2, vec![]),
        }
    }

    #[test]
    fn test_member_prepare() {
        let tmp = TempDir::new().unwrap();
        let request = member_request("phe", "State 2");
        let spec = request.prepare(&members(), tmp.path(), &JobId::new("m")).unwrap();

        assert_eq!(request.member_file_id(), "phe_State2");
        assert_eq!(spec.args[4], "phe_State2");
        assert_eq!(spec.expected_artifact, tmp.path().join("m").join("phe_State2_MD.png"));
        let features = fs::read_to_string(&spec.request_files[0]).unwrap();
        assert_eq!(features, "2\n");
        let labels = fs::read_to_string(&spec.request_files[1]).unwrap();
        assert_eq!(labels, "phe, State 2\n2\n1\n2\n");
    }

    #[test]
    fn test_member_without_match_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let err = member_request("trp", "State 1")
            .prepare(&members(), tmp.path(), &JobId::new("m"))
            .unwrap_err();
        assert!(matches!(err, TransitionError::EmptyFeatureVector(_)));
        assert!(!tmp.path().join("m").join(MEMBER_LABELS_FILE).exists());
        assert!(!tmp.path().join("m").join(MEMBER_FEATURES_FILE).exists());
    }
}
