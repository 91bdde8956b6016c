//! Pipeline configuration loaded from TOML

use anyhow::Result;
use moltrans_core::{ClusteringParams, ColorRamp, FeatureSelection, SelectionRule, SemanticTag};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::jobs::SubgroupLabels;

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub clustering: ClusteringParams,

    #[serde(default)]
    pub colors: ColorConfig,

    #[serde(default)]
    pub renderer: RendererConfig,

    #[serde(default)]
    pub labels: LabelConfig,
}

impl PipelineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;

        if !self.clustering.threshold.is_finite() {
            anyhow::bail!(
                "Clustering threshold must be finite (got {})",
                self.clustering.threshold
            );
        }

        ColorRamp::preset(&self.colors.ramp)?;
        self.renderer.validate()?;

        if self.labels.max_clusters == 0 {
            anyhow::bail!("labels.max_clusters must be at least 1");
        }
        Ok(())
    }
}

/// Named feature-vector presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturePreset {
    HoleAndParticle,
    ChargeTransferMatrix,
    Trace,
    Bottleneck,
    /// The two reduced-dimension columns named "1" and "2"
    ReducedDims,
    /// Columns whose header contains `fragment`
    Named,
    ColumnRange,
}

/// Extra columns appended to any preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFeature {
    Osc,
    Rot,
    Energy,
    Trace,
}

impl ExtraFeature {
    pub fn tag(&self) -> SemanticTag {
        match self {
            ExtraFeature::Osc => SemanticTag::OscillatorStrength,
            ExtraFeature::Rot => SemanticTag::RotatoryStrength,
            ExtraFeature::Energy => SemanticTag::Energy,
            ExtraFeature::Trace => SemanticTag::Trace,
        }
    }
}

/// Feature selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_preset")]
    pub preset: FeaturePreset,

    /// Header fragment for the `named` preset
    #[serde(default = "default_fragment")]
    pub fragment: String,

    /// Inclusive 0-based column range for the `column_range` preset
    #[serde(default)]
    pub column_range: Option<[usize; 2]>,

    /// Last subgroup index for the `bottleneck` preset
    #[serde(default = "default_bottleneck_last")]
    pub bottleneck_last: usize,

    #[serde(default)]
    pub extras: Vec<ExtraFeature>,

    /// Column prefix when writing the selected vector back out
    #[serde(default = "default_fragment")]
    pub prefix: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            fragment: default_fragment(),
            column_range: None,
            bottleneck_last: default_bottleneck_last(),
            extras: Vec::new(),
            prefix: default_fragment(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        match (self.preset, self.column_range) {
            (FeaturePreset::ColumnRange, None) => {
                anyhow::bail!("Feature preset 'column_range' needs column_range = [lo, hi]")
            }
            (_, Some([lo, hi])) if lo > hi => {
                anyhow::bail!("Feature column range is empty ({} > {})", lo, hi)
            }
            _ => {}
        }
        if self.preset == FeaturePreset::Named && self.fragment.is_empty() {
            anyhow::bail!("Feature preset 'named' needs a non-empty fragment");
        }
        Ok(())
    }

    /// Selection described by this configuration
    pub fn selection(&self) -> FeatureSelection {
        let base = match self.preset {
            FeaturePreset::HoleAndParticle => FeatureSelection::hole_and_particle(),
            FeaturePreset::ChargeTransferMatrix => FeatureSelection::charge_transfer_matrix(),
            FeaturePreset::Trace => FeatureSelection::trace(),
            FeaturePreset::Bottleneck => FeatureSelection::bottleneck(self.bottleneck_last),
            FeaturePreset::ReducedDims => FeatureSelection::new(SelectionRule::Any(vec![
                SelectionRule::ExactName("1".into()),
                SelectionRule::ExactName("2".into()),
            ])),
            FeaturePreset::Named => FeatureSelection::named(self.fragment.clone()),
            FeaturePreset::ColumnRange => {
                let [lo, hi] = self.column_range.unwrap_or([0, 0]);
                FeatureSelection::column_range(lo, hi)
            }
        };
        self.extras
            .iter()
            .fold(base, |selection, extra| selection.with_extra(extra.tag()))
    }
}

/// Color settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorConfig {
    /// Ramp preset name
    #[serde(default = "default_ramp")]
    pub ramp: String,

    /// Cluster painted with the accent color; all others neutral
    #[serde(default)]
    pub highlight: Option<usize>,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            ramp: default_ramp(),
            highlight: None,
        }
    }
}

impl ColorConfig {
    pub fn ramp(&self) -> moltrans_core::Result<ColorRamp> {
        ColorRamp::preset(&self.ramp)
    }
}

/// External renderer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Executable, looked up on PATH when it has no directory part
    #[serde(default = "default_executable")]
    pub executable: PathBuf,

    /// Arguments placed before the entry name (e.g. a classpath)
    #[serde(default)]
    pub args: Vec<String>,

    /// Directory the renderer runs in
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_dendrogram_entry")]
    pub dendrogram_entry: String,

    #[serde(default = "default_cluster_entry")]
    pub cluster_entry: String,

    #[serde(default = "default_member_entry")]
    pub member_entry: String,

    /// Seconds before a renderer run is killed
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            args: Vec::new(),
            working_dir: None,
            dendrogram_entry: default_dendrogram_entry(),
            cluster_entry: default_cluster_entry(),
            member_entry: default_member_entry(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            anyhow::bail!("Renderer executable must not be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("Renderer timeout_secs must be > 0");
        }
        Ok(())
    }
}

/// Column names and subgroup labels for transition diagrams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_cluster_column")]
    pub cluster_column: String,

    #[serde(default = "default_name_column")]
    pub name_column: String,

    #[serde(default = "default_state_column")]
    pub state_column: String,

    /// Number of subgroups written to labels files (clamped to 1..=5)
    #[serde(default = "default_subgroups")]
    pub subgroups: usize,

    #[serde(default = "default_subgroup_names")]
    pub subgroup_names: Vec<String>,

    /// Largest cluster id range a cluster diagram job may expand to
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            cluster_column: default_cluster_column(),
            name_column: default_name_column(),
            state_column: default_state_column(),
            subgroups: default_subgroups(),
            subgroup_names: default_subgroup_names(),
            max_clusters: default_max_clusters(),
        }
    }
}

impl LabelConfig {
    pub fn subgroup_labels(&self) -> SubgroupLabels {
        SubgroupLabels::new(self.subgroups, self.subgroup_names.clone())
    }
}

fn default_preset() -> FeaturePreset { FeaturePreset::HoleAndParticle }
fn default_fragment() -> String { "TranFV".to_string() }
fn default_bottleneck_last() -> usize { 2 }
fn default_ramp() -> String { "red_green".to_string() }
fn default_executable() -> PathBuf { PathBuf::from("java") }
fn default_dendrogram_entry() -> String { "Dendrogram".to_string() }
fn default_cluster_entry() -> String { "ClusterDiagram".to_string() }
fn default_member_entry() -> String { "TransitionDiagram".to_string() }
fn default_timeout_secs() -> u64 { 300 }
fn default_cluster_column() -> String { "Cluster".to_string() }
fn default_name_column() -> String { "Name".to_string() }
fn default_state_column() -> String { "State".to_string() }
fn default_subgroups() -> usize { 3 }
fn default_subgroup_names() -> Vec<String> { (1..=5).map(|i| i.to_string()).collect() }
fn default_max_clusters() -> usize { crate::jobs::DEFAULT_MAX_CLUSTERS }
