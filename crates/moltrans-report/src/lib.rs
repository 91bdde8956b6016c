//! moltrans-report: render-job protocol and pipeline front end
//!
//! Writes the request files an external diagram renderer consumes, runs the
//! renderer under a timeout, and records the artifacts it produced.
//!
//! # CLI Contract
//!
//! ```bash
//! moltrans cluster --data ensemble.csv --out results/
//! moltrans render dendrogram --data ensemble.csv --out results/ --threshold 1.5
//! moltrans render member --data ensemble.csv --name phe --state "State 1" --out results/
//! ```

pub mod config;
pub mod jobs;
pub mod outputs;
pub mod pipeline;
pub mod renderer;

// Re-exports
pub use config::{ColorConfig, FeatureConfig, FeaturePreset, LabelConfig, PipelineConfig, RendererConfig};
pub use jobs::{
    ClusterTransitionRequest, DendrogramRequest, JobId, MemberTransitionRequest, RenderJobSpec,
    RendererEntry, SubgroupLabels,
};
pub use outputs::{ArtifactManifest, ArtifactRecord, OutputContract};
pub use pipeline::{
    cluster_dataset, submit_render_job, publish_submission, ClusterReport, RenderRequest,
    RenderSubmission,
};
pub use renderer::{CancellationToken, ProcessRun, RenderOutcome, RendererProcess};

/// Crate version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if the configured renderer executable is reachable and return its path
pub fn find_renderer(config: &RendererConfig) -> Option<std::path::PathBuf> {
    RendererProcess::from_config(config).resolve().ok()
}
