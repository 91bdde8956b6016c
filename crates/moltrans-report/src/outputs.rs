//! Output contract and artifact manifest

use crate::jobs::{JobId, RendererEntry};
use anyhow::{Context, Result};
use chrono::Local;
use moltrans_core::DataFrame;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Output directory layout
#[derive(Debug, Clone)]
pub struct OutputContract {
    /// Base output directory
    pub base_dir: PathBuf,
}

impl OutputContract {
    /// Create output contract and ensure the base directory exists
    pub fn new(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create directory: {}", base_dir.display()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    // Path accessors
    pub fn manifest_json(&self) -> PathBuf {
        self.base_dir.join("artifacts.json")
    }

    pub fn feature_vector_csv(&self) -> PathBuf {
        self.base_dir.join("feature_vector.csv")
    }

    pub fn cluster_labels_csv(&self) -> PathBuf {
        self.base_dir.join("cluster_labels.csv")
    }

    pub fn dendrogram_json(&self) -> PathBuf {
        self.base_dir.join("dendrogram.json")
    }

    pub fn transfer_function_json(&self) -> PathBuf {
        self.base_dir.join("transfer_function.json")
    }

    pub fn charge_transfer_csv(&self) -> PathBuf {
        self.base_dir.join("charge_transfer.csv")
    }

    pub fn statistics_csv(&self) -> PathBuf {
        self.base_dir.join("cluster_statistics.csv")
    }

    pub fn statistics_diff_csv(&self) -> PathBuf {
        self.base_dir.join("cluster_statistics_diff.csv")
    }

    pub fn statistics_mean_csv(&self) -> PathBuf {
        self.base_dir.join("cluster_statistics_mean.csv")
    }

    pub fn parameters_csv(&self) -> PathBuf {
        self.base_dir.join("parameters.csv")
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        crate::jobs::job_dir(&self.base_dir, job_id)
    }
}

/// Write `contents` next to `path` and rename it into place, so readers
/// never see a partially written file
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()))
}

/// Write `frame` as CSV and publish it atomically
pub fn publish_csv(path: &Path, frame: &DataFrame) -> Result<()> {
    let tmp = tmp_path(path);
    frame
        .write_csv(&tmp)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and publish it atomically
pub fn publish_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

/// One successfully rendered artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub job_id: JobId,
    pub kind: RendererEntry,
    pub artifact: PathBuf,
    pub created_at: String,
}

/// Every artifact published into an output directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
}

impl ArtifactManifest {
    /// Load the manifest, or an empty one if the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    /// Add or replace the record for an artifact path
    pub fn record(&mut self, job_id: &JobId, kind: RendererEntry, artifact: &Path) {
        self.artifacts.retain(|r| r.artifact != artifact);
        self.artifacts.push(ArtifactRecord {
            job_id: job_id.clone(),
            kind,
            artifact: artifact.to_path_buf(),
            created_at: Local::now().to_rfc3339(),
        });
    }

    pub fn publish(&self, path: &Path) -> Result<()> {
        publish_json(path, self)
    }
}
