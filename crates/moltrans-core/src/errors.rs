//! Error types for the transition clustering pipeline.
//!
//! Every failure here is local and recoverable: callers get a value back and
//! decide what to surface. Nothing in this crate panics on bad input.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all moltrans operations.
#[derive(Error, Debug)]
pub enum TransitionError {
    /// A required named column (cluster, name, state, charges) is absent
    #[error("Missing column '{0}'")]
    MissingColumn(String),

    /// The selection rule matched no columns, or no rows matched a request
    #[error("Empty feature vector: {0}")]
    EmptyFeatureVector(String),

    /// Fewer rows than clustering needs
    #[error("Insufficient data: need at least {required} members, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// A matched feature column does not hold numbers
    #[error("Column '{0}' is not numeric")]
    NonNumericColumn(String),

    /// The declared value range of the cluster column is empty or malformed
    #[error("Invalid cluster range in column '{column}': {reason}")]
    InvalidClusterRange { column: String, reason: String },

    /// Linkage/metric combination the clusterer cannot honour
    #[error("Linkage '{linkage}' cannot be combined with metric '{metric}'")]
    IncompatibleLinkage { linkage: String, metric: String },

    /// Merge history that does not describe a binary tree over n leaves
    #[error("Invalid merge tree: {0}")]
    InvalidMergeTree(String),

    /// Highlighted band index outside [0, k)
    #[error("Highlighted cluster {index} is out of range for {clusters} clusters")]
    HighlightOutOfRange { index: usize, clusters: usize },

    /// Hole/particle charge vectors that cannot form a transfer matrix
    #[error("Invalid charge vectors: {0}")]
    InvalidChargeVectors(String),

    /// Renderer exited with a non-zero status
    #[error("Renderer '{program}' failed with exit code {exit_code:?}: {stderr}")]
    RendererProcessFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Renderer exceeded its time budget and was killed
    #[error("Renderer '{program}' timed out after {millis} ms")]
    RendererTimedOut { program: String, millis: u64 },

    /// Renderer run was cancelled by the caller and killed
    #[error("Renderer '{0}' was cancelled")]
    RendererCancelled(String),

    /// Renderer executable could not be located or started
    #[error("Renderer not found: {0}")]
    RendererNotFound(String),

    /// Malformed text input (request files, parameter files, cells)
    #[error("Parse error in {source_name} line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors with the path that caused them
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV reader/writer errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransitionError {
    /// Creates a missing-column error.
    pub fn missing_column(name: impl Into<String>) -> Self {
        TransitionError::MissingColumn(name.into())
    }

    /// Creates an empty-feature-vector error.
    pub fn empty_features(message: impl Into<String>) -> Self {
        TransitionError::EmptyFeatureVector(message.into())
    }

    /// Creates an invalid-cluster-range error.
    pub fn cluster_range(column: impl Into<String>, reason: impl Into<String>) -> Self {
        TransitionError::InvalidClusterRange {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-merge-tree error.
    pub fn merge_tree(message: impl Into<String>) -> Self {
        TransitionError::InvalidMergeTree(message.into())
    }

    /// Creates a parse error.
    pub fn parse(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        TransitionError::Parse {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        TransitionError::Config(message.into())
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransitionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Checks whether a renderer failure might succeed on a second attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransitionError::RendererTimedOut { .. } | TransitionError::RendererProcessFailed { .. }
        )
    }

    /// Returns a user-friendly error message with actionable guidance.
    pub fn user_message(&self) -> String {
        match self {
            TransitionError::MissingColumn(name) => format!(
                "Missing column '{}'\n\
                 → Column names are matched case-insensitively; check the dataset header.",
                name
            ),
            TransitionError::EmptyFeatureVector(msg) => format!(
                "Empty feature vector: {}\n\
                 → Check the selection rule against the dataset column names.",
                msg
            ),
            TransitionError::RendererNotFound(msg) => format!(
                "Renderer not found: {}\n\
                 → Set [renderer] executable in the configuration or put it on PATH.",
                msg
            ),
            TransitionError::RendererTimedOut { program, millis } => format!(
                "Renderer '{}' timed out after {} ms\n\
                 → Raise [renderer] timeout_secs or check the renderer installation.",
                program, millis
            ),
            _ => self.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransitionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransitionError::missing_column("Cluster");
        assert_eq!(err.to_string(), "Missing column 'Cluster'");

        let err = TransitionError::InsufficientData {
            required: 2,
            actual: 1,
        };
        assert!(err.to_string().contains("at least 2"));
    }

    #[test]
    fn test_retriable_errors() {
        let timeout = TransitionError::RendererTimedOut {
            program: "java".into(),
            millis: 250,
        };
        assert!(timeout.is_retriable());
        assert_eq!(timeout.to_string(), "Renderer 'java' timed out after 250 ms");
        assert!(!TransitionError::empty_features("nothing matched").is_retriable());
    }

    #[test]
    fn test_user_message_has_guidance() {
        let msg = TransitionError::empty_features("rule 'hole'").user_message();
        assert!(msg.contains("→"));
    }
}
