//! Feature-matrix extraction by semantic column matching.
//!
//! Transition tables name their columns after what they hold ("Hole sg1",
//! "Particle sg2", "Transfer 12", "Oscillator strength", ...). A
//! `SelectionRule` decides which columns form the feature vector; the
//! resulting `FeatureMatrix` keeps dataset row order, which is the leaf order
//! of every dendrogram built from it.

use crate::dataset::{Column, DataFrame, TabularDataset};
use crate::errors::{Result, TransitionError};
use serde::{Deserialize, Serialize};

/// Column semantics recognised from header text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "tag")]
pub enum SemanticTag {
    Hole,
    Particle,
    Difference,
    TransferMatrix,
    /// Diagonal transfer cell: "transfer" plus two equal trailing characters
    Trace,
    /// First or last subgroup marker ("h0" or "h{last}")
    Bottleneck { last: usize },
    OscillatorStrength,
    RotatoryStrength,
    Energy,
}

impl SemanticTag {
    /// Whether a lower-cased header carries this tag
    pub fn matches(&self, header: &str) -> bool {
        match self {
            SemanticTag::Hole => header.contains("hole"),
            SemanticTag::Particle => header.contains("particle"),
            SemanticTag::Difference => header.contains("diff"),
            SemanticTag::TransferMatrix => header.contains("transfer"),
            SemanticTag::Trace => header.contains("transfer") && is_diagonal_suffix(header),
            SemanticTag::Bottleneck { last } => {
                header.contains("h0") || header.contains(&format!("h{}", last))
            }
            SemanticTag::OscillatorStrength => header.contains("osc"),
            SemanticTag::RotatoryStrength => header.contains("rot"),
            SemanticTag::Energy => header.contains("energy"),
        }
    }
}

fn is_diagonal_suffix(header: &str) -> bool {
    let mut tail = header.chars().rev();
    match (tail.next(), tail.next()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Small rule language over column headers and positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Header contains the fragment (case-insensitive)
    NameFragment(String),
    /// Header equals the name (case-insensitive)
    ExactName(String),
    /// Header carries the semantic tag
    Tag(SemanticTag),
    /// 0-based column index in `[lo, hi]`
    ColumnRange { lo: usize, hi: usize },
    /// Union
    Any(Vec<SelectionRule>),
    /// Intersection
    All(Vec<SelectionRule>),
}

impl SelectionRule {
    pub fn matches(&self, col: usize, header: &str) -> bool {
        let lower = header.to_lowercase();
        self.matches_lower(col, &lower)
    }

    fn matches_lower(&self, col: usize, lower: &str) -> bool {
        match self {
            SelectionRule::NameFragment(s) => lower.contains(&s.to_lowercase()),
            SelectionRule::ExactName(s) => lower == s.to_lowercase(),
            SelectionRule::Tag(tag) => tag.matches(lower),
            SelectionRule::ColumnRange { lo, hi } => col >= *lo && col <= *hi,
            SelectionRule::Any(rules) => rules.iter().any(|r| r.matches_lower(col, lower)),
            SelectionRule::All(rules) => rules.iter().all(|r| r.matches_lower(col, lower)),
        }
    }
}

/// A primary rule plus extra tags appended on top of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelection {
    pub primary: SelectionRule,
    #[serde(default)]
    pub extras: Vec<SemanticTag>,
}

impl FeatureSelection {
    pub fn new(primary: SelectionRule) -> Self {
        Self {
            primary,
            extras: Vec::new(),
        }
    }

    /// Append columns carrying `tag` regardless of the primary rule
    pub fn with_extra(mut self, tag: SemanticTag) -> Self {
        self.extras.push(tag);
        self
    }

    pub fn hole_and_particle() -> Self {
        Self::new(SelectionRule::Any(vec![
            SelectionRule::Tag(SemanticTag::Hole),
            SelectionRule::Tag(SemanticTag::Particle),
        ]))
    }

    pub fn charge_transfer_matrix() -> Self {
        Self::new(SelectionRule::Tag(SemanticTag::TransferMatrix))
    }

    pub fn trace() -> Self {
        Self::new(SelectionRule::Tag(SemanticTag::Trace))
    }

    pub fn bottleneck(last_subgroup: usize) -> Self {
        Self::new(SelectionRule::Tag(SemanticTag::Bottleneck {
            last: last_subgroup,
        }))
    }

    pub fn column_range(lo: usize, hi: usize) -> Self {
        Self::new(SelectionRule::ColumnRange { lo, hi })
    }

    pub fn named(fragment: impl Into<String>) -> Self {
        Self::new(SelectionRule::NameFragment(fragment.into()))
    }

    /// Source column indices in output order. A column appears once for the
    /// primary rule and once more per matching extra tag.
    pub fn select_columns<D: TabularDataset + ?Sized>(&self, dataset: &D) -> Vec<usize> {
        let mut selected = Vec::new();
        for col in 0..dataset.cols() {
            let lower = dataset.header(col).to_lowercase();
            if self.primary.matches_lower(col, &lower) {
                selected.push(col);
            }
            for tag in &self.extras {
                if tag.matches(&lower) {
                    selected.push(col);
                }
            }
        }
        selected
    }
}

/// Dense row-major feature matrix, one row per dataset row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
    source_columns: Vec<usize>,
    headers: Vec<String>,
}

impl FeatureMatrix {
    /// Build from explicit rows; all rows must share one width
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(TransitionError::config(format!(
                "feature row {} has {} values, expected {}",
                idx,
                row.len(),
                width
            )));
        }
        Ok(Self {
            rows,
            source_columns: (0..width).collect(),
            headers: (1..=width).map(|i| i.to_string()).collect(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.source_columns.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx]
    }

    /// Dataset column each feature came from
    pub fn source_columns(&self) -> &[usize] {
        &self.source_columns
    }

    /// Dataset headers of the feature columns
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Fail with `EmptyFeatureVector` when the selection matched nothing
    pub fn require_features(&self) -> Result<&Self> {
        if self.width() == 0 {
            return Err(TransitionError::empty_features(
                "selection rule matched no columns",
            ));
        }
        Ok(self)
    }

    /// Emit the selected vector as a data frame with columns
    /// `{prefix}1 .. {prefix}m`
    pub fn to_dataset(&self, prefix: &str) -> Result<DataFrame> {
        let columns = (0..self.width())
            .map(|j| {
                Column::float(
                    format!("{}{}", prefix, j + 1),
                    self.rows.iter().map(|r| r[j]).collect(),
                )
            })
            .collect();
        DataFrame::from_columns(columns)
    }
}

/// Extract the feature matrix selected by `selection`. Zero matching columns
/// is not an error here: the matrix has width 0 and callers reject it via
/// `FeatureMatrix::require_features`.
pub fn build_feature_matrix<D: TabularDataset + ?Sized>(
    dataset: &D,
    selection: &FeatureSelection,
) -> Result<FeatureMatrix> {
    let source_columns = selection.select_columns(dataset);

    for &col in &source_columns {
        if !dataset.is_numeric(col) {
            return Err(TransitionError::NonNumericColumn(
                dataset.header(col).to_string(),
            ));
        }
    }

    let rows = (0..dataset.rows())
        .map(|row| {
            source_columns
                .iter()
                .map(|&col| dataset.cell(row, col).as_f64().unwrap_or(f64::NAN))
                .collect()
        })
        .collect();

    let headers = source_columns
        .iter()
        .map(|&col| dataset.header(col).to_string())
        .collect();

    log::debug!(
        "Feature vector: {} columns over {} members",
        source_columns.len(),
        dataset.rows()
    );

    Ok(FeatureMatrix {
        rows,
        source_columns,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn transitions() -> DataFrame {
        DataFrame::from_columns(vec![
            Column::categorical("Name", vec!["a".into(), "b".into()]),
            Column::float("Hole sg1", vec![0.1, 0.2]),
            Column::float("Particle sg1", vec![0.3, 0.4]),
            Column::float("Transfer 11", vec![1.0, 2.0]),
            Column::float("Transfer 12", vec![3.0, 4.0]),
            Column::float("Diff sg1", vec![0.2, 0.2]),
            Column::float("Oscillator strength", vec![0.01, 0.02]),
            Column::float("Energy (eV)", vec![4.5, 4.9]),
        ])
        .unwrap()
    }

    #[test]
    fn test_hole_and_particle_keeps_column_order() {
        let m = build_feature_matrix(&transitions(), &FeatureSelection::hole_and_particle()).unwrap();
        assert_eq!(m.source_columns(), &[1, 2]);
        assert_eq!(m.row(1), &[0.2, 0.4]);
    }

    #[test]
    fn test_trace_requires_equal_trailing_chars() {
        let m = build_feature_matrix(&transitions(), &FeatureSelection::trace()).unwrap();
        assert_eq!(m.headers(), &["Transfer 11".to_string()]);
    }

    #[test]
    fn test_extras_are_appended_per_column() {
        let selection = FeatureSelection::charge_transfer_matrix()
            .with_extra(SemanticTag::Trace)
            .with_extra(SemanticTag::Energy);
        let m = build_feature_matrix(&transitions(), &selection).unwrap();
        // Transfer 11 twice: once for the primary rule, once for the trace extra
        assert_eq!(m.source_columns(), &[3, 3, 4, 7]);
    }

    #[test]
    fn test_bottleneck_marker() {
        let tag = SemanticTag::Bottleneck { last: 3 };
        assert!(tag.matches("charge h0"));
        assert!(tag.matches("charge h3"));
        assert!(!tag.matches("charge h2"));
    }

    #[test]
    fn test_column_range_inclusive() {
        let m = build_feature_matrix(&transitions(), &FeatureSelection::column_range(1, 3)).unwrap();
        assert_eq!(m.width(), 3);
    }

    #[test]
    fn test_intersection_rule() {
        let rule = SelectionRule::All(vec![
            SelectionRule::Tag(SemanticTag::TransferMatrix),
            SelectionRule::NameFragment("12".into()),
        ]);
        let m = build_feature_matrix(&transitions(), &FeatureSelection::new(rule)).unwrap();
        assert_eq!(m.source_columns(), &[4]);
    }

    #[test]
    fn test_no_match_is_empty_feature_vector() {
        let m = build_feature_matrix(&transitions(), &FeatureSelection::named("tranfv")).unwrap();
        assert_eq!(m.width(), 0);
        assert_eq!(m.n_rows(), 2);
        assert!(matches!(
            m.require_features(),
            Err(TransitionError::EmptyFeatureVector(_))
        ));
    }

    #[test]
    fn test_categorical_match_rejected() {
        let err = build_feature_matrix(&transitions(), &FeatureSelection::named("name")).unwrap_err();
        assert!(matches!(err, TransitionError::NonNumericColumn(_)));
    }

    #[test]
    fn test_to_dataset_prefix() {
        let m = build_feature_matrix(&transitions(), &FeatureSelection::hole_and_particle()).unwrap();
        let df = m.to_dataset("TranFV").unwrap();
        assert_eq!(df.header(0), "TranFV1");
        assert_eq!(df.header(1), "TranFV2");
        assert_eq!(df.rows(), 2);
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        assert!(FeatureMatrix::from_rows(vec![vec![1.0, 2.0], vec![1.0]]).is_err());
    }
}
