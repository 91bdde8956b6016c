//! Per-cluster statistics of hole and particle subgroup charges.

use crate::charge_transfer::{subgroup_charges, subgroup_count};
use crate::dataset::{Column, DataFrame, TabularDataset};
use crate::errors::{Result, TransitionError};
use std::collections::BTreeMap;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance around a known mean
pub fn variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    (sum_sq / values.len() as f64 - mean * mean).max(0.0)
}

pub fn standard_deviation(values: &[f64], mean: f64) -> f64 {
    variance(values, mean).sqrt()
}

/// The three statistics tables, one row per cluster in ascending cluster order
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStatistics {
    /// Min and max hole/particle charge per subgroup
    pub extrema: DataFrame,
    /// Max minus min per subgroup
    pub spread: DataFrame,
    /// Mean and standard deviation per subgroup
    pub moments: DataFrame,
}

#[derive(Default)]
struct ChargeSummary {
    min: Vec<f64>,
    max: Vec<f64>,
    mean: Vec<f64>,
    stdev: Vec<f64>,
}

impl ChargeSummary {
    fn push(&mut self, values: &[f64]) {
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let m = mean(values);
        self.min.push(lo);
        self.max.push(hi);
        self.mean.push(m);
        self.stdev.push(standard_deviation(values, m));
    }

    fn spread(&self) -> Vec<f64> {
        self.max.iter().zip(&self.min).map(|(hi, lo)| hi - lo).collect()
    }
}

/// Group rows by the integer value of `cluster_column` and summarise every
/// `Hole sg{i}` / `Particle sg{i}` pair. `subgroups` defaults to the number
/// of consecutive pairs present in the dataset.
pub fn cluster_statistics<D: TabularDataset + ?Sized>(
    dataset: &D,
    cluster_column: &str,
    subgroups: Option<usize>,
) -> Result<ClusterStatistics> {
    let cluster_col = dataset.require_column(cluster_column)?;
    let cluster_values = dataset.numeric_values(cluster_col)?;

    let subgroups = subgroups.unwrap_or_else(|| subgroup_count(dataset));
    if subgroups == 0 {
        return Err(TransitionError::missing_column("Hole sg1"));
    }
    let (hole, particle) = subgroup_charges(dataset, subgroups)?;

    let mut members: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (row, value) in cluster_values.iter().enumerate() {
        if !value.is_finite() {
            return Err(TransitionError::cluster_range(
                cluster_column,
                format!("row {} has cluster id {}", row, value),
            ));
        }
        members.entry(value.trunc() as i64).or_default().push(row);
    }

    let mut hole_stats: Vec<ChargeSummary> = (0..subgroups).map(|_| ChargeSummary::default()).collect();
    let mut particle_stats: Vec<ChargeSummary> =
        (0..subgroups).map(|_| ChargeSummary::default()).collect();

    for rows in members.values() {
        for sg in 0..subgroups {
            let h: Vec<f64> = rows.iter().map(|&r| hole[sg][r]).collect();
            let p: Vec<f64> = rows.iter().map(|&r| particle[sg][r]).collect();
            hole_stats[sg].push(&h);
            particle_stats[sg].push(&p);
        }
    }

    let ids: Vec<i64> = members.keys().copied().collect();
    let sizes: Vec<i64> = members.values().map(|rows| rows.len() as i64).collect();
    let base = || {
        vec![
            Column::int("Cluster", ids.clone()),
            Column::int("Cluster size", sizes.clone()),
        ]
    };

    let mut extrema = base();
    let mut spread = base();
    let mut moments = base();
    for sg in 0..subgroups {
        let (h, p) = (&hole_stats[sg], &particle_stats[sg]);
        let n = sg + 1;
        extrema.push(Column::float(format!("Min hole charge sg {}", n), h.min.clone()));
        extrema.push(Column::float(format!("Max hole charge sg {}", n), h.max.clone()));
        extrema.push(Column::float(format!("Min particle charge sg {}", n), p.min.clone()));
        extrema.push(Column::float(format!("Max particle charge sg {}", n), p.max.clone()));

        spread.push(Column::float(format!("Diff hole charge sg {}", n), h.spread()));
        spread.push(Column::float(format!("Diff particle charge sg {}", n), p.spread()));

        moments.push(Column::float(format!("Mean hole charge sg {}", n), h.mean.clone()));
        moments.push(Column::float(format!("Stdev hole charge sg {}", n), h.stdev.clone()));
        moments.push(Column::float(format!("Mean particle charge sg {}", n), p.mean.clone()));
        moments.push(Column::float(format!("Stdev particle charge sg {}", n), p.stdev.clone()));
    }

    log::info!(
        "Cluster statistics: {} clusters, {} subgroups",
        ids.len(),
        subgroups
    );

    Ok(ClusterStatistics {
        extrema: DataFrame::from_columns(extrema)?,
        spread: DataFrame::from_columns(spread)?,
        moments: DataFrame::from_columns(moments)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CellValue;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_variance() {
        assert_relative_eq!(mean(&[8.0, 10.0]), 9.0);
        assert_relative_eq!(variance(&[8.0, 10.0], 9.0), 1.0);
        assert_relative_eq!(mean(&[8.0, 10.0, 15.0]), 11.0);
        assert_relative_eq!(variance(&[8.0, 10.0, 15.0], 11.0), 8.66667, epsilon = 1e-5);
    }

    fn members() -> DataFrame {
        DataFrame::from_columns(vec![
            Column::int("Cluster", vec![2, 1, 2, 1, 2]),
            Column::float("Hole sg1", vec![0.1, 0.5, 0.3, 0.7, 0.2]),
            Column::float("Particle sg1", vec![0.9, 0.5, 0.7, 0.3, 0.8]),
        ])
        .unwrap()
    }

    #[test]
    fn test_cluster_statistics_tables() {
        let stats = cluster_statistics(&members(), "cluster", None).unwrap();

        assert_eq!(stats.extrema.rows(), 2);
        assert_eq!(stats.extrema.cell(0, 0), CellValue::Int(1));
        assert_eq!(stats.extrema.cell(1, 1), CellValue::Int(3));
        assert_eq!(stats.extrema.header(2), "Min hole charge sg 1");
        assert_eq!(stats.extrema.cell(1, 2), CellValue::Float(0.1));
        assert_eq!(stats.extrema.cell(1, 3), CellValue::Float(0.3));

        let diff = stats.spread.require_column("Diff particle charge sg 1").unwrap();
        assert_relative_eq!(stats.spread.cell(0, diff).as_f64().unwrap(), 0.2, epsilon = 1e-12);

        let m = stats.moments.require_column("Mean hole charge sg 1").unwrap();
        assert_relative_eq!(stats.moments.cell(0, m).as_f64().unwrap(), 0.6, epsilon = 1e-12);
        let s = stats.moments.require_column("Stdev hole charge sg 1").unwrap();
        assert_relative_eq!(stats.moments.cell(0, s).as_f64().unwrap(), 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_columns() {
        let frame = DataFrame::from_columns(vec![Column::int("Cluster", vec![1])]).unwrap();
        assert!(matches!(
            cluster_statistics(&frame, "Cluster", None),
            Err(TransitionError::MissingColumn(_))
        ));
        assert!(matches!(
            cluster_statistics(&members(), "Group", None),
            Err(TransitionError::MissingColumn(_))
        ));
        assert!(cluster_statistics(&members(), "Cluster", Some(2)).is_err());
    }

    #[test]
    fn test_fractional_cluster_ids_truncate() {
        let frame = DataFrame::from_columns(vec![
            Column::float("Cluster", vec![1.2, 1.7, 2.4]),
            Column::float("Hole sg1", vec![0.1, 0.5, 0.3]),
            Column::float("Particle sg1", vec![0.9, 0.5, 0.7]),
        ])
        .unwrap();
        let stats = cluster_statistics(&frame, "Cluster", None).unwrap();
        assert_eq!(stats.extrema.rows(), 2);
        assert_eq!(stats.extrema.cell(0, 0), CellValue::Int(1));
        assert_eq!(stats.extrema.cell(0, 1), CellValue::Int(2));
        assert_eq!(stats.extrema.cell(1, 0), CellValue::Int(2));
        assert_eq!(stats.extrema.cell(1, 1), CellValue::Int(1));

        let frame = DataFrame::from_columns(vec![
            Column::float("Cluster", vec![1.0, f64::NAN]),
            Column::float("Hole sg1", vec![0.1, 0.5]),
            Column::float("Particle sg1", vec![0.9, 0.5]),
        ])
        .unwrap();
        assert!(matches!(
            cluster_statistics(&frame, "Cluster", None),
            Err(TransitionError::InvalidClusterRange { .. })
        ));
    }
}
