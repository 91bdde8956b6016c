//! Charge-transfer matrix between subgroups.
//!
//! For each subgroup the charge difference is `particle - hole`. Subgroups
//! with a negative difference donate, the rest accept. The diagonal keeps the
//! charge that stays put (`min(hole, particle)`); every donor spreads its
//! loss over the acceptors in proportion to what they gain.

use crate::dataset::{DataFrame, TabularDataset};
use crate::errors::{Result, TransitionError};

/// Transfer matrix stored transposed: `transposed[d][a]` is the charge moved
/// from donor `d` to acceptor `a`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeTransfer {
    pub transposed: Vec<Vec<f64>>,
    pub difference: Vec<f64>,
}

impl ChargeTransfer {
    pub fn subgroups(&self) -> usize {
        self.difference.len()
    }

    /// Charge moved from subgroup `from` to subgroup `to`
    pub fn moved(&self, from: usize, to: usize) -> f64 {
        self.transposed[from][to]
    }
}

pub fn compute_charge_transfer(hole: &[f64], particle: &[f64]) -> Result<ChargeTransfer> {
    if hole.is_empty() || particle.is_empty() {
        return Err(TransitionError::InvalidChargeVectors(
            "hole and particle charges must not be empty".into(),
        ));
    }
    if hole.len() != particle.len() {
        return Err(TransitionError::InvalidChargeVectors(format!(
            "{} hole charges but {} particle charges",
            hole.len(),
            particle.len()
        )));
    }

    let n = hole.len();
    let difference: Vec<f64> = hole.iter().zip(particle).map(|(h, p)| p - h).collect();
    let (donors, acceptors): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| difference[i] < 0.0);

    if donors.is_empty() {
        return Err(TransitionError::InvalidChargeVectors("no donor subgroup".into()));
    }
    let total_accepted: f64 = acceptors.iter().map(|&a| difference[a]).sum();
    if acceptors.is_empty() || total_accepted <= 0.0 {
        return Err(TransitionError::InvalidChargeVectors("no acceptor subgroup".into()));
    }

    let mut transposed = vec![vec![0.0; n]; n];
    for i in 0..n {
        transposed[i][i] = hole[i].min(particle[i]);
    }
    for &d in &donors {
        for &a in &acceptors {
            transposed[d][a] = -difference[d] * (difference[a] / total_accepted);
        }
    }

    Ok(ChargeTransfer {
        transposed,
        difference,
    })
}

/// Number of consecutive `Hole sg{i}` / `Particle sg{i}` column pairs,
/// starting at 1
pub fn subgroup_count<D: TabularDataset + ?Sized>(dataset: &D) -> usize {
    (1..)
        .take_while(|i| {
            dataset.find_column(&format!("Hole sg{}", i)).is_some()
                && dataset.find_column(&format!("Particle sg{}", i)).is_some()
        })
        .count()
}

/// Per-subgroup hole and particle columns, `[subgroup][row]`
pub(crate) fn subgroup_charges<D: TabularDataset + ?Sized>(
    dataset: &D,
    subgroups: usize,
) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>)> {
    let mut hole = Vec::with_capacity(subgroups);
    let mut particle = Vec::with_capacity(subgroups);
    for i in 1..=subgroups {
        let h = dataset.require_column(&format!("Hole sg{}", i))?;
        let p = dataset.require_column(&format!("Particle sg{}", i))?;
        hole.push(dataset.numeric_values(h)?);
        particle.push(dataset.numeric_values(p)?);
    }
    Ok((hole, particle))
}

/// Append `Diff sg{i}` and `Charge transfer {i}{j}` columns computed from the
/// hole/particle subgroup columns of every row. The frame is left untouched
/// if any row fails. Returns the number of subgroups.
pub fn append_charge_transfer_columns(frame: &mut DataFrame) -> Result<usize> {
    let n = subgroup_count(frame);
    if n == 0 {
        return Err(TransitionError::missing_column("Hole sg1"));
    }
    let (hole, particle) = subgroup_charges(frame, n)?;

    let rows = frame.rows();
    let mut diff_cols = vec![Vec::with_capacity(rows); n];
    let mut transfer_cols = vec![Vec::with_capacity(rows); n * n];

    for row in 0..rows {
        let h: Vec<f64> = hole.iter().map(|c| c[row]).collect();
        let p: Vec<f64> = particle.iter().map(|c| c[row]).collect();
        let ct = compute_charge_transfer(&h, &p).map_err(|e| match e {
            TransitionError::InvalidChargeVectors(msg) => {
                TransitionError::InvalidChargeVectors(format!("row {}: {}", row, msg))
            }
            other => other,
        })?;

        for (i, col) in diff_cols.iter_mut().enumerate() {
            col.push(ct.difference[i]);
        }
        for i in 0..n {
            for j in 0..n {
                transfer_cols[i * n + j].push(ct.transposed[j][i]);
            }
        }
    }

    let mut updated = frame.clone();
    for (i, values) in diff_cols.into_iter().enumerate() {
        updated.add_float_column(format!("Diff sg{}", i + 1), values)?;
    }
    for (idx, values) in transfer_cols.into_iter().enumerate() {
        let (i, j) = (idx / n + 1, idx % n + 1);
        updated.add_float_column(format!("Charge transfer {}{}", i, j), values)?;
    }
    *frame = updated;

    log::info!("Added charge transfer columns for {} subgroups over {} rows", n, rows);
    Ok(n)
}
