//! Missing-value imputation
//!
//! Both strategies are fit once on the training matrix and frozen. Applying
//! an imputer reads only its own frozen state, so a row's filled values never
//! depend on which other rows arrive in the same batch.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ImputeStrategy;
use crate::data::median;
use crate::error::{PipelineError, Result};

/// Per-column training medians
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    pub fn fit(x: &Array2<Option<f64>>, names: &[String]) -> Result<Self> {
        let medians = x
            .columns()
            .into_iter()
            .zip(names)
            .map(|(column, name)| {
                let values: Vec<Option<f64>> = column.to_vec();
                median(&values).ok_or_else(|| PipelineError::insufficient(name.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { medians })
    }

    fn fill(&self, row: ArrayView1<Option<f64>>, out: &mut [f64]) {
        for ((slot, cell), &median) in out.iter_mut().zip(row).zip(&self.medians) {
            *slot = cell.unwrap_or(median);
        }
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }
}

/// Nearest-neighbor imputation against the frozen training rows
///
/// Distance is euclidean over the coordinates present in both rows, scaled up
/// by `width / present` to account for skipped coordinates. A missing cell
/// takes the uniform mean of that column over the `neighbors` closest
/// training rows that observed it; ties go to the earlier training row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborImputer {
    neighbors: usize,
    donors: Array2<Option<f64>>,
    /// Column means, used when no donor shares a present coordinate
    fallback: Vec<f64>,
}

impl NeighborImputer {
    pub fn fit(x: &Array2<Option<f64>>, names: &[String], neighbors: usize) -> Result<Self> {
        let fallback = x
            .columns()
            .into_iter()
            .zip(names)
            .map(|(column, name)| {
                let present: Vec<f64> = column.iter().flatten().copied().collect();
                if present.is_empty() {
                    return Err(PipelineError::insufficient(name.as_str()));
                }
                Ok(present.iter().sum::<f64>() / present.len() as f64)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            neighbors,
            donors: x.clone(),
            fallback,
        })
    }

    fn distance(&self, row: ArrayView1<Option<f64>>, donor: ArrayView1<Option<f64>>) -> f64 {
        let width = row.len();
        let mut present = 0usize;
        let mut sum = 0.0;
        for (a, b) in row.iter().zip(donor) {
            if let (Some(a), Some(b)) = (a, b) {
                present += 1;
                sum += (a - b) * (a - b);
            }
        }
        if present == 0 {
            return f64::INFINITY;
        }
        (sum * width as f64 / present as f64).sqrt()
    }

    fn fill(&self, row: ArrayView1<Option<f64>>, out: &mut [f64]) {
        let missing: Vec<usize> = (0..row.len()).filter(|&j| row[j].is_none()).collect();
        for (slot, cell) in out.iter_mut().zip(row) {
            if let Some(v) = cell {
                *slot = *v;
            }
        }
        if missing.is_empty() {
            return;
        }

        let distances: Vec<f64> = self
            .donors
            .rows()
            .into_iter()
            .map(|donor| self.distance(row, donor))
            .collect();

        for j in missing {
            let mut candidates: Vec<(f64, usize)> = distances
                .iter()
                .enumerate()
                .filter(|&(t, d)| d.is_finite() && self.donors[[t, j]].is_some())
                .map(|(t, &d)| (d, t))
                .collect();
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let chosen: Vec<f64> = candidates
                .iter()
                .take(self.neighbors)
                .filter_map(|&(_, t)| self.donors[[t, j]])
                .collect();

            out[j] = if chosen.is_empty() {
                self.fallback[j]
            } else {
                chosen.iter().sum::<f64>() / chosen.len() as f64
            };
        }
    }

    pub fn neighbors(&self) -> usize {
        self.neighbors
    }
}

/// Frozen imputer of either strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Imputer {
    Median(MedianImputer),
    KNearest(NeighborImputer),
}

impl Imputer {
    /// Fit on the training matrix; `names` label its columns for error reporting
    pub fn fit(strategy: ImputeStrategy, x: &Array2<Option<f64>>, names: &[String]) -> Result<Self> {
        if x.ncols() != names.len() {
            return Err(PipelineError::internal(
                "imputation",
                format!("{} columns for {} names", x.ncols(), names.len()),
            ));
        }
        let imputer = match strategy {
            ImputeStrategy::Median => Imputer::Median(MedianImputer::fit(x, names)?),
            ImputeStrategy::KNearest { neighbors } => {
                Imputer::KNearest(NeighborImputer::fit(x, names, neighbors)?)
            }
        };
        debug!(
            "Fitted {:?} imputer on {} rows x {} columns",
            strategy,
            x.nrows(),
            x.ncols()
        );
        Ok(imputer)
    }

    /// Fill every missing cell; rows are processed independently
    pub fn apply(&self, x: &Array2<Option<f64>>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(PipelineError::internal(
                "imputation",
                format!("expected {} columns, got {}", self.n_features(), x.ncols()),
            ));
        }

        let mut out = Array2::zeros(x.dim());
        for (row, mut target) in x.rows().into_iter().zip(out.rows_mut()) {
            let mut filled = vec![0.0; row.len()];
            match self {
                Imputer::Median(m) => m.fill(row, &mut filled),
                Imputer::KNearest(k) => k.fill(row, &mut filled),
            }
            for (slot, value) in target.iter_mut().zip(filled) {
                *slot = value;
            }
        }

        if out.iter().any(|v: &f64| !v.is_finite()) {
            return Err(PipelineError::internal(
                "imputation",
                "non-finite value after imputation",
            ));
        }
        Ok(out)
    }

    pub fn strategy(&self) -> ImputeStrategy {
        match self {
            Imputer::Median(_) => ImputeStrategy::Median,
            Imputer::KNearest(k) => ImputeStrategy::KNearest {
                neighbors: k.neighbors,
            },
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Imputer::Median(m) => m.medians.len(),
            Imputer::KNearest(k) => k.donors.ncols(),
        }
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        match self {
            Imputer::Median(m) => m.medians.iter().all(|v| v.is_finite()),
            Imputer::KNearest(k) => {
                k.neighbors > 0
                    && k.donors.nrows() > 0
                    && k.fallback.len() == k.donors.ncols()
                    && k.fallback.iter().all(|v| v.is_finite())
            }
        }
    }
}
