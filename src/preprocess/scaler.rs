//! Standard scaling with frozen training statistics

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Per-feature mean and population standard deviation
///
/// A feature with zero training variance scales to 0 for every input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PipelineError::internal("scaling", "cannot fit on zero rows"));
        }
        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::internal("scaling", "cannot fit on zero rows"))?;
        let stds = x.std_axis(Axis(0), 0.0);

        Ok(Self {
            means: means.to_vec(),
            stds: stds.to_vec(),
        })
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.means.len() {
            return Err(PipelineError::internal(
                "scaling",
                format!("expected {} features, got {}", self.means.len(), x.ncols()),
            ));
        }

        let mut out = x.to_owned();
        for (j, mut column) in out.columns_mut().into_iter().enumerate() {
            let (mean, std) = (self.means[j], self.stds[j]);
            column.mapv_inplace(|v| if std > 0.0 { (v - mean) / std } else { 0.0 });
        }
        Ok(out)
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.means.len() == self.stds.len()
            && self.means.iter().all(|v| v.is_finite())
            && self.stds.iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}
