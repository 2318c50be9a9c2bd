//! Core learning algorithms
//!
//! A shared CART builder and the two tree ensembles built on it.

pub mod boosting;
pub mod classifier;
pub mod forest;
pub mod tree;

use ndarray::ArrayView2;

use crate::error::{PipelineError, Result};

// Re-export commonly used types
pub use boosting::GradientBoostedTrees;
pub use classifier::{Classifier, DECISION_THRESHOLD};
pub use forest::RandomForest;
pub use tree::DecisionTree;

/// Shape and label checks shared by every ensemble fit
pub(crate) fn check_training_input(x: ArrayView2<f64>, y: &[u8]) -> Result<()> {
    let (rows, cols) = x.dim();
    if rows == 0 || cols == 0 {
        return Err(PipelineError::internal(
            "classification",
            format!("cannot fit on a {}x{} matrix", rows, cols),
        ));
    }
    if y.len() != rows {
        return Err(PipelineError::internal(
            "classification",
            format!("{} labels for {} rows", y.len(), rows),
        ));
    }
    if let Some(bad) = y.iter().find(|&&label| label > 1) {
        return Err(PipelineError::internal(
            "classification",
            format!("label {} is not binary", bad),
        ));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::internal(
            "classification",
            "training matrix holds non-finite values",
        ));
    }
    Ok(())
}

/// Scale in place to sum to 1; all-zero input is left as is
pub(crate) fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalize() {
        let mut v = vec![1.0, 3.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.25, 0.75]);

        let mut zeros = vec![0.0, 0.0];
        normalize(&mut zeros);
        assert_eq!(zeros, vec![0.0, 0.0]);
    }

    #[test]
    fn test_check_training_input() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(check_training_input(x.view(), &[0, 1]).is_ok());
        assert!(check_training_input(x.view(), &[0]).is_err());
        assert!(check_training_input(x.view(), &[0, 2]).is_err());

        let nan = array![[1.0, f64::NAN], [3.0, 4.0]];
        assert!(check_training_input(nan.view(), &[0, 1]).is_err());
    }
}
