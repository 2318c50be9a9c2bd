//! Binary referral classifier
//!
//! One serializable value over the supported tree-ensemble families.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::boosting::GradientBoostedTrees;
use super::forest::RandomForest;
use crate::config::ClassifierParams;
use crate::error::{PipelineError, Result};

/// Probability at or above which a row is a predicted referral
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Classifier {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostedTrees),
}

impl Classifier {
    pub fn fit(
        params: &ClassifierParams,
        x: ArrayView2<f64>,
        y: &[u8],
        positive_weight: f64,
    ) -> Result<Self> {
        let classifier = match params {
            ClassifierParams::RandomForest(p) => {
                Classifier::RandomForest(RandomForest::fit(x, y, p, positive_weight)?)
            }
            ClassifierParams::GradientBoosting(p) => {
                Classifier::GradientBoosting(GradientBoostedTrees::fit(x, y, p, positive_weight)?)
            }
        };
        info!(
            "Fitted {} classifier on {} rows x {} features",
            classifier.family(),
            x.nrows(),
            x.ncols()
        );
        Ok(classifier)
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features() {
            return Err(PipelineError::internal(
                "classification",
                format!(
                    "expected {} features, got {}",
                    self.n_features(),
                    x.ncols()
                ),
            ));
        }
        Ok(match self {
            Classifier::RandomForest(model) => model.predict_proba(x),
            Classifier::GradientBoosting(model) => model.predict_proba(x),
        })
    }

    /// 0/1 prediction per row
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p >= DECISION_THRESHOLD))
            .collect())
    }

    pub fn feature_importances(&self) -> &[f64] {
        match self {
            Classifier::RandomForest(model) => model.feature_importances(),
            Classifier::GradientBoosting(model) => model.feature_importances(),
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Classifier::RandomForest(model) => model.n_features(),
            Classifier::GradientBoosting(model) => model.n_features(),
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Classifier::RandomForest(_) => "random_forest",
            Classifier::GradientBoosting(_) => "gradient_boosting",
        }
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        match self {
            Classifier::RandomForest(model) => model.is_well_formed(),
            Classifier::GradientBoosting(model) => model.is_well_formed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoostParams, ForestParams};
    use ndarray::{array, Array2};

    fn data() -> (Array2<f64>, Vec<u8>) {
        let x = array![
            [0.0, 1.0],
            [0.5, 0.0],
            [1.0, 1.0],
            [1.5, 0.0],
            [5.0, 1.0],
            [5.5, 0.0],
            [6.0, 1.0],
            [6.5, 0.0]
        ];
        (x, vec![0, 0, 0, 0, 1, 1, 1, 1])
    }

    #[test]
    fn test_both_families_predict_binary() {
        let (x, y) = data();
        let families = [
            ClassifierParams::RandomForest(ForestParams {
                n_estimators: 15,
                ..ForestParams::default()
            }),
            ClassifierParams::GradientBoosting(BoostParams {
                n_estimators: 30,
                learning_rate: 0.3,
                min_child_weight: 0.0,
                ..BoostParams::default()
            }),
        ];

        for params in &families {
            let model = Classifier::fit(params, x.view(), &y, 1.0).unwrap();
            let predictions = model.predict(x.view()).unwrap();
            assert_eq!(predictions, y, "{}", model.family());
            assert_eq!(model.feature_importances().len(), 2);
        }
    }

    #[test]
    fn test_width_mismatch_is_internal_error() {
        let (x, y) = data();
        let model = Classifier::fit(&ClassifierParams::default(), x.view(), &y, 1.0).unwrap();
        let narrow = array![[1.0], [2.0]];
        let err = model.predict(narrow.view()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InternalPipeline {
                stage: "classification",
                ..
            }
        ));
    }

    #[test]
    fn test_serde_keeps_family_tag() {
        let (x, y) = data();
        let model = Classifier::fit(&ClassifierParams::default(), x.view(), &y, 1.0).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"family\":\"gradient_boosting\""));
        let restored: Classifier = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, model);
    }
}
