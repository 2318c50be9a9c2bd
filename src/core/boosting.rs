//! Gradient-boosted trees with logistic loss
//!
//! Each round fits a depth-limited tree to the per-sample gradient and hessian
//! of the weighted log loss at the current margins. Positive samples carry
//! `positive_weight`, which scales both statistics.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{Criterion, DecisionTree, TreeParams};
use super::{check_training_input, normalize};
use crate::config::BoostParams;
use crate::error::Result;

/// Hessian floor keeping leaf steps finite on saturated samples
const MIN_HESSIAN: f64 = 1e-16;

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    trees: Vec<DecisionTree>,
    learning_rate: f64,
    base_margin: f64,
    importances: Vec<f64>,
    n_features: usize,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[u8],
        params: &BoostParams,
        positive_weight: f64,
    ) -> Result<Self> {
        check_training_input(x, y)?;
        let (n, m) = x.dim();

        let weights: Vec<f64> = y
            .iter()
            .map(|&label| if label == 1 { positive_weight } else { 1.0 })
            .collect();
        let tree_params = TreeParams {
            max_depth: Some(params.max_depth),
            min_samples_leaf: params.min_samples_leaf,
            max_features: None,
        };
        let criterion = Criterion::Newton {
            lambda: params.lambda,
            min_child_weight: params.min_child_weight,
        };

        let base_margin = 0.0;
        let mut margins = vec![base_margin; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; m];

        for round in 0..params.n_estimators {
            let stats: Vec<(f64, f64)> = margins
                .iter()
                .zip(y.iter().zip(&weights))
                .map(|(&margin, (&label, &w))| {
                    let p = sigmoid(margin);
                    (w * (p - label as f64), (w * p * (1.0 - p)).max(MIN_HESSIAN))
                })
                .collect();

            let (tree, gains) =
                DecisionTree::fit(x, &stats, (0..n).collect(), criterion, &tree_params, None);

            for (i, margin) in margins.iter_mut().enumerate() {
                *margin += params.learning_rate * tree.predict_row(x.row(i));
            }
            for (total, gain) in importances.iter_mut().zip(gains) {
                *total += gain;
            }
            trees.push(tree);

            if round % 25 == 0 {
                debug!("Boosting round {}: train log loss {:.5}", round, log_loss(&margins, y, &weights));
            }
        }
        normalize(&mut importances);

        Ok(Self {
            trees,
            learning_rate: params.learning_rate,
            base_margin,
            importances,
            n_features: m,
        })
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let margin = self.base_margin
                    + self.learning_rate
                        * self
                            .trees
                            .iter()
                            .map(|tree| tree.predict_row(row))
                            .sum::<f64>();
                sigmoid(margin)
            })
            .collect()
    }

    /// Normalized total split gain per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        !self.trees.is_empty()
            && self.learning_rate.is_finite()
            && self.base_margin.is_finite()
            && self.importances.len() == self.n_features
            && self
                .trees
                .iter()
                .all(|t| t.n_features() == self.n_features && t.is_well_formed())
    }
}

fn log_loss(margins: &[f64], y: &[u8], weights: &[f64]) -> f64 {
    let total_weight: f64 = weights.iter().sum();
    let loss: f64 = margins
        .iter()
        .zip(y.iter().zip(weights))
        .map(|(&margin, (&label, &w))| {
            let p = sigmoid(margin).clamp(1e-15, 1.0 - 1e-15);
            -w * if label == 1 { p.ln() } else { (1.0 - p).ln() }
        })
        .sum();
    loss / total_weight
}
