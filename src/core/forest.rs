//! Random forest classifier
//!
//! Bagged gini trees with per-split feature sampling. Each tree gets its own
//! seed drawn up front from the configured seed, so parallel fitting produces
//! the same forest as a sequential one.

use ndarray::ArrayView2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{Criterion, DecisionTree, TreeParams};
use super::{check_training_input, normalize};
use crate::config::ForestParams;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
    n_features: usize,
}

impl RandomForest {
    /// Fit on `x` (rows × features) against 0/1 labels
    ///
    /// Positive samples weigh `positive_weight` in every impurity computation.
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[u8],
        params: &ForestParams,
        positive_weight: f64,
    ) -> Result<Self> {
        check_training_input(x, y)?;
        let (n, m) = x.dim();

        let stats: Vec<(f64, f64)> = y
            .iter()
            .map(|&label| {
                let w = if label == 1 { positive_weight } else { 1.0 };
                (w, w * label as f64)
            })
            .collect();

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            max_features: Some(((m as f64).sqrt() as usize).max(1)),
        };

        let mut master = ChaCha8Rng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| master.random()).collect();

        let fitted: Vec<(DecisionTree, Vec<f64>)> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                let (tree, mut gains) = DecisionTree::fit(
                    x,
                    &stats,
                    bootstrap,
                    Criterion::Gini,
                    &tree_params,
                    Some(&mut rng),
                );
                normalize(&mut gains);
                (tree, gains)
            })
            .collect();

        let mut importances = vec![0.0; m];
        for (_, gains) in &fitted {
            for (total, gain) in importances.iter_mut().zip(gains) {
                *total += gain;
            }
        }
        normalize(&mut importances);

        let trees: Vec<DecisionTree> = fitted.into_iter().map(|(tree, _)| tree).collect();
        debug!(
            "Fitted random forest: {} trees, {} nodes",
            trees.len(),
            trees.iter().map(DecisionTree::node_count).sum::<usize>()
        );

        Ok(Self {
            trees,
            importances,
            n_features: m,
        })
    }

    /// Mean positive-class share over the trees' leaves
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<f64> {
        let count = self.trees.len().max(1) as f64;
        x.rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .map(|tree| tree.predict_row(row))
                    .sum::<f64>()
                    / count
            })
            .collect()
    }

    /// Normalized mean impurity decrease per feature
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
            && self.importances.len() == self.n_features
            && self
                .trees
                .iter()
                .all(|t| t.n_features() == self.n_features && t.is_well_formed())
    }
}
