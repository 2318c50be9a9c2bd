//! CART decision tree
//!
//! One builder serves both ensembles. Each training sample carries two
//! statistics whose meaning depends on the criterion:
//! - `Gini`: (weight, weight * label); leaves hold the positive-class share
//! - `Newton`: (gradient, hessian); leaves hold the second-order step
//!   `-G / (H + lambda)`
//!
//! Split gains accumulate into per-feature importances.

use ndarray::{ArrayView1, ArrayView2};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Split quality measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    Gini,
    Newton { lambda: f64, min_child_weight: f64 },
}

impl Criterion {
    /// Node score; gain is score(left) + score(right) - score(parent)
    fn score(&self, s0: f64, s1: f64) -> f64 {
        match *self {
            Criterion::Gini => {
                if s0 <= 0.0 {
                    0.0
                } else {
                    (s1 * s1 + (s0 - s1) * (s0 - s1)) / s0
                }
            }
            Criterion::Newton { lambda, .. } => 0.5 * s0 * s0 / (s1 + lambda),
        }
    }

    fn leaf(&self, s0: f64, s1: f64) -> f64 {
        match *self {
            Criterion::Gini => {
                if s0 <= 0.0 {
                    0.0
                } else {
                    s1 / s0
                }
            }
            Criterion::Newton { lambda, .. } => -s0 / (s1 + lambda),
        }
    }

    fn child_ok(&self, s0: f64, s1: f64) -> bool {
        match *self {
            Criterion::Gini => s0 > 0.0,
            Criterion::Newton {
                min_child_weight, ..
            } => s1 >= min_child_weight,
        }
    }

    fn is_pure(&self, s0: f64, s1: f64) -> bool {
        match *self {
            Criterion::Gini => s1 <= 0.0 || s1 >= s0,
            Criterion::Newton { .. } => false,
        }
    }
}

/// Growth limits
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Features drawn per split; None considers all
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Fitted tree; the root is node 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Frame {
    node: usize,
    samples: Vec<usize>,
    depth: usize,
}

impl DecisionTree {
    /// Grow a tree over `samples` (row indices into `x`, repeats allowed)
    ///
    /// Returns the tree and the total split gain per feature.
    pub fn fit(
        x: ArrayView2<f64>,
        stats: &[(f64, f64)],
        samples: Vec<usize>,
        criterion: Criterion,
        params: &TreeParams,
        mut rng: Option<&mut ChaCha8Rng>,
    ) -> (Self, Vec<f64>) {
        let n_features = x.ncols();
        let mut importances = vec![0.0; n_features];
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack = vec![Frame {
            node: 0,
            samples,
            depth: 0,
        }];
        let min_leaf = params.min_samples_leaf.max(1);

        while let Some(frame) = stack.pop() {
            let (s0, s1) = frame
                .samples
                .iter()
                .fold((0.0, 0.0), |acc, &i| (acc.0 + stats[i].0, acc.1 + stats[i].1));
            let leaf = Node::Leaf {
                value: criterion.leaf(s0, s1),
            };

            let depth_reached = params.max_depth.is_some_and(|d| frame.depth >= d);
            if depth_reached
                || frame.samples.len() < 2 * min_leaf
                || criterion.is_pure(s0, s1)
            {
                nodes[frame.node] = leaf;
                continue;
            }

            let features = candidate_features(n_features, params.max_features, rng.as_deref_mut());
            let best = best_split(x, stats, &frame.samples, &features, criterion, min_leaf, (s0, s1));

            match best {
                None => nodes[frame.node] = leaf,
                Some(split) => {
                    importances[split.feature] += split.gain;

                    let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = frame
                        .samples
                        .iter()
                        .partition(|&&i| x[[i, split.feature]] <= split.threshold);

                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes[frame.node] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };

                    stack.push(Frame {
                        node: right,
                        samples: right_samples,
                        depth: frame.depth + 1,
                    });
                    stack.push(Frame {
                        node: left,
                        samples: left_samples,
                        depth: frame.depth + 1,
                    });
                }
            }
        }

        (Self { nodes, n_features }, importances)
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Structural check for trees read back from disk
    pub fn is_well_formed(&self) -> bool {
        let n = self.nodes.len();
        n > 0
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Leaf { value } => value.is_finite(),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < self.n_features
                        && threshold.is_finite()
                        && *left > i
                        && *right > i
                        && *left < n
                        && *right < n
                }
            })
    }
}

fn candidate_features(
    n_features: usize,
    max_features: Option<usize>,
    rng: Option<&mut ChaCha8Rng>,
) -> Vec<usize> {
    match (max_features, rng) {
        (Some(k), Some(rng)) if k < n_features => {
            let mut drawn = rand::seq::index::sample(rng, n_features, k).into_vec();
            drawn.sort_unstable();
            drawn
        }
        _ => (0..n_features).collect(),
    }
}

fn best_split(
    x: ArrayView2<f64>,
    stats: &[(f64, f64)],
    samples: &[usize],
    features: &[usize],
    criterion: Criterion,
    min_leaf: usize,
    parent: (f64, f64),
) -> Option<BestSplit> {
    let parent_score = criterion.score(parent.0, parent.1);
    let n = samples.len();
    let mut best: Option<BestSplit> = None;
    let mut order = samples.to_vec();

    for &feature in features {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left = (0.0, 0.0);
        for pos in 0..n - 1 {
            let i = order[pos];
            left.0 += stats[i].0;
            left.1 += stats[i].1;

            let here = x[[i, feature]];
            let next = x[[order[pos + 1], feature]];
            if here == next {
                continue;
            }
            let left_count = pos + 1;
            if left_count < min_leaf || n - left_count < min_leaf {
                continue;
            }

            let right = (parent.0 - left.0, parent.1 - left.1);
            if !criterion.child_ok(left.0, left.1) || !criterion.child_ok(right.0, right.1) {
                continue;
            }

            let gain = criterion.score(left.0, left.1) + criterion.score(right.0, right.1)
                - parent_score;
            if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                let mid = here + (next - here) / 2.0;
                let threshold = if mid < next { mid } else { here };
                best = Some(BestSplit {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn gini_stats(labels: &[f64]) -> Vec<(f64, f64)> {
        labels.iter().map(|&y| (1.0, y)).collect()
    }

    fn full_params() -> TreeParams {
        TreeParams {
            max_depth: None,
            min_samples_leaf: 1,
            max_features: None,
        }
    }

    #[test]
    fn test_separable_single_split() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [10.0, 5.0], [11.0, 5.0]];
        let stats = gini_stats(&[0.0, 0.0, 0.0, 1.0, 1.0]);

        let (tree, importances) = DecisionTree::fit(
            x.view(),
            &stats,
            (0..5).collect(),
            Criterion::Gini,
            &full_params(),
            None,
        );

        assert_eq!(tree.node_count(), 3);
        assert!(importances[0] > 0.0);
        assert_eq!(importances[1], 0.0);
        assert_eq!(tree.predict_row(x.row(0)), 0.0);
        assert_eq!(tree.predict_row(x.row(4)), 1.0);
        // threshold sits between 3 and 10
        assert_eq!(tree.predict_row(array![6.4, 0.0].view()), 0.0);
        assert_eq!(tree.predict_row(array![6.6, 0.0].view()), 1.0);
        assert!(tree.is_well_formed());
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let stats = gini_stats(&[0.0, 1.0, 0.0, 1.0]);
        let params = TreeParams {
            max_depth: Some(0),
            ..full_params()
        };

        let (tree, _) = DecisionTree::fit(x.view(), &stats, (0..4).collect(), Criterion::Gini, &params, None);

        assert_eq!(tree.node_count(), 1);
        assert!((tree.predict_row(x.row(0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_leaf_value() {
        let x = array![[1.0], [1.0], [1.0]];
        // one positive with weight 4 against two negatives
        let stats = vec![(4.0, 4.0), (1.0, 0.0), (1.0, 0.0)];

        let (tree, _) = DecisionTree::fit(x.view(), &stats, (0..3).collect(), Criterion::Gini, &full_params(), None);

        assert!((tree.predict_row(x.row(0)) - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_newton_leaf_values() {
        let x = array![[0.0], [0.0], [1.0], [1.0]];
        // gradients of logistic loss at p = 0.5
        let stats = vec![(0.5, 0.25), (0.5, 0.25), (-0.5, 0.25), (-0.5, 0.25)];
        let criterion = Criterion::Newton {
            lambda: 0.0,
            min_child_weight: 0.0,
        };
        let params = TreeParams {
            max_depth: Some(1),
            ..full_params()
        };

        let (tree, importances) = DecisionTree::fit(x.view(), &stats, (0..4).collect(), criterion, &params, None);

        assert!((tree.predict_row(x.row(0)) + 2.0).abs() < 1e-12);
        assert!((tree.predict_row(x.row(2)) - 2.0).abs() < 1e-12);
        assert!(importances[0] > 0.0);
    }

    #[test]
    fn test_feature_sampling_is_seeded() {
        let x = array![
            [1.0, 9.0, 3.0],
            [2.0, 8.0, 1.0],
            [3.0, 7.0, 2.0],
            [4.0, 6.0, 5.0],
            [5.0, 5.0, 4.0],
            [6.0, 4.0, 6.0]
        ];
        let stats = gini_stats(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let params = TreeParams {
            max_features: Some(1),
            ..full_params()
        };

        let fit = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            DecisionTree::fit(x.view(), &stats, (0..6).collect(), Criterion::Gini, &params, Some(&mut rng)).0
        };

        assert_eq!(fit(7), fit(7));
    }

    #[test]
    fn test_constant_feature_yields_leaf() {
        let x = array![[2.0], [2.0], [2.0], [2.0]];
        let stats = gini_stats(&[0.0, 1.0, 0.0, 1.0]);
        let (tree, importances) = DecisionTree::fit(x.view(), &stats, (0..4).collect(), Criterion::Gini, &full_params(), None);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(importances, vec![0.0]);
    }
}
