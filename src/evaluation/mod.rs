//! Model evaluation: stratified splitting and held-out metrics

pub mod metrics;
pub mod split;

pub use metrics::{ClassMetrics, ConfusionMatrix, EvaluationReport};
pub use split::{stratified_split, DataSplit};
