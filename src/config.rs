//! Pipeline configuration
//!
//! Everything tunable about a training run. The subset that affects serving
//! (column roles, zero-invalid columns, imputation strategy) is frozen into the
//! model bundle, so serving never reads it from here.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{validate_positive, validate_ratio, PipelineError, Result};

/// Missing-value policy, chosen once at training time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Fill with the training median of the column
    Median,
    /// Average the column over the nearest training rows
    KNearest { neighbors: usize },
}

impl Default for ImputeStrategy {
    fn default() -> Self {
        ImputeStrategy::KNearest { neighbors: 5 }
    }
}

/// Random forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// None grows until leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// Gradient-boosted tree hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
    pub min_samples_leaf: usize,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 4,
            learning_rate: 0.05,
            lambda: 1.0,
            min_child_weight: 1.0,
            min_samples_leaf: 1,
        }
    }
}

/// Classifier family and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ClassifierParams {
    RandomForest(ForestParams),
    GradientBoosting(BoostParams),
}

impl Default for ClassifierParams {
    fn default() -> Self {
        ClassifierParams::GradientBoosting(BoostParams::default())
    }
}

/// Full training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pass-through identifier, never a feature
    pub identifier_column: String,
    /// Binary supervision column
    pub target_column: String,
    /// Columns where a literal 0 is a missing reading
    pub zero_invalid_columns: Vec<String>,
    pub impute: ImputeStrategy,
    /// Number of features kept by the selector (K)
    pub feature_count: usize,
    /// Importance-ranking forest used by the selector
    pub selector: ForestParams,
    pub classifier: ClassifierParams,
    /// Weight of a positive (referral) sample relative to a negative one
    pub positive_class_weight: f64,
    /// Held-out share for evaluation
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identifier_column: "encounterId".to_string(),
            target_column: "referral".to_string(),
            zero_invalid_columns: vec![
                "resp_rate".to_string(),
                "bmi".to_string(),
                "fio2".to_string(),
            ],
            impute: ImputeStrategy::default(),
            feature_count: 4,
            selector: ForestParams::default(),
            classifier: ClassifierParams::default(),
            positive_class_weight: 4.0,
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PipelineError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "feature_count must be at least 1".to_string(),
            ));
        }
        if self.identifier_column == self.target_column {
            return Err(PipelineError::InvalidConfig(format!(
                "identifier and target column are both '{}'",
                self.target_column
            )));
        }
        if let ImputeStrategy::KNearest { neighbors: 0 } = self.impute {
            return Err(PipelineError::InvalidConfig(
                "k-nearest imputation needs at least 1 neighbor".to_string(),
            ));
        }
        if self.selector.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig(
                "selector needs at least 1 tree".to_string(),
            ));
        }
        match &self.classifier {
            ClassifierParams::RandomForest(p) if p.n_estimators == 0 => {
                return Err(PipelineError::InvalidConfig(
                    "random forest needs at least 1 tree".to_string(),
                ));
            }
            ClassifierParams::GradientBoosting(p) => {
                if p.n_estimators == 0 || p.max_depth == 0 {
                    return Err(PipelineError::InvalidConfig(
                        "gradient boosting needs at least 1 tree of depth 1".to_string(),
                    ));
                }
                validate_positive("learning_rate", p.learning_rate)?;
                if !(p.lambda >= 0.0 && p.min_child_weight >= 0.0) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "lambda and min_child_weight must be non-negative, got {} and {}",
                        p.lambda, p.min_child_weight
                    )));
                }
            }
            _ => {}
        }
        validate_positive("positive_class_weight", self.positive_class_weight)?;
        validate_ratio("test_ratio", self.test_ratio)?;
        Ok(())
    }

    /// Columns never offered to the selector
    pub fn is_reserved(&self, column: &str) -> bool {
        column == self.identifier_column || column == self.target_column
    }
}
