//! Importance-ranked feature selection (training only)
//!
//! Ranks candidate columns with an auxiliary random forest fit on a
//! zero-filled copy of the data. The zero fill exists only here; the selected
//! columns go on to the imputer with their gaps intact.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::feature_matrix;
use crate::config::PipelineConfig;
use crate::core::RandomForest;
use crate::data::RecordSet;
use crate::error::{PipelineError, Result};

/// One ranked column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

/// Selected columns in rank order, plus the full ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub selected: Vec<String>,
    pub ranking: Vec<FeatureImportance>,
}

pub struct FeatureSelector<'a> {
    config: &'a PipelineConfig,
}

impl<'a> FeatureSelector<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Keep the top `feature_count` candidates by importance
    ///
    /// Equal scores keep the candidates' table order.
    pub fn fit(
        &self,
        table: &RecordSet,
        candidates: &[String],
        labels: &[u8],
    ) -> Result<SelectionOutcome> {
        if candidates.is_empty() {
            return Err(PipelineError::insufficient("<features>"));
        }
        let k = self.config.feature_count;
        if candidates.len() < k {
            warn!(
                "Only {} candidate features for {} requested; keeping all",
                candidates.len(),
                k
            );
        }

        let raw = feature_matrix(table, candidates)?;
        let zero_filled: Array2<f64> = raw.mapv(|cell| cell.unwrap_or(0.0));

        // ranking is unweighted; the class weight belongs to the final classifier
        let forest = RandomForest::fit(zero_filled.view(), labels, &self.config.selector, 1.0)?;

        let mut ranking: Vec<FeatureImportance> = candidates
            .iter()
            .zip(forest.feature_importances())
            .map(|(name, &importance)| FeatureImportance {
                name: name.clone(),
                importance,
            })
            .collect();
        // stable sort keeps table order among ties
        ranking.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        for entry in &ranking {
            debug!("Importance {:>8.5} {}", entry.importance, entry.name);
        }

        let selected: Vec<String> = ranking.iter().take(k).map(|f| f.name.clone()).collect();
        info!("Selected features: {}", selected.join(", "));

        Ok(SelectionOutcome { selected, ranking })
    }
}

impl SelectionOutcome {
    /// Importance of a selected column
    pub fn importance_of(&self, name: &str) -> Option<f64> {
        self.ranking
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.importance)
    }
}
