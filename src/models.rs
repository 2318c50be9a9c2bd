use polars::prelude::{Column as PolarsColumn, CsvWriter, DataFrame, NamedFrom, SerWriter};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::RecordSet;
use crate::error::{PipelineError, Result};

/// Output column holding the 0/1 prediction
pub const PREDICTION_COLUMN: &str = "referral_prediction";
/// Output column holding the positive-class probability
pub const PROBABILITY_COLUMN: &str = "referral_probability";

/// A selected feature value after cleaning and imputation, before scaling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub name: String,
    pub value: f64,
}

/// Prediction for one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    /// Zero-based position in the upload
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub features: Vec<FeatureValue>,
    pub prediction: u8,
    pub probability: f64,
}

/// Positive/negative prediction counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
}

impl PredictionSummary {
    pub fn from_rows(rows: &[PredictionRow]) -> Self {
        let positive = rows.iter().filter(|r| r.prediction == 1).count();
        Self {
            total: rows.len(),
            positive,
            negative: rows.len() - positive,
        }
    }

    pub fn positive_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.positive as f64 / self.total as f64
        }
    }
}

/// Predictions for a whole upload, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBatch {
    /// Identifier column name when the upload carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_column: Option<String>,
    pub feature_names: Vec<String>,
    pub rows: Vec<PredictionRow>,
    pub summary: PredictionSummary,
}

impl PredictionBatch {
    pub fn new(
        identifier_column: Option<String>,
        feature_names: Vec<String>,
        rows: Vec<PredictionRow>,
    ) -> Self {
        let summary = PredictionSummary::from_rows(&rows);
        Self {
            identifier_column,
            feature_names,
            rows,
            summary,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 0/1 predictions in input order
    pub fn predictions(&self) -> Vec<u8> {
        self.rows.iter().map(|r| r.prediction).collect()
    }

    /// Tabular view: identifier (if any), features, prediction, probability
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.feature_names.len() + 3);

        if let Some(name) = &self.identifier_column {
            let ids: Vec<Option<String>> = self.rows.iter().map(|r| r.identifier.clone()).collect();
            columns.push(PolarsColumn::new(name.as_str().into(), ids.as_slice()));
        }
        for (j, name) in self.feature_names.iter().enumerate() {
            let values: Vec<f64> = self
                .rows
                .iter()
                .map(|r| r.features.get(j).map_or(f64::NAN, |f| f.value))
                .collect();
            columns.push(PolarsColumn::new(name.as_str().into(), values.as_slice()));
        }
        let predictions: Vec<i32> = self.rows.iter().map(|r| r.prediction as i32).collect();
        columns.push(PolarsColumn::new(PREDICTION_COLUMN.into(), predictions.as_slice()));
        let probabilities: Vec<f64> = self.rows.iter().map(|r| r.probability).collect();
        columns.push(PolarsColumn::new(PROBABILITY_COLUMN.into(), probabilities.as_slice()));

        DataFrame::new(columns).map_err(|e| PipelineError::internal("export", e))
    }

    pub fn to_record_set(&self) -> Result<RecordSet> {
        RecordSet::from_dataframe(&self.to_dataframe()?)
    }

    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = std::fs::File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| PipelineError::internal("export", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(row: usize, id: Option<&str>, prediction: u8) -> PredictionRow {
        PredictionRow {
            row,
            identifier: id.map(str::to_string),
            features: vec![FeatureValue {
                name: "bmi".to_string(),
                value: 20.0 + row as f64,
            }],
            prediction,
            probability: if prediction == 1 { 0.8 } else { 0.1 },
        }
    }

    #[test]
    fn test_summary_counts() {
        let batch = PredictionBatch::new(
            Some("encounterId".to_string()),
            vec!["bmi".to_string()],
            vec![row(0, Some("a"), 1), row(1, Some("b"), 0), row(2, None, 0)],
        );
        assert_eq!(
            batch.summary,
            PredictionSummary {
                total: 3,
                positive: 1,
                negative: 2
            }
        );
        assert!((batch.summary.positive_rate() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(batch.predictions(), vec![1, 0, 0]);
    }

    #[test]
    fn test_empty_summary_rate() {
        assert_eq!(PredictionSummary::default().positive_rate(), 0.0);
    }

    #[test]
    fn test_to_record_set_columns() {
        let batch = PredictionBatch::new(
            Some("encounterId".to_string()),
            vec!["bmi".to_string()],
            vec![row(0, Some("a"), 1), row(1, Some("b"), 0)],
        );
        let table = batch.to_record_set().unwrap();
        assert_eq!(
            table.column_names(),
            vec!["encounterId", "bmi", PREDICTION_COLUMN, PROBABILITY_COLUMN]
        );
        assert_eq!(table.numeric(PREDICTION_COLUMN).unwrap(), &[Some(1.0), Some(0.0)]);
    }

    #[test]
    fn test_without_identifier_column() {
        let batch = PredictionBatch::new(None, vec!["bmi".to_string()], vec![row(0, None, 0)]);
        let table = batch.to_record_set().unwrap();
        assert!(!table.has_column("encounterId"));
        assert_eq!(table.width(), 3);
    }

    #[test]
    fn test_json_omits_absent_identifier() {
        let json = serde_json::to_string(&row(0, None, 1)).unwrap();
        assert!(!json.contains("identifier"));
    }
}
