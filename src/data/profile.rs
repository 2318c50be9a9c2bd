//! Dataset profiling
//!
//! Per-column completeness and averages, plus the label balance when the
//! target column is present.

use serde::{Deserialize, Serialize};

use super::record_set::{ColumnData, RecordSet};
use crate::config::PipelineConfig;

/// Summary of a single column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub numeric: bool,
    pub missing: usize,
    /// Mean of present values (numeric columns only)
    pub mean: Option<f64>,
}

/// Positive / negative label counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelBalance {
    pub positive: usize,
    pub negative: usize,
    /// Rows whose label is missing or not 0/1
    pub unlabeled: usize,
}

impl LabelBalance {
    pub fn positive_rate(&self) -> f64 {
        let labeled = self.positive + self.negative;
        if labeled == 0 {
            0.0
        } else {
            self.positive as f64 / labeled as f64
        }
    }
}

/// Profile of a whole record set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
    pub labels: Option<LabelBalance>,
}

impl DatasetProfile {
    pub fn from_record_set(table: &RecordSet, config: &PipelineConfig) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|column| {
                let mean = match &column.data {
                    ColumnData::Numeric(values) => {
                        let present: Vec<f64> = values.iter().flatten().copied().collect();
                        if present.is_empty() {
                            None
                        } else {
                            Some(present.iter().sum::<f64>() / present.len() as f64)
                        }
                    }
                    ColumnData::Text(_) => None,
                };
                ColumnProfile {
                    name: column.name.clone(),
                    numeric: column.is_numeric(),
                    missing: column.missing_count(),
                    mean,
                }
            })
            .collect();

        let labels = table.numeric(&config.target_column).map(|values| {
            let mut balance = LabelBalance {
                positive: 0,
                negative: 0,
                unlabeled: 0,
            };
            for value in values {
                match value {
                    Some(v) if *v == 1.0 => balance.positive += 1,
                    Some(v) if *v == 0.0 => balance.negative += 1,
                    _ => balance.unlabeled += 1,
                }
            }
            balance
        });

        Self {
            rows: table.height(),
            columns,
            labels,
        }
    }

    /// Columns sorted by missing count, most incomplete first
    pub fn most_incomplete(&self) -> Vec<&ColumnProfile> {
        let mut sorted: Vec<&ColumnProfile> = self.columns.iter().collect();
        sorted.sort_by(|a, b| b.missing.cmp(&a.missing));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record_set::Column;

    #[test]
    fn test_profile_counts() {
        let table = RecordSet::new(vec![
            Column::numeric("bmi", vec![Some(20.0), None, Some(30.0), None]),
            Column::text("note", vec![None, Some("x".into()), None, None]),
            Column::numeric("referral", vec![Some(1.0), Some(0.0), Some(0.0), None]),
        ])
        .unwrap();

        let profile = DatasetProfile::from_record_set(&table, &PipelineConfig::default());

        assert_eq!(profile.rows, 4);
        let bmi = &profile.columns[0];
        assert_eq!(bmi.missing, 2);
        assert!((bmi.mean.unwrap() - 25.0).abs() < 1e-12);
        assert_eq!(profile.columns[1].mean, None);
        assert_eq!(profile.most_incomplete()[0].name, "note");

        let labels = profile.labels.unwrap();
        assert_eq!(labels.positive, 1);
        assert_eq!(labels.negative, 2);
        assert_eq!(labels.unlabeled, 1);
        assert!((labels.positive_rate() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_profile_without_target() {
        let table = RecordSet::new(vec![Column::numeric("bmi", vec![Some(20.0)])]).unwrap();
        let profile = DatasetProfile::from_record_set(&table, &PipelineConfig::default());
        assert!(profile.labels.is_none());
    }
}
