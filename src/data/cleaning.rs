//! Cleaning stage
//!
//! Zero readings in physiologically impossible columns become missing. At
//! training time the median policy also fills every gap from the current
//! table; the k-nearest policy leaves gaps for the fitted imputer. At serving
//! time only the zero replacement runs here and the frozen imputer fills gaps.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::record_set::{Column, ColumnData, RecordSet};
use crate::config::{ImputeStrategy, PipelineConfig};
use crate::error::{PipelineError, Result};

/// Median of present values, None when nothing is present
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);

    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Numeric, non-reserved columns in table order
pub fn candidate_features(table: &RecordSet, config: &PipelineConfig) -> Vec<String> {
    let mut candidates = Vec::new();
    for column in table.columns() {
        if config.is_reserved(&column.name) {
            continue;
        }
        if column.is_numeric() {
            candidates.push(column.name.clone());
        } else {
            warn!("Skipping non-numeric column '{}'", column.name);
        }
    }
    candidates
}

/// Cleaning rules shared by training and serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningPolicy {
    pub zero_invalid_columns: Vec<String>,
    pub strategy: ImputeStrategy,
}

impl CleaningPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            zero_invalid_columns: config.zero_invalid_columns.clone(),
            strategy: config.impute,
        }
    }

    /// Replace literal zeros with missing; returns the number of cells changed
    ///
    /// Absent columns are tolerated.
    pub fn replace_invalid_zeros(&self, table: &mut RecordSet) -> usize {
        let mut replaced = 0;
        for name in &self.zero_invalid_columns {
            match table.column_mut(name).map(Column::data_mut) {
                Some(ColumnData::Numeric(values)) => {
                    for cell in values.iter_mut() {
                        if *cell == Some(0.0) {
                            *cell = None;
                            replaced += 1;
                        }
                    }
                }
                Some(ColumnData::Text(_)) => {
                    warn!("Zero-invalid column '{}' is not numeric; left as is", name);
                }
                None => debug!("Zero-invalid column '{}' not present", name),
            }
        }
        replaced
    }

    /// Training-time cleaning over `features`
    pub fn clean_training(&self, table: &RecordSet, features: &[String]) -> Result<RecordSet> {
        let mut cleaned = table.clone();
        let replaced = self.replace_invalid_zeros(&mut cleaned);
        debug!("Replaced {} invalid zero readings", replaced);

        if self.strategy == ImputeStrategy::Median {
            for name in features {
                let fill = fill_with_median(&mut cleaned, name)?;
                debug!("Filled '{}' gaps with median {}", name, fill);
            }
        }
        Ok(cleaned)
    }

    /// Serving-time cleaning: zero replacement only
    pub fn clean_serving(&self, table: &RecordSet) -> RecordSet {
        let mut cleaned = table.clone();
        let replaced = self.replace_invalid_zeros(&mut cleaned);
        debug!("Replaced {} invalid zero readings", replaced);
        cleaned
    }
}

/// Fill gaps in one column with the median of the current table
fn fill_with_median(table: &mut RecordSet, name: &str) -> Result<f64> {
    let values = match table.column_mut(name).map(Column::data_mut) {
        Some(ColumnData::Numeric(values)) => values,
        Some(ColumnData::Text(_)) => {
            return Err(PipelineError::unparseable(format!(
                "column '{}' contains non-numeric values",
                name
            )))
        }
        None => {
            return Err(PipelineError::MissingRequiredColumn {
                name: name.to_string(),
            })
        }
    };

    let fill = median(values).ok_or_else(|| PipelineError::insufficient(name))?;
    for cell in values.iter_mut().filter(|c| c.is_none()) {
        *cell = Some(fill);
    }
    Ok(fill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record_set::Column;

    fn sample_table() -> RecordSet {
        RecordSet::new(vec![
            Column::text(
                "encounterId",
                vec![Some("a".into()), Some("b".into()), Some("c".into()), Some("d".into())],
            ),
            Column::numeric("resp_rate", vec![Some(18.0), Some(0.0), Some(22.0), None]),
            Column::numeric("feed_vol", vec![Some(0.0), Some(100.0), None, Some(300.0)]),
            Column::numeric("referral", vec![Some(0.0), Some(1.0), Some(0.0), Some(1.0)]),
        ])
        .unwrap()
    }

    fn policy(strategy: ImputeStrategy) -> CleaningPolicy {
        CleaningPolicy {
            zero_invalid_columns: vec!["resp_rate".to_string(), "absent".to_string()],
            strategy,
        }
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[Some(3.0), None, Some(1.0), Some(2.0)]), Some(2.0));
        assert_eq!(median(&[Some(4.0), Some(1.0), Some(2.0), Some(3.0)]), Some(2.5));
        assert_eq!(median(&[None, None]), None);
    }

    #[test]
    fn test_zero_replacement_only_touches_listed_columns() {
        let mut table = sample_table();
        let replaced = policy(ImputeStrategy::Median).replace_invalid_zeros(&mut table);

        assert_eq!(replaced, 1);
        assert_eq!(
            table.numeric("resp_rate").unwrap(),
            &[Some(18.0), None, Some(22.0), None]
        );
        // feed_vol is not zero-invalid
        assert_eq!(table.numeric("feed_vol").unwrap()[0], Some(0.0));
    }

    #[test]
    fn test_training_median_fill() {
        let table = sample_table();
        let features = vec!["resp_rate".to_string(), "feed_vol".to_string()];
        let cleaned = policy(ImputeStrategy::Median)
            .clean_training(&table, &features)
            .unwrap();

        // zero at row 1 is missing, so the median comes from 18 and 22
        assert_eq!(
            cleaned.numeric("resp_rate").unwrap(),
            &[Some(18.0), Some(20.0), Some(22.0), Some(20.0)]
        );
        assert_eq!(cleaned.numeric("feed_vol").unwrap()[2], Some(100.0));
        // the input table is untouched
        assert_eq!(table.numeric("resp_rate").unwrap()[1], Some(0.0));
    }

    #[test]
    fn test_training_knearest_leaves_gaps() {
        let table = sample_table();
        let features = vec!["resp_rate".to_string()];
        let cleaned = policy(ImputeStrategy::KNearest { neighbors: 5 })
            .clean_training(&table, &features)
            .unwrap();
        assert_eq!(
            cleaned.numeric("resp_rate").unwrap(),
            &[Some(18.0), None, Some(22.0), None]
        );
    }

    #[test]
    fn test_all_missing_column_is_insufficient() {
        let table = RecordSet::new(vec![Column::numeric("resp_rate", vec![Some(0.0), None])])
            .unwrap();
        let err = policy(ImputeStrategy::Median)
            .clean_training(&table, &["resp_rate".to_string()])
            .unwrap_err();
        match err {
            PipelineError::InsufficientData { column } => assert_eq!(column, "resp_rate"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_candidate_features_skip_reserved_and_text() {
        let config = PipelineConfig::default();
        let table = sample_table();
        assert_eq!(
            candidate_features(&table, &config),
            vec!["resp_rate".to_string(), "feed_vol".to_string()]
        );
    }
}
