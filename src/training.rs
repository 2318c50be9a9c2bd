//! Training orchestrator
//!
//! Runs the linear training sequence: validate the target, clean, select
//! features, fit the imputer and scaler, split, fit the classifier, evaluate,
//! and freeze everything into one bundle. Nothing is written to disk here.

use ndarray::Axis;
use std::path::Path;
use tracing::{debug, info};

use crate::bundle::{BundleSchema, ModelBundle};
use crate::config::PipelineConfig;
use crate::core::Classifier;
use crate::data::{candidate_features, Column, CleaningPolicy, RecordSet};
use crate::error::{validate_binary_label, PipelineError, Result};
use crate::evaluation::{stratified_split, DataSplit, EvaluationReport};
use crate::models::PROBABILITY_COLUMN;
use crate::predictor::ReferralPredictor;
use crate::preprocess::{feature_matrix, FeatureImportance, FeatureSelector, Imputer, SelectionOutcome, StandardScaler};

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    predictor: ReferralPredictor,
    selection: SelectionOutcome,
    split: DataSplit,
}

impl TrainingOutcome {
    pub fn bundle(&self) -> &ModelBundle {
        self.predictor.bundle()
    }

    pub fn report(&self) -> &EvaluationReport {
        self.predictor.bundle().report()
    }

    /// Full importance ranking of every candidate feature
    pub fn selection(&self) -> &SelectionOutcome {
        &self.selection
    }

    pub fn split(&self) -> &DataSplit {
        &self.split
    }

    /// Predictor over the frozen artifacts of this run
    pub fn predictor(&self) -> &ReferralPredictor {
        &self.predictor
    }

    pub fn into_predictor(self) -> ReferralPredictor {
        self.predictor
    }

    /// Training rows annotated with their label and the model's prediction
    ///
    /// Columns: identifier (if present), selected features after imputation,
    /// the target, and the prediction.
    pub fn audit(&self, table: &RecordSet) -> Result<RecordSet> {
        let schema = self.bundle().schema();
        let annotated = self.predictor.predict(table)?.to_record_set()?;

        let mut columns: Vec<Column> = annotated
            .columns()
            .iter()
            .filter(|c| c.name != PROBABILITY_COLUMN)
            .cloned()
            .collect();
        let labels = table.require_numeric(&schema.target_column)?.to_vec();
        let at = columns.len() - 1;
        columns.insert(at, Column::numeric(schema.target_column.clone(), labels));

        RecordSet::new(columns)
    }

    pub fn write_audit_csv<P: AsRef<Path>>(&self, table: &RecordSet, path: P) -> Result<()> {
        let audit = self.audit(table)?;
        audit.to_csv(path.as_ref())?;
        info!("Wrote {} audit rows to {}", audit.height(), path.as_ref().display());
        Ok(())
    }
}

/// Fits a full pipeline from a labeled table
pub struct Trainer {
    config: PipelineConfig,
}

impl Trainer {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read a CSV file and train on it
    pub fn train_csv<P: AsRef<Path>>(&self, path: P) -> Result<TrainingOutcome> {
        let table = RecordSet::from_csv_path(path)?;
        self.train(&table)
    }

    pub fn train(&self, table: &RecordSet) -> Result<TrainingOutcome> {
        let config = &self.config;
        info!("Training on {} rows x {} columns", table.height(), table.width());

        let labels = self.labels(table)?;
        let positives = labels.iter().filter(|&&y| y == 1).count();
        info!(
            "Target '{}': {} positive, {} negative",
            config.target_column,
            positives,
            labels.len() - positives
        );
        if positives == 0 || positives == labels.len() {
            return Err(PipelineError::insufficient(config.target_column.as_str()));
        }

        let candidates = candidate_features(table, config);
        let policy = CleaningPolicy::from_config(config);
        let cleaned = policy.clean_training(table, &candidates)?;
        info!("Cleaned {} candidate features", candidates.len());

        let selection = FeatureSelector::new(config).fit(&cleaned, &candidates, &labels)?;
        let selected = selection.selected.clone();

        let raw = feature_matrix(&cleaned, &selected)?;
        let imputer = Imputer::fit(config.impute, &raw, &selected)?;
        let imputed = imputer.apply(&raw)?;
        info!("Fitted {:?} imputer", config.impute);

        let scaler = StandardScaler::fit(imputed.view())?;
        let scaled = scaler.transform(imputed.view())?;
        debug!("Scaler means {:?}, stds {:?}", scaler.means(), scaler.stds());

        let split = stratified_split(&labels, config.test_ratio, config.seed)?;
        if split.test.is_empty() {
            return Err(PipelineError::insufficient(config.target_column.as_str()));
        }
        info!("Split: {} train, {} test", split.train.len(), split.test.len());

        let x_train = scaled.select(Axis(0), &split.train);
        let x_test = scaled.select(Axis(0), &split.test);
        let y_train: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
        let y_test: Vec<u8> = split.test.iter().map(|&i| labels[i]).collect();

        let classifier = Classifier::fit(
            &config.classifier,
            x_train.view(),
            &y_train,
            config.positive_class_weight,
        )?;

        let report = EvaluationReport::evaluate(
            &y_train,
            &classifier.predict(x_train.view())?,
            &y_test,
            &classifier.predict(x_test.view())?,
        );
        info!(
            "Test accuracy {:.3} (baseline {:.3})",
            report.test_accuracy, report.baseline_accuracy
        );

        let features = selected
            .iter()
            .map(|name| FeatureImportance {
                name: name.clone(),
                importance: selection.importance_of(name).unwrap_or(0.0),
            })
            .collect();
        let schema = BundleSchema {
            identifier_column: config.identifier_column.clone(),
            target_column: config.target_column.clone(),
            cleaning: policy,
        };
        let bundle = ModelBundle::new(schema, features, imputer, scaler, classifier, report)?;

        Ok(TrainingOutcome {
            predictor: ReferralPredictor::new(bundle),
            selection,
            split,
        })
    }

    /// 0/1 labels of every row; the target column must exist and be complete
    fn labels(&self, table: &RecordSet) -> Result<Vec<u8>> {
        let target = &self.config.target_column;
        table
            .require_numeric(target)?
            .iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                Some(value) => validate_binary_label(*value, row, target),
                None => Err(PipelineError::unparseable(format!(
                    "column '{}' row {}: missing label",
                    target, row
                ))),
            })
            .collect()
    }
}
