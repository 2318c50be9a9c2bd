//! Inference orchestrator
//!
//! Replays the frozen training pipeline on an upload: drop the target, check
//! the selected columns, clean, impute, scale, classify, and reattach the
//! identifier. The predictor only reads its bundle, so one instance can serve
//! concurrent callers.

use ndarray::Array2;
use std::path::Path;
use tracing::{debug, info};

use crate::bundle::ModelBundle;
use crate::data::RecordSet;
use crate::error::Result;
use crate::models::{FeatureValue, PredictionBatch, PredictionRow};
use crate::preprocess::feature_matrix;

/// Intermediate matrices of one inference pass
pub(crate) struct Transformed {
    /// After imputation, before scaling
    pub imputed: Array2<f64>,
    pub probabilities: Vec<f64>,
}

/// Referral predictor backed by a loaded model bundle
#[derive(Debug, Clone)]
pub struct ReferralPredictor {
    bundle: ModelBundle,
}

impl ReferralPredictor {
    pub fn new(bundle: ModelBundle) -> Self {
        Self { bundle }
    }

    /// Load a bundle from disk; fails if it is absent or corrupt
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(ModelBundle::load(path)?))
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Parse an optional CSV upload and predict on it
    pub fn predict_upload(&self, upload: Option<&[u8]>) -> Result<PredictionBatch> {
        let table = RecordSet::from_upload(upload)?;
        self.predict(&table)
    }

    /// Predict every row of `table`, in order
    pub fn predict(&self, table: &RecordSet) -> Result<PredictionBatch> {
        let schema = self.bundle.schema();
        let features = self.bundle.feature_names();
        info!("Predicting {} rows with {} features", table.height(), features.len());

        let transformed = self.transform(table)?;

        let identifiers = table.column(&schema.identifier_column);
        let rows: Vec<PredictionRow> = transformed
            .imputed
            .rows()
            .into_iter()
            .zip(&transformed.probabilities)
            .enumerate()
            .map(|(i, (values, &probability))| PredictionRow {
                row: i,
                identifier: identifiers.and_then(|c| c.display_value(i)),
                features: features
                    .iter()
                    .zip(values)
                    .map(|(name, &value)| FeatureValue {
                        name: name.clone(),
                        value,
                    })
                    .collect(),
                prediction: u8::from(probability >= crate::core::DECISION_THRESHOLD),
                probability,
            })
            .collect();

        let batch = PredictionBatch::new(
            identifiers.map(|c| c.name.clone()),
            features,
            rows,
        );
        info!(
            "Predicted {} referrals out of {} rows",
            batch.summary.positive, batch.summary.total
        );
        Ok(batch)
    }

    /// Clean, impute, scale and score `table` with the frozen artifacts
    pub(crate) fn transform(&self, table: &RecordSet) -> Result<Transformed> {
        let schema = self.bundle.schema();
        let features = self.bundle.feature_names();

        // ground truth in a serving upload is ignored
        let unlabeled = table.without_column(&schema.target_column);
        let selected = unlabeled.select(&features)?;

        let cleaned = schema.cleaning.clean_serving(&selected);
        let raw = feature_matrix(&cleaned, &features)?;
        let missing = raw.iter().filter(|cell| cell.is_none()).count();
        debug!("{} missing cells before imputation", missing);

        let imputed = self.bundle.imputer().apply(&raw)?;
        let scaled = self.bundle.scaler().transform(imputed.view())?;
        let probabilities = self.bundle.classifier().predict_proba(scaled.view())?;

        Ok(Transformed {
            imputed,
            probabilities,
        })
    }
}
