//! Versioned model bundle
//!
//! Everything serving needs travels in one JSON document: the column roles
//! and cleaning policy, the selected features, and the fitted imputer, scaler
//! and classifier. Writes go to a sibling temp file that is renamed over the
//! destination, so a concurrent loader sees either the old bundle or the new
//! one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::Classifier;
use crate::data::CleaningPolicy;
use crate::evaluation::EvaluationReport;
use crate::preprocess::{FeatureImportance, Imputer, StandardScaler};
use crate::error::{PipelineError, Result};

pub const FORMAT_VERSION: u32 = 1;

/// Column roles and cleaning rules frozen at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSchema {
    pub identifier_column: String,
    pub target_column: String,
    pub cleaning: CleaningPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    format_version: u32,
    created_at: DateTime<Utc>,
    schema: BundleSchema,
    /// Selected features in model input order, with selector importance
    features: Vec<FeatureImportance>,
    imputer: Imputer,
    scaler: StandardScaler,
    classifier: Classifier,
    report: EvaluationReport,
}

impl ModelBundle {
    pub fn new(
        schema: BundleSchema,
        features: Vec<FeatureImportance>,
        imputer: Imputer,
        scaler: StandardScaler,
        classifier: Classifier,
        report: EvaluationReport,
    ) -> Result<Self> {
        let bundle = Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            schema,
            features,
            imputer,
            scaler,
            classifier,
            report,
        };
        bundle
            .check_consistency()
            .map_err(|detail| PipelineError::internal("bundle", detail))?;
        Ok(bundle)
    }

    /// Write atomically to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let bytes = serde_json::to_vec(self).map_err(|e| PipelineError::internal("bundle", e))?;

        let tmp = temp_path(path);
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!("Saved model bundle to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Read and verify a bundle
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(PipelineError::ArtifactMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let bundle: Self = serde_json::from_slice(&bytes).map_err(|e| PipelineError::ArtifactCorrupt {
            detail: format!("{}: {}", path.display(), e),
        })?;
        bundle
            .check_consistency()
            .map_err(|detail| PipelineError::ArtifactCorrupt { detail })?;

        info!(
            "Loaded {} model bundle from {} (created {})",
            bundle.classifier.family(),
            path.display(),
            bundle.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(bundle)
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        let width = self.features.len();
        if width == 0 {
            return Err("no selected features".to_string());
        }
        for (stage, n) in [
            ("imputer", self.imputer.n_features()),
            ("scaler", self.scaler.n_features()),
            ("classifier", self.classifier.n_features()),
        ] {
            if n != width {
                return Err(format!("{} expects {} features, bundle lists {}", stage, n, width));
            }
        }
        if !self.imputer.is_well_formed() {
            return Err("imputer parameters are invalid".to_string());
        }
        if !self.scaler.is_well_formed() {
            return Err("scaler parameters are invalid".to_string());
        }
        if !self.classifier.is_well_formed() {
            return Err("classifier structure is invalid".to_string());
        }
        if self.imputer.strategy() != self.schema.cleaning.strategy {
            return Err("imputer strategy differs from the cleaning policy".to_string());
        }
        Ok(())
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn schema(&self) -> &BundleSchema {
        &self.schema
    }

    pub fn features(&self) -> &[FeatureImportance] {
        &self.features
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn imputer(&self) -> &Imputer {
        &self.imputer
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn report(&self) -> &EvaluationReport {
        &self.report
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string());
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierParams, ForestParams, ImputeStrategy};
    use ndarray::array;
    use tempfile::tempdir;

    fn sample_bundle() -> ModelBundle {
        let raw = array![
            [Some(1.0), Some(5.0)],
            [Some(2.0), None],
            [Some(8.0), Some(1.0)],
            [Some(9.0), Some(2.0)]
        ];
        let names = vec!["bmi".to_string(), "resp_rate".to_string()];
        let labels = [0, 0, 1, 1];

        let imputer = Imputer::fit(ImputeStrategy::Median, &raw, &names).unwrap();
        let filled = imputer.apply(&raw).unwrap();
        let scaler = StandardScaler::fit(filled.view()).unwrap();
        let scaled = scaler.transform(filled.view()).unwrap();
        let params = ClassifierParams::RandomForest(ForestParams {
            n_estimators: 5,
            ..ForestParams::default()
        });
        let classifier = Classifier::fit(&params, scaled.view(), &labels, 1.0).unwrap();
        let predictions = classifier.predict(scaled.view()).unwrap();
        let report = EvaluationReport::evaluate(&labels, &predictions, &labels, &predictions);

        ModelBundle::new(
            BundleSchema {
                identifier_column: "encounterId".to_string(),
                target_column: "referral".to_string(),
                cleaning: CleaningPolicy {
                    zero_invalid_columns: vec!["resp_rate".to_string()],
                    strategy: ImputeStrategy::Median,
                },
            },
            names
                .iter()
                .map(|name| FeatureImportance {
                    name: name.clone(),
                    importance: 0.5,
                })
                .collect(),
            imputer,
            scaler,
            classifier,
            report,
        )
        .unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models").join("referral.json");
        let bundle = sample_bundle();

        bundle.save(&path).unwrap();
        let loaded = ModelBundle::load(&path).unwrap();

        assert_eq!(loaded, bundle);
        assert_eq!(loaded.feature_names(), vec!["bmi", "resp_rate"]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = ModelBundle::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMissing { .. }));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        fs::write(&path, b"{\"format_version\": 1").unwrap();

        let err = ModelBundle::load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactCorrupt { .. }));
    }

    #[test]
    fn test_load_inconsistent_width_is_corrupt() {
        let mut bundle = sample_bundle();
        bundle.features.pop();
        let dir = tempdir().unwrap();
        let path = dir.path().join("width.json");
        fs::write(&path, serde_json::to_vec(&bundle).unwrap()).unwrap();

        let err = ModelBundle::load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactCorrupt { ref detail } if detail.contains("features")));
    }

    #[test]
    fn test_load_wrong_version_is_corrupt() {
        let mut bundle = sample_bundle();
        bundle.format_version = FORMAT_VERSION + 1;
        let dir = tempdir().unwrap();
        let path = dir.path().join("version.json");
        fs::write(&path, serde_json::to_vec(&bundle).unwrap()).unwrap();

        let err = ModelBundle::load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactCorrupt { .. }));
    }
}
