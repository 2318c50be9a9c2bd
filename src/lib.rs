//! Referral - clinical referral scoring pipeline
//!
//! This library provides:
//! - CSV ingestion into a typed record set
//! - Zero-as-missing cleaning and importance-based feature selection
//! - Median or k-nearest-neighbor imputation and standard scaling
//! - Random forest and gradient-boosted tree classifiers
//! - Training and inference orchestrators sharing one frozen model bundle
//!
//! # Example
//!
//! ```no_run
//! use referral::{PipelineConfig, RecordSet, ReferralPredictor, Trainer};
//!
//! // Train once, offline
//! let table = RecordSet::from_csv_path("encounters.csv")?;
//! let outcome = Trainer::new(PipelineConfig::default())?.train(&table)?;
//! outcome.bundle().save("model/referral.json")?;
//! println!("{}", outcome.report());
//!
//! // Serve many times
//! let predictor = ReferralPredictor::load("model/referral.json")?;
//! let upload = RecordSet::from_csv_path("new_encounters.csv")?;
//! let batch = predictor.predict(&upload)?;
//! println!("{} of {} rows need a referral", batch.summary.positive, batch.summary.total);
//! # Ok::<(), referral::PipelineError>(())
//! ```

pub mod bundle;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod predictor;
pub mod preprocess;
pub mod training;

// Re-export commonly used types
pub use bundle::{BundleSchema, ModelBundle};
pub use config::{BoostParams, ClassifierParams, ForestParams, ImputeStrategy, PipelineConfig};
pub use data::{DatasetProfile, RecordSet};
pub use error::{ErrorKind, PipelineError, Result};
pub use evaluation::EvaluationReport;
pub use models::{FeatureValue, PredictionBatch, PredictionRow, PredictionSummary};
pub use predictor::ReferralPredictor;
pub use training::{Trainer, TrainingOutcome};
