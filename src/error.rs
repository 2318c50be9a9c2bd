use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error types
///
/// Every variant is distinguishable by the caller; use [`PipelineError::kind`]
/// to map to a response class without matching on message text.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No upload was supplied at all
    #[error("No input provided")]
    NoInputProvided,

    /// The upload has no bytes, or a header but no data rows
    #[error("Input is empty")]
    EmptyInput,

    /// The upload could not be read as a table
    #[error("Unparseable input: {detail}")]
    UnparseableInput { detail: String },

    /// A column required for training (the target) is absent
    #[error("Missing required column: {name}")]
    MissingRequiredColumn { name: String },

    /// Selected feature columns absent from an inference upload
    #[error("Missing feature columns: {}", names.join(", "))]
    MissingFeatureColumns { names: Vec<String> },

    /// A column has no usable values to learn from
    #[error("Insufficient data in column: {column}")]
    InsufficientData { column: String },

    /// The artifact bundle does not exist
    #[error("Model bundle not found: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    /// The artifact bundle exists but cannot be trusted
    #[error("Model bundle is corrupt: {detail}")]
    ArtifactCorrupt { detail: String },

    /// Configuration values that cannot produce a valid pipeline
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected failure inside a pipeline stage
    #[error("Internal pipeline error in {stage}: {detail}")]
    InternalPipeline { stage: &'static str, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad upload; the caller can fix the data and retry
    InputShape,
    /// A column with nothing to learn from
    DataSufficiency,
    /// Bundle absent or unusable; serving must not start
    Artifact,
    Configuration,
    Internal,
}

impl ErrorKind {
    /// Whether re-submitting corrected data can succeed
    pub fn is_caller_recoverable(self) -> bool {
        matches!(self, ErrorKind::InputShape | ErrorKind::DataSufficiency)
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NoInputProvided
            | PipelineError::EmptyInput
            | PipelineError::UnparseableInput { .. }
            | PipelineError::MissingRequiredColumn { .. }
            | PipelineError::MissingFeatureColumns { .. } => ErrorKind::InputShape,
            PipelineError::InsufficientData { .. } => ErrorKind::DataSufficiency,
            PipelineError::ArtifactMissing { .. } | PipelineError::ArtifactCorrupt { .. } => {
                ErrorKind::Artifact
            }
            PipelineError::InvalidConfig(_) => ErrorKind::Configuration,
            PipelineError::InternalPipeline { .. } | PipelineError::Io(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn unparseable(detail: impl Into<String>) -> Self {
        PipelineError::UnparseableInput {
            detail: detail.into(),
        }
    }

    pub(crate) fn insufficient(column: impl Into<String>) -> Self {
        PipelineError::InsufficientData {
            column: column.into(),
        }
    }

    pub(crate) fn internal(stage: &'static str, detail: impl ToString) -> Self {
        PipelineError::InternalPipeline {
            stage,
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Validation functions
pub fn validate_binary_label(value: f64, row: usize, column: &str) -> Result<u8> {
    if value == 0.0 {
        Ok(0)
    } else if value == 1.0 {
        Ok(1)
    } else {
        Err(PipelineError::unparseable(format!(
            "column '{}' row {}: expected 0 or 1, got {}",
            column, row, value
        )))
    }
}

pub fn validate_ratio(name: &str, ratio: f64) -> Result<()> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "{} must be strictly between 0 and 1, got {}",
            name, ratio
        )));
    }
    Ok(())
}

pub fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(())
}
