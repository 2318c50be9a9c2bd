//! Fitted preprocessing stages
//!
//! Selection runs at training time only; the imputer and scaler are fit once
//! and replayed unchanged at serving time.

pub mod imputer;
pub mod scaler;
pub mod selection;

use ndarray::Array2;

use crate::data::RecordSet;
use crate::error::Result;

pub use imputer::{Imputer, MedianImputer, NeighborImputer};
pub use scaler::StandardScaler;
pub use selection::{FeatureImportance, FeatureSelector, SelectionOutcome};

/// Rows × `features` matrix with missing cells kept as None
pub fn feature_matrix(table: &RecordSet, features: &[String]) -> Result<Array2<Option<f64>>> {
    let columns = features
        .iter()
        .map(|name| table.require_numeric(name))
        .collect::<Result<Vec<_>>>()?;

    Ok(Array2::from_shape_fn(
        (table.height(), features.len()),
        |(row, col)| columns[col][row],
    ))
}
