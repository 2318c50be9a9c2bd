//! Data loading, cleaning and profiling modules

pub mod cleaning;
pub mod profile;
pub mod record_set;

// Re-export commonly used types
pub use cleaning::{candidate_features, median, CleaningPolicy};
pub use profile::{ColumnProfile, DatasetProfile, LabelBalance};
pub use record_set::{Column, ColumnData, RecordSet};
