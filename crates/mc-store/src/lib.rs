//! # mc-store
//!
//! Persisted tally store: the logical schema of exported estimators and
//! particle trackers, and the export operations that fill it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod export;
pub mod schema;

pub use export::{ExportData, export_estimator, export_particle_tracker};
pub use schema::{
    EstimatorMetadata, EstimatorRecord, MomentRecord, ResponseFunctionEntry, SCHEMA_VERSION,
    TallyStore,
};
